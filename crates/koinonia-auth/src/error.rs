//! Auth errors.

use thiserror::Error;

use koinonia_backend::BackendError;
use koinonia_core::validation::ValidationError;

/// Errors surfaced by sign-in actions.
///
/// Sign-out and profile resolution never fail; they recover locally.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The service rejected the credentials or email address.
    #[error("{0}")]
    InvalidCredentials(String),

    /// Input was rejected before reaching the service.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    /// The service could not be reached or failed.
    #[error("Service error: {0}")]
    Service(String),
}

impl AuthError {
    /// Short message for inline display next to the form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials(message) | Self::Service(message) => message.clone(),
            Self::InvalidInput(e) => e.to_string(),
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InvalidCredentials(message) => Self::InvalidCredentials(message),
            other => Self::Service(other.user_message()),
        }
    }
}
