//! Backend traits.

use async_trait::async_trait;
use thiserror::Error;

use koinonia_core::events::AuthSubscription;
use koinonia_core::storage::StorageError;
use koinonia_core::types::{Profile, Session, UserId};

use crate::query::Query;

/// Backend errors.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The service rejected the credentials.
    #[error("{0}")]
    InvalidCredentials(String),

    /// API error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persisted storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation needs a session and there is none.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Message suitable for showing inline to a user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials(message) | Self::Api { message, .. } => message.clone(),
            Self::Network(_) => "Could not reach the server. Check your connection.".to_string(),
            Self::NotAuthenticated => "Please sign in first.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Hosted authentication service.
///
/// Sign-in methods only trigger the side effect; the resulting session is
/// observed through [`AuthBackend::subscribe`].
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Current valid session, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Subscribe to session change events.
    fn subscribe(&self) -> AuthSubscription;

    /// Sign in with email and password.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    /// Ask the service to email a one-time sign-in link.
    async fn sign_in_with_otp(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError>;

    /// End the session locally, then on the service.
    ///
    /// The local session must be gone before the first await on the
    /// service call, so callers may drop the future on a timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the service could not revoke the session. The
    /// local session is cleared regardless.
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// Row storage over named collections.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Read rows matching the query.
    async fn select(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Insert a row and return it as stored.
    async fn insert(
        &self,
        collection: &str,
        row: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;

    /// Patch rows matching the query and return them as stored.
    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: serde_json::Value,
    ) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Delete rows matching the query.
    async fn delete(&self, collection: &str, query: &Query) -> Result<(), BackendError>;
}

/// Source of profile rows.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Look up a profile by identity id.
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BackendError>;

    /// Look up a profile by email (legacy rows keyed by address).
    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, BackendError>;
}
