//! Input validation and sanitization.
//!
//! Validate user-supplied credentials and navigation targets before they
//! reach the auth service or a redirect.

use thiserror::Error;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Required input is empty.
    #[error("{0} is required")]
    Empty(&'static str),

    /// Email address is malformed.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Disallowed characters in input.
    #[error("Disallowed characters in input")]
    DisallowedChars,
}

/// Size limits per input type.
pub mod limits {
    /// Maximum email length (RFC 5321 path limit).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Maximum password length accepted by the auth service.
    pub const MAX_PASSWORD_LENGTH: usize = 72;

    /// Maximum redirect target length.
    pub const MAX_REDIRECT_LENGTH: usize = 2048;
}

/// Normalize an email address for submission to the auth service.
///
/// Trims surrounding whitespace and checks basic shape. Case is preserved;
/// the auth service owns case folding.
///
/// # Errors
///
/// Returns `ValidationError` if the address is empty, too long, or malformed.
pub fn normalize_email(input: &str) -> Result<String, ValidationError> {
    let email = input.trim();

    if email.is_empty() {
        return Err(ValidationError::Empty("Email"));
    }

    if email.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_EMAIL_LENGTH,
            actual: email.len(),
        });
    }

    if email.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(ValidationError::DisallowedChars);
    }

    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
            Ok(email.to_string())
        }
        _ => Err(ValidationError::InvalidEmail),
    }
}

/// Check a password before submission.
///
/// Passwords are never trimmed.
///
/// # Errors
///
/// Returns `ValidationError` if the password is empty or too long.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Empty("Password"));
    }

    if password.len() > limits::MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_PASSWORD_LENGTH,
            actual: password.len(),
        });
    }

    Ok(())
}

/// Accept a post-login redirect target only if it stays on this site.
///
/// The target must be an absolute path (`/...`), must not be
/// protocol-relative (`//host` or `/\host`), and must not contain control
/// characters. Returns `None` for anything else.
#[must_use]
pub fn sanitize_redirect_target(raw: &str) -> Option<String> {
    if raw.len() > limits::MAX_REDIRECT_LENGTH {
        return None;
    }

    if !raw.starts_with('/') || raw.starts_with("//") || raw.starts_with("/\\") {
        return None;
    }

    if raw.chars().any(char::is_control) {
        return None;
    }

    Some(raw.to_string())
}
