//! Secret handling.
//!
//! - `Token`: Wrapper for access tokens, refresh tokens, and API keys that
//!   prevents accidental logging
//! - `scrub_bearer`: Redact bearer credentials from service error text

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Secret token wrapper that prevents accidental logging.
///
/// The inner value is wrapped with `secrecy::SecretBox` so it never shows up
/// in `Debug` or `Display` output. Serialization exposes the value, since
/// persisted sessions must round-trip through storage.
#[derive(Clone)]
pub struct Token(SecretBox<str>);

impl Token {
    /// Create a new token.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Expose the secret for actual API calls.
    ///
    /// Use sparingly - only when actually sending to the service.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the token is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Token {}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token([REDACTED])")
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for Token {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Redact `Bearer <token>` sequences from text before it is logged.
#[must_use]
pub fn scrub_bearer(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find("Bearer ") {
        let (head, tail) = rest.split_at(pos + "Bearer ".len());
        out.push_str(head);
        out.push_str("[REDACTED]");
        let end = tail
            .find(|c: char| c.is_whitespace() || c == '"' || c == '\'')
            .unwrap_or(tail.len());
        rest = &tail[end..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_redacted() {
        let token = Token::new("eyJhbGciOi.secret.sig");
        assert_eq!(format!("{token:?}"), "Token([REDACTED])");
        assert_eq!(format!("{token}"), "[REDACTED]");
        assert_eq!(token.expose(), "eyJhbGciOi.secret.sig");
    }

    #[test]
    fn test_token_serde() {
        let token = Token::new("abc");
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"abc\"");

        let back: Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_scrub_bearer() {
        let text = r#"request failed: {"authorization":"Bearer abc.def.ghi"} retry"#;
        let scrubbed = scrub_bearer(text);
        assert!(!scrubbed.contains("abc.def.ghi"));
        assert!(scrubbed.contains("Bearer [REDACTED]\""));
        assert!(scrubbed.ends_with("retry"));
    }

    #[test]
    fn test_scrub_without_bearer() {
        assert_eq!(scrub_bearer("plain message"), "plain message");
    }
}
