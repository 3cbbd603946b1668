//! Core types used throughout Koinonia.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::secrets::Token;

/// Unique identifier for an authenticated user, issued by the auth service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create a new user ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Authenticated user record owned by the external auth service.
///
/// Read-only from this crate's point of view; metadata is edited elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Unique user ID.
    pub id: UserId,

    /// Email address, if the account has one.
    #[serde(default)]
    pub email: Option<String>,

    /// User-editable metadata (display name hints and the like).
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,

    /// Service-managed metadata.
    #[serde(default)]
    pub app_metadata: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Create an identity with no metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            id: UserId::new(id),
            email,
            user_metadata: HashMap::new(),
            app_metadata: HashMap::new(),
        }
    }

    /// Look up a string value in the user metadata.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(serde_json::Value::as_str)
    }

    /// Display name hint from user metadata.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["full_name", "name", "display_name"]
            .iter()
            .find_map(|key| self.metadata_str(key))
            .filter(|name| !name.trim().is_empty())
    }
}

/// An active authenticated session.
///
/// The identity is only reachable through the session, so the two can never
/// drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for service requests.
    pub access_token: Token,

    /// Token used to obtain a new access token.
    #[serde(default)]
    pub refresh_token: Option<Token>,

    /// Token type (usually "bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the access token expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// The user this session belongs to.
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// The identity this session authenticates.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.user
    }

    /// Check if the access token is expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }

    /// Check if the access token should be refreshed (expires within 60 seconds).
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.expires_at
            .is_some_and(|exp| exp <= Utc::now() + chrono::Duration::seconds(60))
    }
}

/// Application-level user record keyed by identity id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Identity id this profile belongs to.
    pub id: UserId,

    /// Email address.
    #[serde(default)]
    pub email: Option<String>,

    /// Display name.
    #[serde(default, alias = "full_name")]
    pub display_name: Option<String>,

    /// Avatar image URL.
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// Free-form bio.
    #[serde(default)]
    pub bio: Option<String>,

    /// Role string (e.g. "member", "admin", "owner").
    #[serde(default)]
    pub role: Option<String>,

    /// Explicit admin flag.
    #[serde(default)]
    pub is_admin: Option<bool>,

    /// Church the user belongs to.
    #[serde(default)]
    pub church_id: Option<String>,

    /// Profile visibility setting.
    #[serde(default)]
    pub visibility: Option<String>,
}

impl Profile {
    /// Minimal stand-in used when no profile row can be read.
    ///
    /// Holds only the identity's id and email and is never persisted.
    #[must_use]
    pub fn placeholder(identity: &Identity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            ..Self::default()
        }
    }

    /// Best display name: profile name, then identity metadata, then email.
    #[must_use]
    pub fn label<'a>(&'a self, identity: Option<&'a Identity>) -> &'a str {
        self.display_name
            .as_deref()
            .or_else(|| identity.and_then(Identity::display_name))
            .or(self.email.as_deref())
            .unwrap_or(self.id.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_display_name() {
        let mut identity = Identity::new("u1", Some("a@b.com".to_string()));
        assert_eq!(identity.display_name(), None);

        identity
            .user_metadata
            .insert("name".to_string(), serde_json::json!("Ruth"));
        assert_eq!(identity.display_name(), Some("Ruth"));

        identity
            .user_metadata
            .insert("full_name".to_string(), serde_json::json!("Ruth Moab"));
        assert_eq!(identity.display_name(), Some("Ruth Moab"));
    }

    #[test]
    fn test_placeholder_profile() {
        let identity = Identity::new("u1", Some("a@b.com".to_string()));
        let profile = Profile::placeholder(&identity);

        assert_eq!(
            profile,
            Profile {
                id: UserId::new("u1"),
                email: Some("a@b.com".to_string()),
                ..Profile::default()
            }
        );
        assert!(profile.role.is_none());
        assert!(profile.is_admin.is_none());
    }

    #[test]
    fn test_profile_row_alias() {
        let row = serde_json::json!({
            "id": "u1",
            "full_name": "Lydia",
            "role": "Admin",
            "church_id": "c9",
            "created_at": "2024-01-01T00:00:00Z"
        });

        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Lydia"));
        assert_eq!(profile.role.as_deref(), Some("Admin"));
        assert_eq!(profile.church_id.as_deref(), Some("c9"));
    }

    #[test]
    fn test_profile_label_fallbacks() {
        let identity = Identity::new("u1", Some("a@b.com".to_string()));
        let profile = Profile::placeholder(&identity);
        assert_eq!(profile.label(Some(&identity)), "a@b.com");

        let bare = Profile {
            id: UserId::new("u2"),
            ..Profile::default()
        };
        assert_eq!(bare.label(None), "u2");
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            access_token: Token::new("t"),
            refresh_token: None,
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now() - chrono::Duration::minutes(1)),
            user: Identity::new("u1", None),
        };
        assert!(session.is_expired());
        assert!(session.needs_refresh());

        let fresh = Session {
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
            ..session
        };
        assert!(!fresh.is_expired());
        assert!(!fresh.needs_refresh());
    }
}
