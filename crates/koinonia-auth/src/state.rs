//! Published auth state.

use koinonia_core::types::{Identity, Profile, Session};

use crate::capabilities::{CapabilitySet, resolve_capabilities};

/// Coarse auth status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    /// No decision yet (startup, or a sign-out in progress).
    Loading,
    /// A session is active.
    Authenticated,
    /// No session.
    Anonymous,
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Anonymous => write!(f, "anonymous"),
        }
    }
}

/// Point-in-time view of the auth state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    /// Active session, if any.
    pub session: Option<Session>,
    /// Profile for the session's identity, once resolved.
    pub profile: Option<Profile>,
    /// True until the first session answer, and while signing out.
    pub loading: bool,
}

impl AuthSnapshot {
    /// Initial state: loading, nothing known.
    #[must_use]
    pub const fn loading() -> Self {
        Self {
            session: None,
            profile: None,
            loading: true,
        }
    }

    /// Current identity.
    #[must_use]
    pub fn user(&self) -> Option<&Identity> {
        self.session.as_ref().map(Session::identity)
    }

    /// Coarse status.
    #[must_use]
    pub const fn status(&self) -> AuthStatus {
        if self.loading {
            AuthStatus::Loading
        } else if self.session.is_some() {
            AuthStatus::Authenticated
        } else {
            AuthStatus::Anonymous
        }
    }

    /// Capabilities derived from the current identity and profile.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        resolve_capabilities(self.user(), self.profile.as_ref())
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self::loading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koinonia_core::secrets::Token;

    #[test]
    fn test_status() {
        let mut snapshot = AuthSnapshot::default();
        assert_eq!(snapshot.status(), AuthStatus::Loading);

        snapshot.loading = false;
        assert_eq!(snapshot.status(), AuthStatus::Anonymous);
        assert!(snapshot.user().is_none());

        snapshot.session = Some(Session {
            access_token: Token::new("t"),
            refresh_token: None,
            token_type: "bearer".to_string(),
            expires_at: None,
            user: Identity::new("u1", None),
        });
        assert_eq!(snapshot.status(), AuthStatus::Authenticated);
        assert_eq!(snapshot.user().map(|u| u.id.as_ref()), Some("u1"));
        assert!(!snapshot.capabilities().is_admin());
    }
}
