//! Role and capability derivation.
//!
//! Capabilities come from the profile row only. Identity metadata is
//! user-editable and never grants anything.

use koinonia_core::types::{Identity, Profile};

/// Application role, ordered by privilege.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    /// Regular member.
    #[default]
    Member,
    /// Church administrator.
    Admin,
    /// Platform owner (formerly "superadmin").
    Owner,
}

impl Role {
    /// Parse a profile role string, ignoring case only. Unknown, empty or
    /// padded values are `Member`.
    #[must_use]
    pub fn parse_lenient(role: &str) -> Self {
        let is = |name: &str| role.eq_ignore_ascii_case(name);
        if is("owner") || is("superadmin") || is("super_admin") {
            Self::Owner
        } else if is("admin") {
            Self::Admin
        } else {
            Self::Member
        }
    }

    /// Check if this role has admin privileges.
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Owner)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Member => write!(f, "member"),
            Self::Admin => write!(f, "admin"),
            Self::Owner => write!(f, "owner"),
        }
    }
}

/// Capabilities of the current user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    role: Role,
    admin: bool,
}

impl CapabilitySet {
    /// Resolved role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// May use admin surfaces.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.admin
    }

    /// Holds the owner role.
    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.role == Role::Owner
    }
}

/// Derive capabilities from the current identity and profile.
///
/// Precedence: no identity grants nothing; otherwise the role is parsed from
/// the profile's role string, and admin is the profile's explicit flag or any
/// role at or above `Admin`.
#[must_use]
pub fn resolve_capabilities(identity: Option<&Identity>, profile: Option<&Profile>) -> CapabilitySet {
    if identity.is_none() {
        return CapabilitySet::default();
    }
    let Some(profile) = profile else {
        return CapabilitySet::default();
    };

    let role = profile
        .role
        .as_deref()
        .map_or(Role::Member, Role::parse_lenient);

    CapabilitySet {
        role,
        admin: profile.is_admin == Some(true) || role.is_admin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koinonia_core::types::UserId;

    fn identity() -> Identity {
        Identity::new("u1", Some("a@b.com".to_string()))
    }

    fn profile(role: Option<&str>, is_admin: Option<bool>) -> Profile {
        Profile {
            id: UserId::new("u1"),
            role: role.map(str::to_string),
            is_admin,
            ..Profile::default()
        }
    }

    #[test]
    fn test_role_string_grants_admin_without_flag() {
        let caps = resolve_capabilities(Some(&identity()), Some(&profile(Some("Admin"), Some(false))));
        assert!(caps.is_admin());
        assert_eq!(caps.role(), Role::Admin);
    }

    #[test]
    fn test_flag_grants_admin() {
        let caps = resolve_capabilities(Some(&identity()), Some(&profile(None, Some(true))));
        assert!(caps.is_admin());
        assert_eq!(caps.role(), Role::Member);
    }

    #[test]
    fn test_owner_implies_admin() {
        for role in ["owner", "SuperAdmin", "super_admin"] {
            let caps = resolve_capabilities(Some(&identity()), Some(&profile(Some(role), None)));
            assert!(caps.is_owner(), "{role}");
            assert!(caps.is_admin(), "{role}");
        }
    }

    #[test]
    fn test_no_identity_grants_nothing() {
        let caps = resolve_capabilities(None, Some(&profile(Some("admin"), Some(true))));
        assert_eq!(caps, CapabilitySet::default());
        assert!(!caps.is_admin());
    }

    #[test]
    fn test_identity_metadata_is_ignored() {
        let mut identity = identity();
        identity
            .user_metadata
            .insert("role".to_string(), serde_json::json!("admin"));
        identity
            .app_metadata
            .insert("role".to_string(), serde_json::json!("owner"));

        let caps = resolve_capabilities(Some(&identity), Some(&profile(Some("member"), None)));
        assert!(!caps.is_admin());
        assert!(!resolve_capabilities(Some(&identity), None).is_admin());
    }

    #[test]
    fn test_role_match_ignores_case_not_padding() {
        assert_eq!(Role::parse_lenient("ADMIN"), Role::Admin);
        assert_eq!(Role::parse_lenient("SuperAdmin"), Role::Owner);
        assert_eq!(Role::parse_lenient("admin "), Role::Member);
        assert_eq!(Role::parse_lenient(" owner"), Role::Member);

        let padded = resolve_capabilities(Some(&identity()), Some(&profile(Some("admin "), None)));
        assert!(!padded.is_admin());
    }

    #[test]
    fn test_evaluation_is_stable() {
        let profiles = [
            profile(None, None),
            profile(Some("admin"), None),
            profile(Some("member"), Some(true)),
            profile(Some("ADMIN "), Some(false)),
            profile(Some("editor"), Some(false)),
        ];
        for p in &profiles {
            let first = resolve_capabilities(Some(&identity()), Some(p));
            let second = resolve_capabilities(Some(&identity()), Some(p));
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_role_ordering_and_display() {
        assert!(Role::Owner > Role::Admin);
        assert!(Role::Admin > Role::Member);
        assert_eq!(Role::parse_lenient("").to_string(), "member");
    }
}
