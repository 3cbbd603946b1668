//! Profile resolution.

use std::sync::Arc;

use koinonia_backend::{BackendError, ProfileSource};
use koinonia_core::types::{Identity, Profile};

/// Maps an identity to its profile, hiding backend failures.
///
/// Missing rows and lookup errors both resolve to
/// [`Profile::placeholder`], so callers are never blocked by an unprovisioned
/// profile table.
#[derive(Clone)]
pub struct ProfileResolver {
    source: Arc<dyn ProfileSource>,
    legacy_email_lookup: bool,
}

impl ProfileResolver {
    /// Create a resolver. With `legacy_email_lookup`, an identity whose id has
    /// no row is also looked up by email.
    #[must_use]
    pub fn new(source: Arc<dyn ProfileSource>, legacy_email_lookup: bool) -> Self {
        Self {
            source,
            legacy_email_lookup,
        }
    }

    /// Resolve the profile for `identity`. `None` in, `None` out.
    pub async fn resolve(&self, identity: Option<&Identity>) -> Option<Profile> {
        let identity = identity?;

        match self.lookup(identity).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                tracing::debug!(user = %identity.id, "No profile row, using placeholder");
                Some(Profile::placeholder(identity))
            }
            Err(e) => {
                tracing::warn!(user = %identity.id, error = %e, "Profile lookup failed, using placeholder");
                Some(Profile::placeholder(identity))
            }
        }
    }

    async fn lookup(&self, identity: &Identity) -> Result<Option<Profile>, BackendError> {
        if let Some(profile) = self.source.profile_by_id(&identity.id).await? {
            return Ok(Some(profile));
        }

        match identity.email.as_deref() {
            Some(email) if self.legacy_email_lookup => {
                let found = self.source.profile_by_email(email).await?;
                if found.is_some() {
                    tracing::debug!(user = %identity.id, "Resolved profile through legacy email row");
                }
                Ok(found)
            }
            _ => Ok(None),
        }
    }
}

impl std::fmt::Debug for ProfileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileResolver")
            .field("legacy_email_lookup", &self.legacy_email_lookup)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProfiles;
    use koinonia_core::types::UserId;
    use pretty_assertions::assert_eq;

    fn identity() -> Identity {
        Identity::new("u1", Some("a@b.com".to_string()))
    }

    #[tokio::test]
    async fn test_none_identity() {
        let resolver = ProfileResolver::new(Arc::new(FakeProfiles::new()), true);
        assert!(resolver.resolve(None).await.is_none());
    }

    #[tokio::test]
    async fn test_placeholder_on_lookup_error() {
        let resolver = ProfileResolver::new(Arc::new(FakeProfiles::failing()), true);
        let profile = resolver.resolve(Some(&identity())).await;

        assert_eq!(
            profile,
            Some(Profile {
                id: UserId::new("u1"),
                email: Some("a@b.com".to_string()),
                ..Profile::default()
            })
        );
    }

    #[tokio::test]
    async fn test_placeholder_on_missing_row() {
        let resolver = ProfileResolver::new(Arc::new(FakeProfiles::new()), false);
        let profile = resolver.resolve(Some(&identity())).await.unwrap();
        assert_eq!(profile, Profile::placeholder(&identity()));
    }

    #[tokio::test]
    async fn test_row_by_id() {
        let profiles = FakeProfiles::new();
        profiles.insert(Profile {
            id: UserId::new("u1"),
            display_name: Some("Lydia".to_string()),
            role: Some("admin".to_string()),
            ..Profile::default()
        });
        let resolver = ProfileResolver::new(Arc::new(profiles), true);

        let profile = resolver.resolve(Some(&identity())).await.unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Lydia"));
    }

    #[tokio::test]
    async fn test_legacy_email_row() {
        let legacy = Profile {
            id: UserId::new("legacy-7"),
            email: Some("a@b.com".to_string()),
            church_id: Some("c1".to_string()),
            ..Profile::default()
        };

        let profiles = Arc::new(FakeProfiles::new());
        profiles.insert_legacy("a@b.com", legacy.clone());

        let resolver = ProfileResolver::new(profiles.clone(), true);
        assert_eq!(resolver.resolve(Some(&identity())).await, Some(legacy));

        let resolver = ProfileResolver::new(profiles, false);
        assert_eq!(
            resolver.resolve(Some(&identity())).await,
            Some(Profile::placeholder(&identity()))
        );
    }
}
