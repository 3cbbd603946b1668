//! Auth context: one shared handle over session, profile, and actions.
//!
//! The context subscribes to the backend's change stream before asking for
//! the current session, so no transition can slip between the two. Change
//! events are applied by a single listener task in receipt order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use koinonia_backend::{AuthBackend, ProfileSource};
use koinonia_core::config::AuthConfig;
use koinonia_core::events::{AuthSubscription, SubscriptionError};
use koinonia_core::storage::{KeyPattern, SessionStorage, purge_matching};
use koinonia_core::types::Identity;
use koinonia_core::validation::{normalize_email, validate_password};

use crate::capabilities::CapabilitySet;
use crate::error::AuthError;
use crate::profile::ProfileResolver;
use crate::session::SessionStore;
use crate::state::{AuthSnapshot, AuthStatus};

/// Builder for [`AuthContext`].
pub struct AuthContextBuilder {
    backend: Arc<dyn AuthBackend>,
    profiles: Arc<dyn ProfileSource>,
    storage: Option<Arc<dyn SessionStorage>>,
    config: AuthConfig,
}

impl AuthContextBuilder {
    /// Persisted storage to purge on sign-out.
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Auth settings (sign-out timeout, persisted key pattern, legacy lookup).
    #[must_use]
    pub fn config(mut self, config: &AuthConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Subscribe to the backend, start the session bootstrap, and return the
    /// context in the loading state.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(self) -> AuthContext {
        let shared = Shared {
            backend: self.backend,
            store: Arc::new(SessionStore::new()),
            resolver: Arc::new(ProfileResolver::new(
                self.profiles,
                self.config.legacy_email_lookup,
            )),
        };

        let subscription = shared.backend.subscribe();
        let started_at = shared.store.generation();

        let listener = tokio::spawn(shared.clone().listen(subscription));
        let bootstrap = tokio::spawn(shared.clone().bootstrap(started_at));

        AuthContext {
            inner: Arc::new(Inner {
                shared,
                storage: self.storage,
                key_pattern: self.config.key_pattern(),
                sign_out_timeout: self.config.sign_out_timeout(),
                tasks: Mutex::new(vec![listener, bootstrap]),
            }),
        }
    }
}

/// Shared handle over the current auth state.
///
/// Cheap to clone. Only the context mutates state; consumers read snapshots
/// or watch for changes. Dropping the last handle stops the listener and
/// releases the backend subscription.
#[derive(Clone)]
pub struct AuthContext {
    inner: Arc<Inner>,
}

struct Inner {
    shared: Shared,
    storage: Option<Arc<dyn SessionStorage>>,
    key_pattern: KeyPattern,
    sign_out_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Pieces the background tasks need; never holds the context itself.
#[derive(Clone)]
struct Shared {
    backend: Arc<dyn AuthBackend>,
    store: Arc<SessionStore>,
    resolver: Arc<ProfileResolver>,
}

impl Shared {
    async fn bootstrap(self, started_at: u64) {
        let session = match self.backend.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Session check failed, continuing signed out");
                None
            }
        };

        if let Some(identity) = self.store.apply_fetched(started_at, session) {
            tracing::debug!(user = %identity.id, "Restored existing session");
            self.resolve_profile(identity).await;
        }
    }

    async fn listen(self, mut subscription: AuthSubscription) {
        loop {
            match subscription.recv().await {
                Ok(event) => {
                    if let Some(identity) = self.store.apply_event(&event) {
                        // Ticket is taken here so resolutions keep event order
                        let ticket = self.store.next_profile_ticket();
                        let shared = self.clone();
                        tokio::spawn(async move {
                            shared.apply_resolved(ticket, identity).await;
                        });
                    }
                }
                Err(SubscriptionError::Lagged(missed)) => {
                    tracing::warn!(missed, "Auth event subscriber lagged, resynchronising");
                    let started_at = self.store.generation();
                    self.clone().bootstrap(started_at).await;
                }
                Err(SubscriptionError::Closed) => {
                    tracing::debug!("Auth event stream closed");
                    break;
                }
            }
        }
    }

    async fn resolve_profile(&self, identity: Identity) {
        let ticket = self.store.next_profile_ticket();
        self.apply_resolved(ticket, identity).await;
    }

    async fn apply_resolved(&self, ticket: u64, identity: Identity) {
        let profile = self.resolver.resolve(Some(&identity)).await;
        self.store.apply_profile(ticket, &identity.id, profile);
    }
}

impl AuthContext {
    /// Start building a context over the given backend seams.
    #[must_use]
    pub fn builder(
        backend: Arc<dyn AuthBackend>,
        profiles: Arc<dyn ProfileSource>,
    ) -> AuthContextBuilder {
        AuthContextBuilder {
            backend,
            profiles,
            storage: None,
            config: AuthConfig::default(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.shared.store.snapshot()
    }

    /// Receiver that is notified on every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.shared.store.watch()
    }

    /// Wait until the state is no longer loading and return it.
    pub async fn wait_until_ready(&self) -> AuthSnapshot {
        let mut receiver = self.watch();
        let ready = receiver
            .wait_for(|snapshot| !snapshot.loading)
            .await
            .map(|snapshot| AuthSnapshot::clone(&snapshot));
        ready.unwrap_or_else(|_| self.snapshot())
    }

    /// Coarse status.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.snapshot().status()
    }

    /// Capabilities of the current user.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.snapshot().capabilities()
    }

    /// Sign in with email and password.
    ///
    /// The email is trimmed before submission. The new session is applied
    /// when the backend's change event arrives, not by this call.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` for malformed input,
    /// `AuthError::InvalidCredentials` if the service rejects the
    /// credentials, or `AuthError::Service` if it cannot be reached.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        validate_password(password)?;

        self.inner
            .shared
            .backend
            .sign_in_with_password(&email, password)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Password sign-in failed");
                AuthError::from(e)
            })?;

        tracing::info!("Password sign-in accepted");
        Ok(())
    }

    /// Ask the service to email a one-time sign-in link.
    ///
    /// Local state is untouched; the session arrives if and when the link
    /// is redeemed.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInput` for a malformed email, otherwise
    /// whatever the service reported.
    pub async fn sign_in_with_magic_link(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AuthError> {
        let email = normalize_email(email)?;

        self.inner
            .shared
            .backend
            .sign_in_with_otp(&email, redirect_to)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Magic link request failed");
                AuthError::from(e)
            })?;

        tracing::info!("Magic link requested");
        Ok(())
    }

    /// Sign out.
    ///
    /// Loading is raised for the duration. The service call is raced against
    /// the configured timeout; whatever it does, local session, identity and
    /// profile are cleared and persisted auth keys are purged.
    pub async fn sign_out(&self) {
        let inner = &self.inner;
        let _signing_out = inner.shared.store.begin_sign_out();

        match tokio::time::timeout(inner.sign_out_timeout, inner.shared.backend.sign_out()).await {
            Ok(Ok(())) => tracing::debug!("Service sign-out completed"),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Service sign-out failed, clearing local session anyway");
            }
            Err(_) => tracing::warn!(
                timeout_secs = inner.sign_out_timeout.as_secs(),
                "Service sign-out timed out, clearing local session anyway"
            ),
        }

        if let Some(storage) = &inner.storage {
            match purge_matching(storage.as_ref(), &inner.key_pattern) {
                Ok(removed) => tracing::debug!(removed, "Purged persisted auth keys"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge persisted auth keys"),
            }
        }

        tracing::info!("Signed out");
    }

    /// Re-resolve the profile for the current identity.
    ///
    /// A result that arrives after the identity changed, or after a newer
    /// resolution started, is discarded.
    pub async fn refresh_profile(&self) {
        let Some(identity) = self.snapshot().user().cloned() else {
            return;
        };
        self.inner.shared.resolve_profile(identity).await;
    }

    /// Stop the listener and release the backend subscription.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
        tracing::debug!("Auth context shut down");
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("status", &self.status())
            .field("sign_out_timeout", &self.inner.sign_out_timeout)
            .finish_non_exhaustive()
    }
}
