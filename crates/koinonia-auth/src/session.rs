//! Session store: the only writer of [`AuthSnapshot`].
//!
//! Every mutation runs inside the watch channel's write lock, so the
//! counters below are read and bumped atomically with the state they guard.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::watch;

use koinonia_core::events::AuthChangeEvent;
use koinonia_core::types::{Identity, Profile, Session, UserId};

use crate::state::AuthSnapshot;

pub(crate) struct SessionStore {
    state: watch::Sender<AuthSnapshot>,
    /// Bumped whenever a change event (or sign-out) is applied.
    generation: AtomicU64,
    /// Sign-outs in flight; while non-zero they own the loading flag.
    signing_out: AtomicUsize,
    /// Newest profile resolution.
    profile_ticket: AtomicU64,
}

impl SessionStore {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(AuthSnapshot::loading());
        Self {
            state,
            generation: AtomicU64::new(0),
            signing_out: AtomicUsize::new(0),
            profile_ticket: AtomicU64::new(0),
        }
    }

    pub(crate) fn snapshot(&self) -> AuthSnapshot {
        self.state.borrow().clone()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.state.subscribe()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Apply a change event. Returns the identity whose profile should be
    /// resolved next.
    pub(crate) fn apply_event(&self, event: &AuthChangeEvent) -> Option<Identity> {
        let mut resolve = None;
        self.state.send_modify(|snapshot| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            resolve = self.replace_session(snapshot, event.session.clone());
        });
        tracing::debug!(seq = event.seq, kind = %event.kind, "Applied auth change event");
        resolve
    }

    /// Apply a session read from the backend, unless a change event was
    /// applied after `started_at` was taken.
    pub(crate) fn apply_fetched(
        &self,
        started_at: u64,
        session: Option<Session>,
    ) -> Option<Identity> {
        let mut resolve = None;
        let applied = self.state.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != started_at {
                return false;
            }
            resolve = self.replace_session(snapshot, session);
            true
        });

        if !applied {
            tracing::debug!("Discarded fetched session superseded by a newer event");
        }
        resolve
    }

    fn replace_session(
        &self,
        snapshot: &mut AuthSnapshot,
        session: Option<Session>,
    ) -> Option<Identity> {
        let previous = snapshot.user().map(|u| u.id.clone());
        let next = session.as_ref().map(|s| s.user.clone());

        if previous.as_ref() != next.as_ref().map(|u| &u.id) {
            snapshot.profile = None;
        }
        snapshot.session = session;
        if self.signing_out.load(Ordering::SeqCst) == 0 {
            snapshot.loading = false;
        }
        next
    }

    /// Mark a sign-out as started. Dropping the guard finishes it.
    pub(crate) fn begin_sign_out(&self) -> SignOutGuard<'_> {
        self.signing_out.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|snapshot| snapshot.loading = true);
        SignOutGuard { store: self }
    }

    fn finish_sign_out(&self) {
        self.profile_ticket.fetch_add(1, Ordering::SeqCst);
        self.state.send_modify(|snapshot| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            let remaining = self.signing_out.fetch_sub(1, Ordering::SeqCst) - 1;
            snapshot.session = None;
            snapshot.profile = None;
            snapshot.loading = remaining > 0;
        });
    }

    pub(crate) fn next_profile_ticket(&self) -> u64 {
        self.profile_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a resolved profile if it is still the newest resolution and
    /// the identity has not changed meanwhile.
    pub(crate) fn apply_profile(&self, ticket: u64, owner: &UserId, profile: Option<Profile>) -> bool {
        self.state.send_if_modified(|snapshot| {
            if self.profile_ticket.load(Ordering::SeqCst) != ticket {
                tracing::debug!(user = %owner, "Discarded superseded profile");
                return false;
            }
            if snapshot.user().map(|u| &u.id) != Some(owner) {
                tracing::debug!(user = %owner, "Discarded profile for previous identity");
                return false;
            }
            snapshot.profile = profile;
            true
        })
    }
}

pub(crate) struct SignOutGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for SignOutGuard<'_> {
    fn drop(&mut self) {
        self.store.finish_sign_out();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, session};
    use koinonia_core::events::AuthEventKind;

    #[test]
    fn test_event_clears_loading_and_returns_identity() {
        let store = SessionStore::new();
        assert!(store.snapshot().loading);

        let resolve = store.apply_event(&event(1, AuthEventKind::SignedIn, Some(session("u1"))));
        assert_eq!(resolve.map(|u| u.id), Some(UserId::new("u1")));

        let snapshot = store.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.user().map(|u| u.id.as_ref()), Some("u1"));
    }

    #[test]
    fn test_fetched_session_loses_to_newer_event() {
        let store = SessionStore::new();
        let started = store.generation();

        store.apply_event(&event(1, AuthEventKind::SignedIn, Some(session("u1"))));
        assert!(store.apply_fetched(started, None).is_none());
        assert_eq!(store.snapshot().user().map(|u| u.id.as_ref()), Some("u1"));
    }

    #[test]
    fn test_fetched_session_applies_when_current() {
        let store = SessionStore::new();
        let started = store.generation();
        assert!(store.apply_fetched(started, Some(session("u2"))).is_some());
        assert!(!store.snapshot().loading);
    }

    #[test]
    fn test_profile_kept_across_token_refresh() {
        let store = SessionStore::new();
        store.apply_event(&event(1, AuthEventKind::SignedIn, Some(session("u1"))));
        let ticket = store.next_profile_ticket();
        let profile = Profile {
            id: UserId::new("u1"),
            ..Profile::default()
        };
        assert!(store.apply_profile(ticket, &UserId::new("u1"), Some(profile.clone())));

        store.apply_event(&event(2, AuthEventKind::TokenRefreshed, Some(session("u1"))));
        assert_eq!(store.snapshot().profile, Some(profile));

        store.apply_event(&event(3, AuthEventKind::SignedIn, Some(session("u2"))));
        assert!(store.snapshot().profile.is_none());
    }

    #[test]
    fn test_profile_ticket_and_owner_checks() {
        let store = SessionStore::new();
        store.apply_event(&event(1, AuthEventKind::SignedIn, Some(session("u1"))));

        let old = store.next_profile_ticket();
        let new = store.next_profile_ticket();
        let owner = UserId::new("u1");
        assert!(!store.apply_profile(old, &owner, Some(Profile::default())));
        assert!(!store.apply_profile(new, &UserId::new("u2"), Some(Profile::default())));
        assert!(store.apply_profile(new, &owner, Some(Profile::default())));
    }

    #[test]
    fn test_sign_out_owns_loading() {
        let store = SessionStore::new();
        store.apply_event(&event(1, AuthEventKind::SignedIn, Some(session("u1"))));
        let ticket = store.next_profile_ticket();

        let guard = store.begin_sign_out();
        assert!(store.snapshot().loading);

        // Events during sign-out leave loading alone
        store.apply_event(&event(2, AuthEventKind::TokenRefreshed, Some(session("u1"))));
        assert!(store.snapshot().loading);

        drop(guard);
        let snapshot = store.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.session.is_none());
        assert!(snapshot.profile.is_none());

        // In-flight resolutions from before the sign-out are void
        assert!(!store.apply_profile(ticket, &UserId::new("u1"), Some(Profile::default())));
    }
}
