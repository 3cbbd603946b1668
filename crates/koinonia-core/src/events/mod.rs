//! Auth change events.
//!
//! The auth client publishes one event per session transition (sign-in,
//! sign-out, token refresh, user update). Subscribers see events in emission
//! order; each event carries a sequence number so ordering can be asserted.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::types::Session;

/// Default channel capacity for auth event broadcasts.
const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Kind of session transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    /// A session was established.
    SignedIn,
    /// The session ended (locally or by the service).
    SignedOut,
    /// The access token was refreshed.
    TokenRefreshed,
    /// The user record changed.
    UserUpdated,
}

impl std::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
        };
        f.write_str(name)
    }
}

/// A session change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChangeEvent {
    /// Monotonic sequence number assigned at emission.
    pub seq: u64,
    /// Transition kind.
    pub kind: AuthEventKind,
    /// Session after the transition (`None` when signed out).
    pub session: Option<Session>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

/// Errors from receiving on a subscription.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind and missed events.
    #[error("Subscriber lagged by {0} events")]
    Lagged(u64),

    /// The broadcaster was dropped.
    #[error("Event stream closed")]
    Closed,
}

/// Live subscription to auth change events.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthChangeEvent>,
}

impl AuthSubscription {
    /// Wait for the next event.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionError::Lagged` if events were dropped, or
    /// `SubscriptionError::Closed` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Result<AuthChangeEvent, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(n) => SubscriptionError::Lagged(n),
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
        })
    }
}

/// Broadcaster for auth change events.
pub struct AuthEventBroadcaster {
    sender: broadcast::Sender<AuthChangeEvent>,
    next_seq: Mutex<u64>,
}

impl AuthEventBroadcaster {
    /// Create a new broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with custom capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_seq: Mutex::new(0),
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// Sequence assignment and send happen under one lock, so concurrent
    /// emitters cannot deliver events out of sequence order.
    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) -> u64 {
        let mut next_seq = self
            .next_seq
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *next_seq += 1;
        let seq = *next_seq;

        let event = AuthChangeEvent {
            seq,
            kind,
            session,
            timestamp: Utc::now(),
        };

        // No subscribers is fine
        let delivered = self.sender.send(event).unwrap_or(0);
        tracing::debug!(%kind, seq, delivered, "Auth event emitted");
        seq
    }

    /// Subscribe to events emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuthEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEventBroadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
