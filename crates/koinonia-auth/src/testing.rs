//! Test doubles for the backend seams.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use koinonia_backend::{AuthBackend, BackendError, ProfileSource};
use koinonia_core::events::{AuthChangeEvent, AuthEventBroadcaster, AuthEventKind, AuthSubscription};
use koinonia_core::secrets::Token;
use koinonia_core::types::{Identity, Profile, Session, UserId};

pub fn session(id: &str) -> Session {
    session_with_email(id, None)
}

pub fn session_with_email(id: &str, email: Option<&str>) -> Session {
    Session {
        access_token: Token::new(format!("token-{id}")),
        refresh_token: None,
        token_type: "bearer".to_string(),
        expires_at: None,
        user: Identity::new(id, email.map(str::to_string)),
    }
}

pub fn event(seq: u64, kind: AuthEventKind, session: Option<Session>) -> AuthChangeEvent {
    AuthChangeEvent {
        seq,
        kind,
        session,
        timestamp: chrono::Utc::now(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutMode {
    Succeed,
    Fail,
    Hang,
}

/// Auth backend that keeps everything in memory.
pub struct FakeBackend {
    pub events: AuthEventBroadcaster,
    session: Mutex<Option<Session>>,
    get_session_gate: Option<Arc<Notify>>,
    get_session_fails: bool,
    get_session_calls: AtomicUsize,
    sign_out_mode: Mutex<SignOutMode>,
    pub password_attempts: Mutex<Vec<(String, String)>>,
    pub magic_links: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeBackend {
    pub fn new(session: Option<Session>) -> Self {
        Self {
            events: AuthEventBroadcaster::new(),
            session: Mutex::new(session),
            get_session_gate: None,
            get_session_fails: false,
            get_session_calls: AtomicUsize::new(0),
            sign_out_mode: Mutex::new(SignOutMode::Succeed),
            password_attempts: Mutex::new(Vec::new()),
            magic_links: Mutex::new(Vec::new()),
        }
    }

    /// `get_session` waits until the returned gate is notified.
    pub fn gated(session: Option<Session>) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let backend = Self {
            get_session_gate: Some(Arc::clone(&gate)),
            ..Self::new(session)
        };
        (backend, gate)
    }

    pub fn failing() -> Self {
        Self {
            get_session_fails: true,
            ..Self::new(None)
        }
    }

    pub fn set_sign_out_mode(&self, mode: SignOutMode) {
        *self.sign_out_mode.lock().unwrap() = mode;
    }

    pub fn get_session_calls(&self) -> usize {
        self.get_session_calls.load(Ordering::SeqCst)
    }

    /// Simulate a session change originating on the service.
    pub fn push(&self, kind: AuthEventKind, session: Option<Session>) {
        self.session.lock().unwrap().clone_from(&session);
        self.events.emit(kind, session);
    }
}

#[async_trait]
impl AuthBackend for FakeBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        if let Some(gate) = &self.get_session_gate {
            gate.notified().await;
        }
        self.get_session_calls.fetch_add(1, Ordering::SeqCst);
        if self.get_session_fails {
            return Err(BackendError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.session.lock().unwrap().clone())
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.password_attempts
            .lock()
            .unwrap()
            .push((email.to_string(), password.to_string()));

        if email != "A@B.com" || password != "secret" {
            return Err(BackendError::InvalidCredentials(
                "Invalid login credentials".to_string(),
            ));
        }

        let session = session_with_email("u1", Some(email));
        self.push(AuthEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_in_with_otp(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), BackendError> {
        self.magic_links
            .lock()
            .unwrap()
            .push((email.to_string(), redirect_to.map(str::to_string)));
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let mode = *self.sign_out_mode.lock().unwrap();
        self.push(AuthEventKind::SignedOut, None);
        match mode {
            SignOutMode::Succeed => Ok(()),
            SignOutMode::Fail => Err(BackendError::Api {
                status: 500,
                message: "logout failed".to_string(),
            }),
            SignOutMode::Hang => std::future::pending().await,
        }
    }
}

/// Profile rows keyed by id and email, with optional per-id gates.
#[derive(Default)]
pub struct FakeProfiles {
    by_id: Mutex<HashMap<String, Profile>>,
    by_email: Mutex<HashMap<String, Profile>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    fail: bool,
    pub lookups: AtomicUsize,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, profile: Profile) {
        if let Some(email) = &profile.email {
            self.by_email
                .lock()
                .unwrap()
                .insert(email.clone(), profile.clone());
        }
        self.by_id
            .lock()
            .unwrap()
            .insert(profile.id.to_string(), profile);
    }

    pub fn insert_legacy(&self, email: &str, profile: Profile) {
        self.by_email
            .lock()
            .unwrap()
            .insert(email.to_string(), profile);
    }

    /// Lookups for `id` wait until the returned gate is notified.
    pub fn gate(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl ProfileSource for FakeProfiles {
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BackendError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().get(id.as_ref()).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(BackendError::Api {
                status: 404,
                message: "relation \"profiles\" does not exist".to_string(),
            });
        }
        Ok(self.by_id.lock().unwrap().get(id.as_ref()).cloned())
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, BackendError> {
        if self.fail {
            return Err(BackendError::Api {
                status: 404,
                message: "relation \"profiles\" does not exist".to_string(),
            });
        }
        Ok(self.by_email.lock().unwrap().get(email).cloned())
    }
}
