//! # Koinonia Core
//!
//! Core types, configuration, and storage for Koinonia.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Identity, session, and profile types
//! - Auth change events and their broadcaster
//! - Secret token wrappers that never print their contents
//! - Persisted key/value storage for session tokens
//! - Input validation and sanitization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod events;
pub mod secrets;
pub mod storage;
pub mod types;
pub mod validation;

pub use config::{AuthConfig, Config, ConfigError, RoutesConfig, ServiceConfig};
pub use events::{
    AuthChangeEvent, AuthEventBroadcaster, AuthEventKind, AuthSubscription, SubscriptionError,
};
pub use secrets::Token;
pub use storage::{
    KeyPattern, MemoryStorage, SessionStorage, SledStorage, StorageError, purge_matching,
};
pub use types::{Identity, Profile, Session, UserId};
pub use validation::{ValidationError, normalize_email, sanitize_redirect_target};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::events::{AuthChangeEvent, AuthEventKind};
    pub use crate::storage::SessionStorage;
    pub use crate::types::*;
}
