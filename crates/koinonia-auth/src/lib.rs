//! # Koinonia Auth
//!
//! Client-side authentication state for Koinonia.
//!
//! - [`AuthContext`]: one shared handle over the session, the user's profile,
//!   and the sign-in / sign-out actions
//! - [`resolve_capabilities`]: the single place roles and admin rights are derived
//! - [`RouteGuard`]: decides whether a location may render, given a snapshot
//!
//! This layer only decides what to render. The hosted service's row-level
//! security remains the authoritative check for every read and write.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod capabilities;
pub mod context;
pub mod error;
pub mod guard;
pub mod profile;
pub mod state;

mod session;

#[cfg(test)]
mod testing;

pub use capabilities::{CapabilitySet, Role, resolve_capabilities};
pub use context::{AuthContext, AuthContextBuilder};
pub use error::AuthError;
pub use guard::{GuardDecision, LoginRedirect, RouteGuard};
pub use profile::ProfileResolver;
pub use state::{AuthSnapshot, AuthStatus};
