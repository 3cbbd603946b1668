//! # Koinonia Backend
//!
//! Clients for the hosted auth and database service: the auth API that
//! issues sessions, and the row API that serves named record collections.
//!
//! Row-level security on the service is the authoritative authorization
//! layer; nothing here replaces it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod traits;
pub mod query;
mod entities;
mod memory;
mod profiles;
mod supabase;

pub use traits::{AuthBackend, BackendError, EntityStore, ProfileSource};
pub use query::Query;
pub use entities::{Collection, Entities};
pub use memory::MemoryEntityStore;
pub use profiles::TableProfileSource;
pub use supabase::SupabaseClient;
