//! Profile rows read through an entity store.

use std::sync::Arc;

use async_trait::async_trait;

use koinonia_core::types::{Profile, UserId};

use crate::query::Query;
use crate::traits::{BackendError, EntityStore, ProfileSource};

/// Reads profiles from a table on an entity store.
pub struct TableProfileSource<S: EntityStore + ?Sized> {
    store: Arc<S>,
    table: String,
}

impl<S: EntityStore + ?Sized> TableProfileSource<S> {
    /// Read profiles from `table`.
    #[must_use]
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
        }
    }

    async fn single(&self, column: &str, value: &str) -> Result<Option<Profile>, BackendError> {
        let rows = self
            .store
            .select(&self.table, &Query::new().eq(column, value).limit(1))
            .await?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(BackendError::from)
    }
}

#[async_trait]
impl<S: EntityStore + ?Sized> ProfileSource for TableProfileSource<S> {
    async fn profile_by_id(&self, id: &UserId) -> Result<Option<Profile>, BackendError> {
        self.single("id", id.as_ref()).await
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>, BackendError> {
        self.single("email", email).await
    }
}
