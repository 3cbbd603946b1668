//! Typed access to the application's record collections.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::query::Query;
use crate::traits::{BackendError, EntityStore};

/// Named record collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// User profiles.
    Profiles,
    /// Scripture studies.
    Studies,
    /// Church courses.
    Courses,
    /// Study groups.
    StudyGroups,
    /// Group discussions.
    Discussions,
    /// Churches.
    Churches,
}

impl Collection {
    /// Table name on the row API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Studies => "studies",
            Self::Courses => "courses",
            Self::StudyGroups => "study_groups",
            Self::Discussions => "discussions",
            Self::Churches => "churches",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform create/filter/update/delete over collections.
///
/// Stateless apart from the shared store handle; safe to clone and call
/// from many places at once.
pub struct Entities<S: EntityStore + ?Sized> {
    store: Arc<S>,
}

impl<S: EntityStore + ?Sized> Clone for Entities<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: EntityStore + ?Sized> Entities<S> {
    /// Wrap a store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read records matching the query.
    ///
    /// # Errors
    ///
    /// Returns error if the store fails or rows do not deserialize.
    pub async fn filter<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<T>, BackendError> {
        let rows = self.store.select(collection.as_str(), query).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(BackendError::from))
            .collect()
    }

    /// Create a record and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the row.
    pub async fn create<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        collection: Collection,
        record: &T,
    ) -> Result<R, BackendError> {
        let row = serde_json::to_value(record)?;
        let stored = self.store.insert(collection.as_str(), row).await?;
        Ok(serde_json::from_value(stored)?)
    }

    /// Patch the record with the given id.
    ///
    /// Returns `None` when no row matched (missing, or hidden by row-level
    /// security).
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the patch.
    pub async fn update<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        collection: Collection,
        id: &str,
        patch: &T,
    ) -> Result<Option<R>, BackendError> {
        let patch = serde_json::to_value(patch)?;
        let rows = self
            .store
            .update(collection.as_str(), &Query::new().eq("id", id), patch)
            .await?;
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(BackendError::from)
    }

    /// Delete the record with the given id.
    ///
    /// # Errors
    ///
    /// Returns error if the store rejects the delete.
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<(), BackendError> {
        self.store
            .delete(collection.as_str(), &Query::new().eq("id", id))
            .await
    }
}
