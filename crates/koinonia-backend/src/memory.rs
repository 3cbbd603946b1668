//! In-process entity store.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::query::Query;
use crate::traits::{BackendError, EntityStore};

/// Entity store that keeps rows in memory.
///
/// Rows without an `id` get a generated one on insert.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    next_id: AtomicU64,
}

impl MemoryEntityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with rows for one collection.
    #[must_use]
    pub fn with_rows(collection: &str, rows: Vec<Value>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            tables.insert(collection.to_string(), rows);
        }
        store
    }

    fn poisoned() -> BackendError {
        BackendError::Config("entity store lock poisoned".to_string())
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn select(&self, collection: &str, query: &Query) -> Result<Vec<Value>, BackendError> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .get(collection)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    async fn insert(&self, collection: &str, mut row: Value) -> Result<Value, BackendError> {
        let Value::Object(map) = &mut row else {
            return Err(BackendError::Api {
                status: 400,
                message: "row must be a JSON object".to_string(),
            });
        };

        if !map.contains_key("id") {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            map.insert("id".to_string(), Value::String(format!("{collection}-{id}")));
        }

        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        tables
            .entry(collection.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        collection: &str,
        query: &Query,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let Value::Object(patch) = patch else {
            return Err(BackendError::Api {
                status: 400,
                message: "patch must be a JSON object".to_string(),
            });
        };

        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let mut updated = Vec::new();

        if let Some(rows) = tables.get_mut(collection) {
            for row in rows.iter_mut().filter(|r| query.matches(r)) {
                if let Value::Object(map) = row {
                    for (key, value) in &patch {
                        map.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }

        Ok(updated)
    }

    async fn delete(&self, collection: &str, query: &Query) -> Result<(), BackendError> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        if let Some(rows) = tables.get_mut(collection) {
            rows.retain(|r| !query.matches(r));
        }
        Ok(())
    }
}
