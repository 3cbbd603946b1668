//! Persisted key/value storage for session tokens.
//!
//! Plays the role browser local storage plays for a web client: the auth
//! client writes the serialized session under a well-known key so it survives
//! restarts, and a hard sign-out scrubs every key that looks like one.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use thiserror::Error;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Sled error.
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    /// Stored value is not valid UTF-8.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Lock was poisoned by a panicking writer.
    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Key/value storage for persisted session data.
pub trait SessionStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// List all keys.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read.
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Naming convention of keys written by the auth client.
///
/// A key matches when it contains both the service token and the auth token,
/// e.g. `sb-abcd-auth-token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPattern {
    /// Service-name token (e.g. `sb-`).
    pub service_token: String,
    /// Auth token (e.g. `auth`).
    pub auth_token: String,
}

impl KeyPattern {
    /// Create a new key pattern.
    #[must_use]
    pub fn new(service_token: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            service_token: service_token.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Check whether a key follows the pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        key.contains(&self.service_token) && key.contains(&self.auth_token)
    }
}

impl Default for KeyPattern {
    fn default() -> Self {
        Self::new("sb-", "auth")
    }
}

/// Remove every key that matches the pattern.
///
/// Returns the number of keys removed.
///
/// # Errors
///
/// Returns error if listing or removing keys fails.
pub fn purge_matching(
    storage: &dyn SessionStorage,
    pattern: &KeyPattern,
) -> Result<usize, StorageError> {
    let mut removed = 0;
    for key in storage.keys()? {
        if pattern.matches(&key) {
            storage.remove(&key)?;
            tracing::debug!(key = %key, "Removed persisted auth key");
            removed += 1;
        }
    }
    Ok(removed)
}

/// In-memory storage, lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Create an empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.keys().cloned().collect())
    }
}

/// Storage backed by sled.
pub struct SledStorage {
    db: sled::Db,
    tree: sled::Tree,
}

impl SledStorage {
    /// Open or create storage in the given directory.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::with_db(db)
    }

    /// Create storage on an existing sled database.
    ///
    /// # Errors
    ///
    /// Returns error if the tree cannot be opened.
    pub fn with_db(db: sled::Db) -> Result<Self, StorageError> {
        let tree = db.open_tree("local_storage")?;
        Ok(Self { db, tree })
    }

    /// Flush pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SledStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStorage")
            .field("entries", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl SessionStorage for SledStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.tree.get(key.as_bytes())? {
            Some(value) => Ok(Some(String::from_utf8(value.to_vec())?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.tree.insert(key.as_bytes(), value.as_bytes())?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.tree.remove(key.as_bytes())?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.tree
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8(key?.to_vec())?))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_key_pattern() {
        let pattern = KeyPattern::default();
        assert!(pattern.matches("sb-abcd-auth-token"));
        assert!(!pattern.matches("sb-abcd-theme"));
        assert!(!pattern.matches("auth-token"));
    }

    #[test]
    fn test_purge_matching_memory() {
        let storage = MemoryStorage::new();
        storage.set("sb-abcd-auth-token", "{}").unwrap();
        storage.set("sb-abcd-auth-token-code-verifier", "x").unwrap();
        storage.set("theme", "dark").unwrap();

        let removed = purge_matching(&storage, &KeyPattern::default()).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(storage.keys().unwrap(), vec!["theme".to_string()]);
    }

    #[test]
    fn test_sled_storage() {
        let temp = tempdir().unwrap();
        let storage = SledStorage::open(temp.path()).unwrap();

        storage.set("sb-local-auth-token", "session").unwrap();
        storage.set("other", "value").unwrap();
        assert_eq!(
            storage.get("sb-local-auth-token").unwrap().as_deref(),
            Some("session")
        );

        let removed = purge_matching(&storage, &KeyPattern::default()).unwrap();
        assert_eq!(removed, 1);
        assert!(storage.get("sb-local-auth-token").unwrap().is_none());
        assert_eq!(storage.get("other").unwrap().as_deref(), Some("value"));
    }

    #[test]
    fn test_remove_missing_key() {
        let storage = MemoryStorage::new();
        assert!(storage.remove("nope").is_ok());
    }
}
