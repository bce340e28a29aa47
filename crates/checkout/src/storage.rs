//! Persisted local state.
//!
//! The cart, wishlist, and session survive process restarts through a small
//! key/value [`StateStore`]. Production uses [`JsonFileStore`] (one JSON file
//! per record under the configured state directory); tests use
//! [`MemoryStore`].
//!
//! Persisted records carry a schema `version` tag. A record that fails to
//! parse, or whose version is unknown, is treated as corrupt: the owner logs
//! a warning and resets to its empty default rather than crashing.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;

/// Record keys within a [`StateStore`].
pub mod keys {
    /// Key for the persisted cart record.
    pub const CART: &str = "cart";

    /// Key for the persisted wishlist record.
    pub const WISHLIST: &str = "wishlist";

    /// Key for the persisted session record.
    pub const SESSION: &str = "session";
}

/// Errors that can occur reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The store is unavailable (used by tests to simulate outages).
    #[error("state store unavailable")]
    Unavailable,
}

/// A key/value store for serialized local state.
///
/// Implementations are synchronous: persisted state is small and local, and
/// cart mutations must never suspend on storage.
pub trait StateStore {
    /// Load the raw record for `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Save the raw record for `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the record for `key`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Load and deserialize a record, treating corrupt data as absent.
///
/// Storage and parse failures are logged and mapped to `None` so callers can
/// fall back to their empty defaults.
pub fn load_json<T: DeserializeOwned>(store: &impl StateStore, key: &str) -> Option<T> {
    let raw = match store.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "failed to load persisted state");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "corrupt persisted state, resetting to default");
            None
        }
    }
}

/// Serialize and save a record.
///
/// # Errors
///
/// Returns an error if serialization or the underlying store fails. Callers
/// that own in-memory authoritative state swallow and log this.
pub fn save_json<T: Serialize>(
    store: &impl StateStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value)?;
    store.save(key, &raw)
}

// =============================================================================
// JsonFileStore
// =============================================================================

/// File-backed store: one `<key>.json` file per record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        // Write-then-rename so a crash mid-write never leaves a torn record
        let tmp = self.dir.join(format!("{key}.json.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory store for tests and ephemeral sessions.
///
/// `MemoryStore::failing()` simulates an unavailable store, for exercising
/// the swallow-and-log persistence policy.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
    failing: bool,
}

impl MemoryStore {
    /// Create an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose every operation fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// A second handle onto the same entries, for tests that hand the store
    /// to one owner and later reopen it as another.
    #[must_use]
    pub fn clone_handle(&self) -> Self {
        Self {
            entries: Rc::clone(&self.entries),
            failing: self.failing,
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.failing {
            return Err(StorageError::Unavailable);
        }
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failing {
            return Err(StorageError::Unavailable);
        }
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.failing {
            return Err(StorageError::Unavailable);
        }
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}
