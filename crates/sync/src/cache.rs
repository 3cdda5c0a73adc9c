//! Device-local write-through cache.
//!
//! The cache mirrors every state transition to the device so a guest's cart
//! and wishlist survive restarts. It is not a cache in the eviction sense:
//! one entry per document, rewritten on every change, read once at startup.
//!
//! Storage is split in two layers:
//! - [`DeviceStorage`] - raw string key/value persistence (local-storage like)
//! - [`DeviceCache`] - typed JSON encoding of one [`SyncDocument`] on top
//!
//! A stored payload that fails to parse is deleted and treated as absent.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use atelier_core::SyncDocument;

use crate::error::CacheError;

/// Raw key/value storage on the device.
pub trait DeviceStorage: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the underlying storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;

    /// Delete a value. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Io` if the value exists but cannot be removed.
    fn remove(&self, key: &str) -> Result<(), CacheError>;
}

/// One JSON file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `dir`. The directory is created lazily.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl DeviceStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match std::fs::read(self.path_for(key)) {
            // Invalid UTF-8 is passed through lossily so it fails to parse
            // and gets discarded like any other corrupt payload.
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a half-written entry.
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, self.path_for(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory storage, for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Typed write-through mirror of one document.
pub struct DeviceCache<D> {
    storage: Arc<dyn DeviceStorage>,
    _doc: PhantomData<fn() -> D>,
}

impl<D> Clone for DeviceCache<D> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            _doc: PhantomData,
        }
    }
}

impl<D: SyncDocument> DeviceCache<D> {
    /// Create a cache for `D` on top of `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn DeviceStorage>) -> Self {
        Self {
            storage,
            _doc: PhantomData,
        }
    }

    /// Storage key of this document (`"cart"` or `"wishlist"`).
    #[must_use]
    pub fn key(&self) -> &'static str {
        D::KIND.as_str()
    }

    /// Load the cached state.
    ///
    /// Returns `None` when nothing is stored or the entry is unreadable. A
    /// payload that fails to parse is deleted before returning.
    pub fn load(&self) -> Option<D> {
        let key = self.key();
        let raw = match self.storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read device cache");
                return None;
            }
        };

        match serde_json::from_str::<D>(&raw) {
            Ok(state) => {
                debug!(key, entries = state.len(), "Hydrated from device cache");
                Some(state)
            }
            Err(e) => {
                warn!(key, error = %e, "Discarding corrupt device cache entry");
                if let Err(e) = self.storage.remove(key) {
                    warn!(key, error = %e, "Failed to delete corrupt device cache entry");
                }
                None
            }
        }
    }

    /// Persist a state, reporting failures to the caller.
    ///
    /// # Errors
    ///
    /// Returns `CacheError` if the state cannot be encoded or written.
    pub fn try_save(&self, state: &D) -> Result<(), CacheError> {
        let raw = serde_json::to_string(state)?;
        self.storage.set(self.key(), &raw)
    }

    /// Persist a state. Failures are logged; the in-memory state stays usable.
    pub fn save(&self, state: &D) {
        if let Err(e) = self.try_save(state) {
            warn!(key = self.key(), error = %e, "Failed to write device cache");
        }
    }
}
