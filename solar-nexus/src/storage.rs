//! Durable key-value storage backing the persisted slice of the state store.
//!
//! Storage is an external, fallible resource: every operation returns a
//! [`StorageError`] and callers in this crate log failures instead of
//! propagating them.

use snafu::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    #[snafu(display("Storage file {}: {source}", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Storage contents are not valid JSON: {source}"))]
    Format { source: serde_json::Error },

    #[snafu(display("Storage quota of {quota} bytes exceeded"))]
    QuotaExceeded { quota: usize },

    #[snafu(display("Storage is unavailable"))]
    Unavailable,
}

/// A string-to-string store that survives restarts.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage. Clones share the same map, so a "fresh process" in
/// tests is a new `StateStore` built over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    items: HashMap<String, String>,
    quota: Option<usize>,
    disabled: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total stored bytes past `quota`.
    pub fn with_quota(self, quota: usize) -> Self {
        self.lock().quota = Some(quota);
        self
    }

    /// Make every operation fail, like a browser with storage turned off.
    pub fn set_disabled(&self, disabled: bool) {
        self.lock().disabled = disabled;
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let inner = self.lock();
        ensure!(!inner.disabled, UnavailableSnafu);
        Ok(inner.items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        ensure!(!inner.disabled, UnavailableSnafu);
        if let Some(quota) = inner.quota {
            let used: usize = inner
                .items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            ensure!(used + key.len() + value.len() <= quota, QuotaExceededSnafu { quota });
        }
        inner.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        ensure!(!inner.disabled, UnavailableSnafu);
        inner.items.remove(key);
        Ok(())
    }
}

/// Storage persisted as a single JSON object file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`. A missing file starts empty; a corrupt one
    /// is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = match Self::read(&path) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(path = %path.display(), %error, "discarding unreadable storage file");
                BTreeMap::new()
            }
        };
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    /// Default location under the platform data directory.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("solar-site")
            .join("storage.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).context(FormatSnafu),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(source) => Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn flush(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context(IoSnafu { path: parent })?;
        }
        let contents = serde_json::to_string_pretty(items).context(FormatSnafu)?;
        std::fs::write(&self.path, contents).context(IoSnafu { path: &self.path })
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        self.flush(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        if items.remove(key).is_some() {
            self.flush(&items)?;
        }
        Ok(())
    }
}
