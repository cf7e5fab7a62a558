//! Local durable storage.
//!
//! The whole clinic state lives in one JSON blob under a fixed key. Writes
//! are synchronous and bounded by a quota; a write that would exceed it
//! fails with [`LocalStoreError::QuotaExceeded`] and leaves the previous
//! blob in place.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use clinic_engine::ClinicState;
use dashmap::DashMap;

/// Key the state blob is stored under.
pub const STATE_KEY: &str = "clinic-state";

/// Local storage errors.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("local storage is full ({needed} bytes needed, quota is {quota})")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("local storage unavailable: {0}")]
    Unavailable(String),

    #[error("stored state is unreadable: {0}")]
    Corrupt(String),
}

impl From<io::Error> for LocalStoreError {
    fn from(e: io::Error) -> Self {
        LocalStoreError::Unavailable(e.to_string())
    }
}

/// String key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError>;
}

/// Whole-state persistence used by the data service.
pub trait LocalStore: Send + Sync {
    /// Read the state blob, if one was ever written.
    fn load_all(&self) -> Result<Option<ClinicState>, LocalStoreError>;
    /// Replace the state blob.
    fn save_all(&self, state: &ClinicState) -> Result<(), LocalStoreError>;
}

fn check_quota(value: &str, quota: usize) -> Result<(), LocalStoreError> {
    if value.len() > quota {
        return Err(LocalStoreError::QuotaExceeded {
            needed: value.len(),
            quota,
        });
    }
    Ok(())
}

/// Key-value store backed by one file per key in a directory.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    quota: usize,
}

impl FileKeyValueStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(dir: impl Into<PathBuf>, quota: usize) -> Result<Self, LocalStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        check_quota(value, self.quota)?;

        // Write beside the target, then rename over it.
        let target = self.path_for(key);
        let tmp = target.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &target)?;

        tracing::debug!(key = %key, bytes = value.len(), "local item written");
        Ok(())
    }
}

/// In-memory key-value store with an optional quota and injectable faults.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: DashMap<String, String>,
    quota: Option<usize>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::default()
        }
    }

    /// Make every read fail as if storage were missing.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail as if storage were missing.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.value().clone())
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("reads disabled".into()));
        }
        Ok(self.raw(key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LocalStoreError::Unavailable("writes disabled".into()));
        }
        if let Some(quota) = self.quota {
            check_quota(value, quota)?;
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// [`LocalStore`] over any key-value store, under [`STATE_KEY`].
pub struct LocalStateStore<K> {
    kv: K,
}

impl<K: KeyValueStore> LocalStateStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn inner(&self) -> &K {
        &self.kv
    }
}

impl<K: KeyValueStore> LocalStore for LocalStateStore<K> {
    fn load_all(&self) -> Result<Option<ClinicState>, LocalStoreError> {
        match self.kv.get_item(STATE_KEY)? {
            Some(raw) => ClinicState::from_json(&raw)
                .map(Some)
                .map_err(|e| LocalStoreError::Corrupt(e.to_string())),
            None => Ok(None),
        }
    }

    fn save_all(&self, state: &ClinicState) -> Result<(), LocalStoreError> {
        let json = state
            .to_json()
            .map_err(|e| LocalStoreError::Corrupt(e.to_string()))?;
        self.kv.set_item(STATE_KEY, &json)
    }
}
