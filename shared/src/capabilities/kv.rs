use crux_kv::error::KeyValueError;
use crux_kv::value::Value;
use crux_kv::{KeyValueOperation, KeyValueResponse, KeyValueResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{instrument, warn};

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 10 * 1024 * 1024;

/// A validated slot name. Keys arrive from the core as plain strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KvKey(String);

impl KvKey {
    pub fn new(key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        let invalid = |reason: &str| KvError::InvalidKey {
            key: key.chars().take(50).collect(),
            reason: reason.to_string(),
        };

        if key.trim().is_empty() {
            return Err(invalid("key cannot be empty or only whitespace"));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(invalid("key exceeds maximum length"));
        }
        if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(invalid("key cannot contain path traversal sequences"));
        }
        if key.chars().any(|c| c.is_control()) {
            return Err(invalid("key contains control characters"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("value for '{key}' is not UTF-8 text")]
    NotText { key: String },

    #[error("storage error: {message} (code: {code:?})")]
    Storage {
        code: StorageErrorCode,
        message: String,
    },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self::Storage {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Corrupted,
    Locked,
    IoError,
}

/// Durable string slots backing the core's key-value effects. A `set` that
/// returns `Ok` has reached the backing medium.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError>;
    /// Returns the previous value.
    fn set(&self, key: &KvKey, value: String) -> Result<Option<String>, KvError>;
    /// Returns the removed value.
    fn remove(&self, key: &KvKey) -> Result<Option<String>, KvError>;
}

/// Answers one key-value effect against `store`.
#[instrument(skip_all)]
pub fn resolve(store: &dyn KeyValueStore, operation: &KeyValueOperation) -> KeyValueResult {
    let outcome = match operation {
        KeyValueOperation::Get { key } => KvKey::new(key.as_str())
            .and_then(|k| store.get(&k))
            .map(|value| KeyValueResponse::Get {
                value: bytes_of(value),
            }),
        KeyValueOperation::Set { key, value } => KvKey::new(key.as_str()).and_then(|k| {
            let text = String::from_utf8(value.clone()).map_err(|_| KvError::NotText {
                key: key.clone(),
            })?;
            store.set(&k, text).map(|previous| KeyValueResponse::Set {
                previous: bytes_of(previous),
            })
        }),
        KeyValueOperation::Delete { key } => KvKey::new(key.as_str())
            .and_then(|k| store.remove(&k))
            .map(|previous| KeyValueResponse::Delete {
                previous: bytes_of(previous),
            }),
        other => {
            return KeyValueResult::Err {
                error: KeyValueError::Other {
                    message: format!("unsupported operation: {other:?}"),
                },
            }
        }
    };

    match outcome {
        Ok(response) => KeyValueResult::Ok { response },
        Err(e) => {
            warn!(error = %e, "key-value operation failed");
            KeyValueResult::Err {
                error: KeyValueError::Io {
                    message: e.to_string(),
                },
            }
        }
    }
}

fn bytes_of(value: Option<String>) -> Value {
    match value {
        Some(text) => Value::Bytes(text.into_bytes()),
        None => Value::None,
    }
}

fn check_size(value: &str) -> Result<(), KvError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(KvError::ValueTooLarge {
            size: value.len(),
            max: MAX_VALUE_SIZE,
        });
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, KvError> {
    mutex
        .lock()
        .map_err(|_| KvError::storage(StorageErrorCode::Locked, "store lock poisoned"))
}

#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a raw slot, bypassing size checks. Lets tests plant corrupt data.
    pub fn with_raw(self, key: &str, value: impl Into<String>) -> Self {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.into());
        }
        self
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        Ok(lock(&self.entries)?.get(key.as_str()).cloned())
    }

    fn set(&self, key: &KvKey, value: String) -> Result<Option<String>, KvError> {
        check_size(&value)?;
        Ok(lock(&self.entries)?.insert(key.as_str().to_string(), value))
    }

    fn remove(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        Ok(lock(&self.entries)?.remove(key.as_str()))
    }
}

/// All slots in one JSON document on disk. Every write replaces the file
/// atomically (temp file, fsync, rename).
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKvStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, KvError> {
        let path = path.into();
        let entries = if path.exists() {
            let bytes = std::fs::read(&path).map_err(io_error)?;
            if bytes.is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_slice(&bytes).map_err(|e| {
                    KvError::storage(
                        StorageErrorCode::Corrupted,
                        format!("{}: {e}", path.display()),
                    )
                })?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), KvError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|e| {
            KvError::storage(StorageErrorCode::IoError, format!("encode failed: {e}"))
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_error)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let mut file = File::create(&tmp_path).map_err(io_error)?;
        file.write_all(&bytes).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;

        std::fs::rename(&tmp_path, &self.path).map_err(io_error)?;

        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        Ok(())
    }

    /// Applies `mutate` to a copy of the document and only keeps it once the
    /// copy is on disk.
    fn write_through<R>(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> Result<R, KvError> {
        let mut entries = lock(&self.entries)?;
        let mut next = entries.clone();
        let out = mutate(&mut next);
        self.flush(&next)?;
        *entries = next;
        Ok(out)
    }
}

fn io_error(e: std::io::Error) -> KvError {
    KvError::storage(StorageErrorCode::IoError, e.to_string())
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        Ok(lock(&self.entries)?.get(key.as_str()).cloned())
    }

    fn set(&self, key: &KvKey, value: String) -> Result<Option<String>, KvError> {
        check_size(&value)?;
        let name = key.as_str().to_string();
        self.write_through(|entries| entries.insert(name, value))
    }

    fn remove(&self, key: &KvKey) -> Result<Option<String>, KvError> {
        self.write_through(|entries| entries.remove(key.as_str()))
    }
}
