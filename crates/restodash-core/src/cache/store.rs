//! Persistent key-value stores backing the second cache tier.
//!
//! A store holds string values under string keys and enforces a byte quota.
//! When a write would exceed the quota it fails with
//! [`StoreError::QuotaExceeded`] and leaves the previous value untouched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage entry: {0}")]
    Corrupt(String),
}

/// Key-value storage with a byte quota.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Bytes a key/value pair occupies against the quota.
fn footprint(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store kept in process memory, bounded by a byte quota.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: usize,
}

impl MemoryStore {
    pub fn new(quota: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota,
        }
    }

    /// Bytes currently counted against the quota.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| footprint(k, v))
            .sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(5 * 1024 * 1024)
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let used: usize = entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| footprint(k, v))
            .sum();
        let needed = used + footprint(key, value);
        if needed > self.quota {
            return Err(StoreError::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.keys().cloned().collect())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// Store that keeps one file per key inside a directory.
///
/// File names are the key with every byte outside `[A-Za-z0-9_-]`
/// percent-escaped, plus a `.json` suffix.
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
    // Serializes the quota check with the write that follows it.
    write_lock: Mutex<()>,
}

const FILE_SUFFIX: &str = ".json";

impl FileStore {
    pub fn new(dir: PathBuf, quota: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            quota,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}{}", escape_key(key), FILE_SUFFIX))
    }

    fn used_bytes_excluding(&self, key: &str) -> Result<usize, StoreError> {
        let mut used = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(stored_key) = name.to_str().and_then(key_from_file_name) else {
                continue;
            };
            if stored_key == key {
                continue;
            }
            used += stored_key.len() + entry.metadata()?.len() as usize;
        }
        Ok(used)
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let needed = self.used_bytes_excluding(key)? + footprint(key, value);
        if needed > self.quota {
            return Err(StoreError::QuotaExceeded {
                needed,
                quota: self.quota,
            });
        }
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let name = entry?.file_name();
            match name.to_str().and_then(key_from_file_name) {
                Some(key) => keys.push(key),
                None => debug!(file = ?name, "Skipping foreign file in cache directory"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn unescape_key(escaped: &str) -> Option<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = escaped.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn key_from_file_name(name: &str) -> Option<String> {
    unescape_key(name.strip_suffix(FILE_SUFFIX)?)
}
