//! Local persisted key cache, outside the durable store.
//!
//! A simple JSON key-value file scoped by dataset identifier: whether
//! encryption is locally enabled, the cached derived key (raw, base64), and
//! the cached key version. The cached key is only trustworthy while its
//! version matches the published `encryptionKeyVersion`; the coordinator
//! discards it otherwise.

use std::collections::BTreeMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};
use crate::fs::rename_with_fallback;

/// Cached encryption state for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedKey {
    /// Whether encryption is locally enabled for this dataset.
    pub enabled: bool,

    /// The derived key, exported raw as base64.
    pub key_b64: String,

    /// Key version the cached key was derived under.
    pub version: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    datasets: BTreeMap<String, CachedKey>,
}

/// File-backed key cache.
pub struct KeyCache {
    path: PathBuf,
}

impl KeyCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the cached entry for a dataset, if any.
    pub fn load(&self, dataset_id: &str) -> Result<Option<CachedKey>> {
        let file = self.read_file()?;
        Ok(file.datasets.get(dataset_id).cloned())
    }

    /// Store (or replace) the cached entry for a dataset.
    pub fn store(&self, dataset_id: &str, entry: &CachedKey) -> Result<()> {
        let mut file = self.read_file()?;
        file.datasets.insert(dataset_id.to_string(), entry.clone());
        self.write_file(&file)
    }

    /// Remove the cached entry for a dataset. Missing entries are a no-op.
    pub fn clear(&self, dataset_id: &str) -> Result<()> {
        let mut file = self.read_file()?;
        if file.datasets.remove(dataset_id).is_some() {
            self.write_file(&file)?;
        }
        Ok(())
    }

    fn read_file(&self) -> Result<CacheFile> {
        match fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| RosterError::Storage(format!("Corrupt key cache: {}", e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheFile::default()),
            Err(e) => Err(RosterError::Storage(format!("Key cache read failed: {}", e))),
        }
    }

    fn write_file(&self, file: &CacheFile) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| RosterError::Storage("Invalid key cache path".to_string()))?;
        fs::create_dir_all(parent)?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RosterError::Storage(format!("System time error: {}", e)))?
            .as_nanos();
        let filename = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| RosterError::Storage("Invalid key cache filename".to_string()))?;
        let temp_path = parent.join(format!("{}.{}.tmp", filename, nanos));

        let payload = serde_json::to_string_pretty(file)
            .map_err(|e| RosterError::Storage(format!("Key cache encode failed: {}", e)))?;
        let mut handle = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| RosterError::Storage(format!("Temp file create failed: {}", e)))?;
        handle
            .write_all(payload.as_bytes())
            .map_err(|e| RosterError::Storage(format!("Temp file write failed: {}", e)))?;
        handle
            .sync_all()
            .map_err(|e| RosterError::Storage(format!("Temp file sync failed: {}", e)))?;

        rename_with_fallback(&temp_path, &self.path)
            .map_err(|e| RosterError::Storage(format!("Atomic rename failed: {}", e)))?;
        Ok(())
    }
}
