//! CLI configuration file handling.
//!
//! Settings live in a TOML file (default `$XDG_CONFIG_HOME/busboard/config.toml`):
//! the local store path, the shared dataset identifier, and the optional
//! remote backend URL. The key cache sits next to the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct BusboardConfig {
    pub store: StoreSection,
    pub sync: SyncSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SyncSection {
    /// Shared dataset identifier; all collaborating devices must use the
    /// same value to see each other's data.
    pub dataset_id: String,

    /// Remote backend base URL. Absent means local-only mode.
    pub remote_url: Option<String>,
}

impl BusboardConfig {
    pub fn new(store_path: PathBuf, dataset_id: String, remote_url: Option<String>) -> Self {
        Self {
            store: StoreSection {
                path: store_path.to_string_lossy().to_string(),
            },
            sync: SyncSection {
                dataset_id,
                remote_url,
            },
        }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!(
                "Cannot read config {} ({}); run `busboard init` first",
                path.display(),
                e
            )
        })?;
        toml::from_str(&text).map_err(|e| anyhow::anyhow!("Invalid config file: {}", e))
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Config encode failed: {}", e))?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir).join("busboard"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("$HOME is not set"))?;
    Ok(PathBuf::from(home).join(".config").join("busboard"))
}

fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_DATA_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir).join("busboard"));
        }
    }
    let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("$HOME is not set"))?;
    Ok(PathBuf::from(home).join(".local").join("share").join("busboard"))
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_store_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("roster.sqlite3"))
}

pub fn default_key_cache_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("keys.json"))
}
