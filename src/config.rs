//! Runtime configuration.
//!
//! Every section has documented defaults; [`Config::from_env`] overlays
//! `SCRIPTORIUM_*` environment variables on top of them.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::export::{EpubExportOptions, PageSize, PrintExportOptions};

/// Snapshots below this size go to the key-value store, larger ones to the block store.
pub const DEFAULT_SNAPSHOT_THRESHOLD: usize = 5 * 1024 * 1024;

pub const DEFAULT_KV_KEY: &str = "scriptorium-db";
pub const DEFAULT_BLOCK_KEY: &str = "scriptorium-db.sqlite";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub autosave: AutoSaveConfig,
    pub export: ExportConfig,
}

/// Which storage adapter to open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Backend {
    /// File-backed engine with direct persistence.
    Native { path: PathBuf },
    /// In-memory engine snapshotted to host stores. `snapshot_dir` selects
    /// directory-backed stores; `None` keeps snapshots in process memory.
    Embedded { snapshot_dir: Option<PathBuf> },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Native {
            path: PathBuf::from("scriptorium.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    pub snapshot_threshold: usize,
    pub kv_key: String,
    pub block_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            snapshot_threshold: DEFAULT_SNAPSHOT_THRESHOLD,
            kv_key: DEFAULT_KV_KEY.to_string(),
            block_key: DEFAULT_BLOCK_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSaveConfig {
    /// Quiet period before pending edits are written.
    pub debounce_ms: u64,
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self { debounce_ms: 1000 }
    }
}

impl AutoSaveConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub epub: EpubExportOptions,
    pub print: PrintExportOptions,
}

impl Config {
    /// Build a configuration from defaults plus environment overrides.
    ///
    /// Recognized variables:
    /// - `SCRIPTORIUM_DB`: native database path
    /// - `SCRIPTORIUM_SNAPSHOT_DIR`: use the embedded backend with this directory
    /// - `SCRIPTORIUM_SNAPSHOT_THRESHOLD`: small-store limit in bytes
    /// - `SCRIPTORIUM_AUTOSAVE_MS`: autosave quiet period
    /// - `SCRIPTORIUM_PAGE_SIZE`: default print page size
    pub fn from_env() -> Result<Self, String> {
        let mut config = Config::default();

        if let Ok(path) = std::env::var("SCRIPTORIUM_DB") {
            config.storage.backend = Backend::Native { path: path.into() };
        }
        if let Ok(dir) = std::env::var("SCRIPTORIUM_SNAPSHOT_DIR") {
            config.storage.backend = Backend::Embedded {
                snapshot_dir: Some(dir.into()),
            };
        }
        if let Ok(threshold) = std::env::var("SCRIPTORIUM_SNAPSHOT_THRESHOLD") {
            config.storage.snapshot_threshold = threshold
                .parse()
                .map_err(|e| format!("SCRIPTORIUM_SNAPSHOT_THRESHOLD: {e}"))?;
        }
        if let Ok(ms) = std::env::var("SCRIPTORIUM_AUTOSAVE_MS") {
            config.autosave.debounce_ms = ms
                .parse()
                .map_err(|e| format!("SCRIPTORIUM_AUTOSAVE_MS: {e}"))?;
        }
        if let Ok(size) = std::env::var("SCRIPTORIUM_PAGE_SIZE") {
            config.export.print.page_size = size
                .parse::<PageSize>()
                .map_err(|e| format!("SCRIPTORIUM_PAGE_SIZE: {e}"))?;
        }

        Ok(config)
    }
}
