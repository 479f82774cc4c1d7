//! Host-provided snapshot stores for the embedded adapter.
//!
//! The embedded engine lives entirely in memory, so its serialized image is
//! handed to one of two host stores after every mutation:
//!
//! - [`KeyValueStore`]: small string values (images below the threshold,
//!   base64-encoded)
//! - [`BlockStore`]: binary blobs of any size
//!
//! Restore tries the key-value store first, then the block store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;

use crate::config::StorageConfig;
use crate::error::{Error, Result};

/// String key-value storage with a small quota.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Origin-scoped binary blob storage.
#[async_trait]
pub trait BlockStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Which store a snapshot of a given size belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotRoute {
    KeyValue,
    Block,
}

impl SnapshotRoute {
    pub fn for_size(len: usize, threshold: usize) -> Self {
        if len < threshold {
            SnapshotRoute::KeyValue
        } else {
            SnapshotRoute::Block
        }
    }
}

/// Routes database images between the two stores.
#[derive(Clone)]
pub struct SnapshotPersister {
    kv: Arc<dyn KeyValueStore>,
    blocks: Arc<dyn BlockStore>,
    threshold: usize,
    kv_key: String,
    block_key: String,
}

impl SnapshotPersister {
    pub fn new(kv: Arc<dyn KeyValueStore>, blocks: Arc<dyn BlockStore>) -> Self {
        let defaults = StorageConfig::default();
        Self {
            kv,
            blocks,
            threshold: defaults.snapshot_threshold,
            kv_key: defaults.kv_key,
            block_key: defaults.block_key,
        }
    }

    /// Persister with in-process stores; snapshots last for the process lifetime.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryKeyValueStore::new()),
            Arc::new(MemoryBlockStore::new()),
        )
    }

    /// Apply threshold and keys from configuration.
    pub fn with_config(mut self, config: &StorageConfig) -> Self {
        self.threshold = config.snapshot_threshold;
        self.kv_key = config.kv_key.clone();
        self.block_key = config.block_key.clone();
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Persist an image. Failures are logged and swallowed; the caller keeps
    /// working on its in-memory state. Returns the route on success.
    pub async fn persist(&self, image: &[u8]) -> Option<SnapshotRoute> {
        let route = SnapshotRoute::for_size(image.len(), self.threshold);
        tracing::debug!(bytes = image.len(), ?route, "persisting database snapshot");

        let result = match route {
            SnapshotRoute::KeyValue => self.persist_small(image).await,
            SnapshotRoute::Block => self.persist_large(image).await,
        };

        match result {
            Ok(()) => Some(route),
            Err(e) => {
                tracing::warn!(error = %e, ?route, "failed to persist database snapshot; continuing in memory");
                None
            }
        }
    }

    async fn persist_small(&self, image: &[u8]) -> Result<()> {
        self.kv.set(&self.kv_key, BASE64.encode(image)).await?;
        // A stale large image must not outlive a newer small one.
        if let Err(e) = self.blocks.delete(&self.block_key).await {
            tracing::debug!(error = %e, "could not clear block snapshot");
        }
        Ok(())
    }

    async fn persist_large(&self, image: &[u8]) -> Result<()> {
        self.blocks.write(&self.block_key, image.to_vec()).await?;
        // Restore reads the small store first, so drop the older copy there.
        if let Err(e) = self.kv.remove(&self.kv_key).await {
            tracing::debug!(error = %e, "could not clear key-value snapshot");
        }
        Ok(())
    }

    /// Load the most recent image: key-value store first, block store second.
    /// Any failure yields `None` so the caller starts from an empty database.
    pub async fn restore(&self) -> Option<Vec<u8>> {
        match self.kv.get(&self.kv_key).await {
            Ok(Some(encoded)) => match BASE64.decode(encoded.as_bytes()) {
                Ok(image) if !image.is_empty() => {
                    tracing::info!(bytes = image.len(), "restoring database from key-value store");
                    return Some(image);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "corrupt key-value snapshot ignored"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "key-value snapshot unreadable"),
        }

        match self.blocks.read(&self.block_key).await {
            Ok(Some(image)) if !image.is_empty() => {
                tracing::info!(bytes = image.len(), "restoring database from block store");
                Some(image)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "block snapshot unreadable");
                None
            }
        }
    }
}

// ============================================================================
// In-memory stores
// ============================================================================

/// In-process key-value store with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `bytes`, like a browser storage quota.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: Mutex::default(),
            quota: Some(bytes),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        if let Some(quota) = self.quota
            && value.len() > quota
        {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                format!("quota exceeded: {} > {} bytes", value.len(), quota),
            )));
        }
        self.entries.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// In-process block store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blocks.lock().contains_key(key)
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.blocks.lock().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blocks.lock().remove(key);
        Ok(())
    }
}

// ============================================================================
// Directory-backed stores
// ============================================================================

fn key_path(dir: &Path, key: &str, suffix: &str) -> PathBuf {
    let safe: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect();
    dir.join(format!("{safe}{suffix}"))
}

async fn write_replacing(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Key-value store keeping one text file per key.
#[derive(Debug, Clone)]
pub struct DirKeyValueStore {
    dir: PathBuf,
}

impl DirKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl KeyValueStore for DirKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match read_optional(&key_path(&self.dir, key, ".kv")).await? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        write_replacing(&key_path(&self.dir, key, ".kv"), value.as_bytes()).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        remove_optional(&key_path(&self.dir, key, ".kv")).await
    }
}

/// Block store keeping one binary file per key.
#[derive(Debug, Clone)]
pub struct DirBlockStore {
    dir: PathBuf,
}

impl DirBlockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl BlockStore for DirBlockStore {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        read_optional(&key_path(&self.dir, key, ".blob")).await
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()> {
        write_replacing(&key_path(&self.dir, key, ".blob"), &data).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        remove_optional(&key_path(&self.dir, key, ".blob")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn persister() -> (SnapshotPersister, Arc<MemoryKeyValueStore>, Arc<MemoryBlockStore>) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let blocks = Arc::new(MemoryBlockStore::new());
        let persister = SnapshotPersister::new(kv.clone(), blocks.clone());
        (persister, kv, blocks)
    }

    #[test]
    fn test_route_by_size() {
        assert_eq!(SnapshotRoute::for_size(2 * MIB, 5 * MIB), SnapshotRoute::KeyValue);
        assert_eq!(SnapshotRoute::for_size(6 * MIB, 5 * MIB), SnapshotRoute::Block);
        assert_eq!(SnapshotRoute::for_size(5 * MIB, 5 * MIB), SnapshotRoute::Block);
    }

    #[tokio::test]
    async fn test_six_mib_goes_to_block_store() {
        let (persister, kv, blocks) = persister();
        let route = persister.persist(&vec![7u8; 6 * MIB]).await;
        assert_eq!(route, Some(SnapshotRoute::Block));
        assert!(blocks.contains("scriptorium-db.sqlite"));
        assert!(!kv.contains("scriptorium-db"));
    }

    #[tokio::test]
    async fn test_two_mib_goes_to_key_value_store() {
        let (persister, kv, blocks) = persister();
        let route = persister.persist(&vec![7u8; 2 * MIB]).await;
        assert_eq!(route, Some(SnapshotRoute::KeyValue));
        assert!(kv.contains("scriptorium-db"));
        assert!(!blocks.contains("scriptorium-db.sqlite"));
    }

    #[tokio::test]
    async fn test_switching_routes_clears_other_store() {
        let (persister, kv, blocks) = persister();
        let persister = persister.with_threshold(16);

        persister.persist(&[1u8; 32]).await;
        assert!(blocks.contains("scriptorium-db.sqlite"));

        persister.persist(&[2u8; 8]).await;
        assert!(kv.contains("scriptorium-db"));
        assert!(!blocks.contains("scriptorium-db.sqlite"));
        assert_eq!(persister.restore().await, Some(vec![2u8; 8]));
    }

    #[tokio::test]
    async fn test_restore_prefers_key_value_store() {
        let (persister, kv, blocks) = persister();
        kv.set("scriptorium-db", BASE64.encode(b"small")).await.unwrap();
        blocks
            .write("scriptorium-db.sqlite", b"large".to_vec())
            .await
            .unwrap();
        assert_eq!(persister.restore().await, Some(b"small".to_vec()));
    }

    #[tokio::test]
    async fn test_restore_falls_back_past_corrupt_entry() {
        let (persister, kv, blocks) = persister();
        kv.set("scriptorium-db", "not base64!!".into()).await.unwrap();
        blocks
            .write("scriptorium-db.sqlite", b"large".to_vec())
            .await
            .unwrap();
        assert_eq!(persister.restore().await, Some(b"large".to_vec()));
    }

    #[tokio::test]
    async fn test_persist_failure_is_swallowed() {
        let kv = Arc::new(MemoryKeyValueStore::with_quota(4));
        let persister = SnapshotPersister::new(kv.clone(), Arc::new(MemoryBlockStore::new()));
        assert_eq!(persister.persist(&[0u8; 64]).await, None);
        assert!(!kv.contains("scriptorium-db"));
    }

    #[tokio::test]
    async fn test_dir_stores_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let persister = SnapshotPersister::new(
            Arc::new(DirKeyValueStore::new(dir.path())),
            Arc::new(DirBlockStore::new(dir.path())),
        )
        .with_threshold(4);

        assert_eq!(persister.restore().await, None);
        persister.persist(b"large image").await;
        assert_eq!(persister.restore().await, Some(b"large image".to_vec()));
        persister.persist(b"abc").await;
        assert_eq!(persister.restore().await, Some(b"abc".to_vec()));
    }
}
