//! Storage adapters over an embedded relational engine.
//!
//! One contract, [`StorageAdapter`], implemented twice:
//!
//! - [`NativeAdapter`]: file-backed engine, durable without extra steps
//! - [`EmbeddedAdapter`]: in-memory engine whose image is snapshotted to
//!   host-provided stores after every mutation
//!
//! Snapshot handling is internal to the embedded adapter; callers only ever
//! see `execute` / `select` / `close` / `export_data`.
//!
//! [`Database`] owns the adapter: it is opened lazily on first use, migrated
//! exactly once, and closed explicitly.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::config::{Backend, StorageConfig};
use crate::error::Result;

pub mod dump;
mod embedded;
mod native;
pub mod schema;
pub mod snapshot;
mod value;

pub use embedded::EmbeddedAdapter;
pub use native::NativeAdapter;
pub use snapshot::{
    BlockStore, DirBlockStore, DirKeyValueStore, KeyValueStore, MemoryBlockStore,
    MemoryKeyValueStore, SnapshotPersister, SnapshotRoute,
};
pub use value::{FromRow, Row, SqlValue, Statement};

/// Uniform contract over both storage variants.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Run a statement, returning the number of rows affected.
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64>;

    /// Run several statements in one transaction.
    async fn execute_batch(&self, statements: Vec<Statement>) -> Result<u64>;

    /// Run a query and return every row.
    async fn select(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>>;

    /// Release the engine. Later calls fail with [`crate::Error::Closed`].
    async fn close(&self) -> Result<()>;

    /// Portable SQL dump of all tables.
    async fn export_data(&self) -> Result<Vec<u8>>;

    /// Short adapter name for logs and dump headers.
    fn kind(&self) -> &'static str;
}

/// Run a query and map every row through [`FromRow`].
pub async fn select_as<T: FromRow>(
    db: &dyn StorageAdapter,
    sql: &str,
    params: Vec<SqlValue>,
) -> Result<Vec<T>> {
    db.select(sql, params)
        .await?
        .iter()
        .map(T::from_row)
        .collect()
}

enum Source {
    Config(StorageConfig),
    Adapter(Arc<dyn StorageAdapter>),
}

/// Lazily-initialized owner of the storage adapter.
pub struct Database {
    source: Source,
    adapter: OnceCell<Arc<dyn StorageAdapter>>,
}

impl Database {
    /// Open the backend named by `config` on first use.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            source: Source::Config(config),
            adapter: OnceCell::new(),
        }
    }

    /// Wrap an already-open adapter; migrations still run on first use.
    pub fn with_adapter(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            source: Source::Adapter(adapter),
            adapter: OnceCell::new(),
        }
    }

    /// Embedded backend with in-process snapshot stores.
    pub fn in_memory() -> Self {
        Self::new(StorageConfig {
            backend: Backend::Embedded { snapshot_dir: None },
            ..Default::default()
        })
    }

    /// The migrated adapter, opening it on first call.
    pub async fn adapter(&self) -> Result<Arc<dyn StorageAdapter>> {
        let adapter = self
            .adapter
            .get_or_try_init(|| async {
                let adapter = match &self.source {
                    Source::Config(config) => open_adapter(config).await?,
                    Source::Adapter(adapter) => Arc::clone(adapter),
                };
                schema::migrate(adapter.as_ref()).await?;
                Ok::<_, crate::Error>(adapter)
            })
            .await?;
        Ok(Arc::clone(adapter))
    }

    /// SQL dump of the whole database.
    pub async fn export_data(&self) -> Result<Vec<u8>> {
        self.adapter().await?.export_data().await
    }

    /// Close the adapter if it was ever opened.
    pub async fn close(&self) -> Result<()> {
        if let Some(adapter) = self.adapter.get() {
            adapter.close().await?;
        }
        Ok(())
    }
}

async fn open_adapter(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    match &config.backend {
        Backend::Native { path } => Ok(Arc::new(NativeAdapter::open(path).await?)),
        Backend::Embedded { snapshot_dir } => {
            let persister = match snapshot_dir {
                Some(dir) => SnapshotPersister::new(
                    Arc::new(DirKeyValueStore::new(dir)),
                    Arc::new(DirBlockStore::new(dir)),
                ),
                None => SnapshotPersister::in_memory(),
            }
            .with_config(config);
            Ok(Arc::new(EmbeddedAdapter::open(persister).await?))
        }
    }
}
