//! In-memory adapter with explicit snapshot persistence.
//!
//! The whole database lives in memory. After every mutating call the image
//! is serialized and handed to a [`SnapshotPersister`]; on open the most
//! recent image is restored, falling back to an empty database.

use std::ptr::NonNull;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::serialize::OwnedData;
use rusqlite::{Connection, DatabaseName, ffi};

use super::snapshot::SnapshotPersister;
use super::value::{configure, run_batch, run_execute, run_select};
use super::{Row, SqlValue, Statement, StorageAdapter, dump};
use crate::error::{Error, Result};

/// Adapter over an in-memory engine instance.
///
/// Engine calls and image serialization run on the blocking pool. The write
/// lock stays held from the mutation through the snapshot write, so images
/// are persisted in the same order mutations were applied.
pub struct EmbeddedAdapter {
    conn: Arc<Mutex<Option<Connection>>>,
    writes: tokio::sync::Mutex<()>,
    persister: SnapshotPersister,
}

impl EmbeddedAdapter {
    /// Restore from the persister's stores, or start empty.
    pub async fn open(persister: SnapshotPersister) -> Result<Self> {
        let image = persister.restore().await;
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = match image {
                Some(image) => match load_image(&image) {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(error = %e, "snapshot could not be loaded; starting empty");
                        Connection::open_in_memory()?
                    }
                },
                None => {
                    tracing::info!("no snapshot found; starting with an empty database");
                    Connection::open_in_memory()?
                }
            };
            configure(&conn)?;
            Ok(conn)
        })
        .await??;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            writes: tokio::sync::Mutex::new(()),
            persister,
        })
    }

    /// Serialized image of the current database.
    pub async fn image(&self) -> Result<Vec<u8>> {
        self.with_conn(|conn| serialize(conn)).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            let conn = guard.as_mut().ok_or(Error::Closed)?;
            f(conn)
        })
        .await?
    }

    async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let _writing = self.writes.lock().await;
        let (out, image) = self
            .with_conn(move |conn| {
                let out = f(conn)?;
                Ok((out, serialize(conn)))
            })
            .await?;

        match image {
            Ok(image) => {
                self.persister.persist(&image).await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize database image"),
        }
        Ok(out)
    }
}

fn serialize(conn: &Connection) -> Result<Vec<u8>> {
    Ok(conn.serialize(DatabaseName::Main)?.to_vec())
}

fn load_image(image: &[u8]) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    conn.deserialize(DatabaseName::Main, owned_copy(image)?, false)?;
    // Deserialization is lazy; touch the schema to reject non-database bytes.
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(conn)
}

fn owned_copy(image: &[u8]) -> Result<OwnedData> {
    let nomem = || {
        Error::Sqlite(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_NOMEM),
            None,
        ))
    };
    if image.is_empty() {
        return Err(nomem());
    }
    // SAFETY: the buffer comes from sqlite3_malloc64 with exactly `image.len()`
    // bytes, is fully initialized by the copy, and ownership passes to
    // OwnedData which releases it with sqlite3_free.
    unsafe {
        let ptr = ffi::sqlite3_malloc64(image.len() as u64) as *mut u8;
        let ptr = NonNull::new(ptr).ok_or_else(nomem)?;
        std::ptr::copy_nonoverlapping(image.as_ptr(), ptr.as_ptr(), image.len());
        Ok(OwnedData::from_raw_nonnull(ptr, image.len()))
    }
}

#[async_trait]
impl StorageAdapter for EmbeddedAdapter {
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        let sql = sql.to_string();
        self.mutate(move |conn| run_execute(conn, &sql, &params))
            .await
    }

    async fn execute_batch(&self, statements: Vec<Statement>) -> Result<u64> {
        self.mutate(move |conn| run_batch(conn, &statements)).await
    }

    async fn select(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_select(conn, &sql, &params))
            .await
    }

    async fn close(&self) -> Result<()> {
        // wait for an in-flight snapshot write before releasing the engine
        let _writing = self.writes.lock().await;
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(conn) = conn.lock().take() {
                conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
            }
            Ok(())
        })
        .await??;
        tracing::info!("closed embedded database");
        Ok(())
    }

    async fn export_data(&self) -> Result<Vec<u8>> {
        // Same SQL dump as the native adapter for format parity.
        Ok(dump::render_sql_dump(self).await?.into_bytes())
    }

    fn kind(&self) -> &'static str {
        "embedded"
    }
}
