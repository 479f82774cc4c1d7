//! File-backed adapter: the engine persists directly to its database file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;

use super::value::{configure, run_batch, run_execute, run_select};
use super::{Row, SqlValue, Statement, StorageAdapter, dump};
use crate::error::{Error, Result};

/// Adapter over a database file. Engine calls run on the blocking pool.
pub struct NativeAdapter {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl NativeAdapter {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = open_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let conn = Connection::open(&open_path)?;
            configure(&conn)?;
            Ok(conn)
        })
        .await??;

        tracing::info!(path = %path.display(), "opened native database");
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
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
}

#[async_trait]
impl StorageAdapter for NativeAdapter {
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_execute(conn, &sql, &params))
            .await
    }

    async fn execute_batch(&self, statements: Vec<Statement>) -> Result<u64> {
        self.with_conn(move |conn| run_batch(conn, &statements))
            .await
    }

    async fn select(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_select(conn, &sql, &params))
            .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(conn) = conn.lock().take() {
                conn.close().map_err(|(_, e)| Error::Sqlite(e))?;
            }
            Ok(())
        })
        .await??;
        tracing::info!(path = %self.path.display(), "closed native database");
        Ok(())
    }

    async fn export_data(&self) -> Result<Vec<u8>> {
        // Read-only queries only; the host may deny access to the file itself.
        Ok(dump::render_sql_dump(self).await?.into_bytes())
    }

    fn kind(&self) -> &'static str {
        "native"
    }
}
