use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::adapter;
use crate::error::Result;
use crate::sql_params;
use crate::storage::Database;
use crate::util;

/// Application settings as a flat key/value table.
#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<Database>,
}

impl SettingsStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = adapter(&self.db).await?;
        let rows = db
            .select("SELECT value FROM settings WHERE key = ?", sql_params![key])
            .await?;
        rows.first().map(|row| row.text("value")).transpose()
    }

    /// Insert or replace a setting.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = adapter(&self.db).await?;
        db.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            sql_params![key, value, util::format_timestamp(&util::now())],
        )
        .await?;
        Ok(())
    }

    /// Remove a setting; returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let db = adapter(&self.db).await?;
        let changed = db
            .execute("DELETE FROM settings WHERE key = ?", sql_params![key])
            .await?;
        Ok(changed > 0)
    }

    pub async fn all(&self) -> Result<BTreeMap<String, String>> {
        let db = adapter(&self.db).await?;
        db.select("SELECT key, value FROM settings ORDER BY key", vec![])
            .await?
            .iter()
            .map(|row| Ok((row.text("key")?, row.text("value")?)))
            .collect()
    }

    /// Read a setting stored as JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_string(value)?).await
    }
}
