use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{adapter, timestamp};
use crate::error::{Error, Result};
use crate::sql_params;
use crate::storage::{Database, FromRow, Row, select_as};
use crate::util;

/// A saved cover design. `data` is opaque to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverTemplate {
    pub id: String,
    pub name: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow for CoverTemplate {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(CoverTemplate {
            id: row.text("id")?,
            name: row.text("name")?,
            data: serde_json::from_str(&row.text("data")?)?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
        })
    }
}

#[derive(Clone)]
pub struct CoverTemplateStore {
    db: Arc<Database>,
}

impl CoverTemplateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Templates, most recently updated first.
    pub async fn list(&self) -> Result<Vec<CoverTemplate>> {
        let db = adapter(&self.db).await?;
        select_as(
            db.as_ref(),
            "SELECT id, name, data, created_at, updated_at FROM cover_templates \
             ORDER BY updated_at DESC",
            vec![],
        )
        .await
    }

    pub async fn get(&self, id: &str) -> Result<CoverTemplate> {
        let db = adapter(&self.db).await?;
        select_as::<CoverTemplate>(
            db.as_ref(),
            "SELECT id, name, data, created_at, updated_at FROM cover_templates WHERE id = ?",
            sql_params![id],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound {
            kind: "cover template",
            id: id.to_string(),
        })
    }

    pub async fn save(&self, name: &str, data: &serde_json::Value) -> Result<CoverTemplate> {
        let db = adapter(&self.db).await?;
        let id = Uuid::new_v4().to_string();
        let now = util::format_timestamp(&util::now());
        db.execute(
            "INSERT INTO cover_templates (id, name, data, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?4)",
            sql_params![id.as_str(), name, serde_json::to_string(data)?, now],
        )
        .await?;
        self.get(&id).await
    }

    pub async fn update(
        &self,
        id: &str,
        name: &str,
        data: &serde_json::Value,
    ) -> Result<CoverTemplate> {
        let db = adapter(&self.db).await?;
        db.execute(
            "UPDATE cover_templates SET name = ?, data = ?, updated_at = ? WHERE id = ?",
            sql_params![
                name,
                serde_json::to_string(data)?,
                util::format_timestamp(&util::now()),
                id
            ],
        )
        .await?;
        // missing ids surface as NotFound here
        self.get(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        let db = adapter(&self.db).await?;
        let deleted = db
            .execute("DELETE FROM cover_templates WHERE id = ?", sql_params![id])
            .await?;
        if deleted == 0 {
            return Err(Error::NotFound {
                kind: "cover template",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
