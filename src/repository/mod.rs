//! Document repository: CRUD and ordering over books and chapters.
//!
//! Stores hold an injected [`Database`] and never reach for global state.
//! Word counts are derived here: chapter counts from content through
//! [`crate::model::word_count`], book counts as the sum over chapters.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

use crate::error::{Error, Result};
use crate::storage::{Database, Row, StorageAdapter};
use crate::util;

mod books;
mod chapters;
mod covers;
mod settings;

pub use books::BookStore;
pub use chapters::ChapterStore;
pub use covers::{CoverTemplate, CoverTemplateStore};
pub use settings::SettingsStore;

/// All stores over one database.
#[derive(Clone)]
pub struct Repository {
    pub books: BookStore,
    pub chapters: ChapterStore,
    pub settings: SettingsStore,
    pub cover_templates: CoverTemplateStore,
    db: Arc<Database>,
}

impl Repository {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            books: BookStore::new(Arc::clone(&db)),
            chapters: ChapterStore::new(Arc::clone(&db)),
            settings: SettingsStore::new(Arc::clone(&db)),
            cover_templates: CoverTemplateStore::new(Arc::clone(&db)),
            db,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

async fn adapter(db: &Database) -> Result<Arc<dyn StorageAdapter>> {
    db.adapter().await
}

fn bad_column(name: &str) -> Error {
    rusqlite::Error::InvalidColumnType(0, name.to_string(), Type::Text).into()
}

fn timestamp(row: &Row, name: &str) -> Result<DateTime<Utc>> {
    util::parse_timestamp(&row.text(name)?).ok_or_else(|| bad_column(name))
}

fn opt_timestamp(row: &Row, name: &str) -> Result<Option<DateTime<Utc>>> {
    match row.opt_text(name)? {
        Some(text) => util::parse_timestamp(&text)
            .map(Some)
            .ok_or_else(|| bad_column(name)),
        None => Ok(None),
    }
}

fn parsed<T: FromStr>(row: &Row, name: &str) -> Result<T> {
    row.text(name)?.parse().map_err(|_| bad_column(name))
}
