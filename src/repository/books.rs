use std::sync::Arc;

use uuid::Uuid;

use super::{adapter, opt_timestamp, parsed, timestamp};
use crate::error::{Error, Result};
use crate::model::{Book, BookPatch, BookStatus, NewBook};
use crate::sql_params;
use crate::storage::{Database, FromRow, Row, SqlValue, Statement, select_as};
use crate::util;

const BOOK_COLUMNS: &str = "id, title, subtitle, author_name, description, genre, language, \
    cover_path, cover_image, word_count, target_word_count, status, created_at, updated_at, \
    last_opened_at, last_chapter_id";

impl FromRow for Book {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Book {
            id: row.text("id")?,
            title: row.text("title")?,
            subtitle: row.opt_text("subtitle")?,
            author_name: row.text("author_name")?,
            description: row.opt_text("description")?,
            genre: row.opt_text("genre")?,
            language: row.text("language")?,
            cover_path: row.opt_text("cover_path")?,
            cover_image: row.opt_text("cover_image")?,
            word_count: row.int("word_count")?,
            target_word_count: row.opt_int("target_word_count")?,
            status: parsed(row, "status")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
            last_opened_at: opt_timestamp(row, "last_opened_at")?,
            last_chapter_id: row.opt_text("last_chapter_id")?,
        })
    }
}

/// Statement recomputing a book's cached word count from its chapters.
pub(crate) fn word_count_sync(book_id: &str) -> Statement {
    Statement::new(
        "UPDATE books SET word_count = \
         (SELECT COALESCE(SUM(word_count), 0) FROM chapters WHERE book_id = ?1), \
         updated_at = ?2 WHERE id = ?1",
        sql_params![book_id, util::format_timestamp(&util::now())],
    )
}

/// Book persistence.
#[derive(Clone)]
pub struct BookStore {
    db: Arc<Database>,
}

impl BookStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All books, most recently opened first, then most recently updated.
    pub async fn list(&self) -> Result<Vec<Book>> {
        let db = adapter(&self.db).await?;
        select_as(
            db.as_ref(),
            &format!(
                "SELECT {BOOK_COLUMNS} FROM books ORDER BY last_opened_at DESC, updated_at DESC"
            ),
            vec![],
        )
        .await
    }

    /// Read a book without side effects.
    pub async fn get(&self, id: &str) -> Result<Book> {
        let db = adapter(&self.db).await?;
        select_as::<Book>(
            db.as_ref(),
            &format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"),
            sql_params![id],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::book_not_found(id))
    }

    /// Load a book for editing; stamps `last_opened_at` with the current time.
    pub async fn load(&self, id: &str) -> Result<Book> {
        let db = adapter(&self.db).await?;
        let changed = db
            .execute(
                "UPDATE books SET last_opened_at = ? WHERE id = ?",
                sql_params![util::format_timestamp(&util::now()), id],
            )
            .await?;
        if changed == 0 {
            return Err(Error::book_not_found(id));
        }
        self.get(id).await
    }

    /// Create a book with a fresh id, zero word count and draft status.
    pub async fn create(&self, new: NewBook) -> Result<Book> {
        let db = adapter(&self.db).await?;
        let id = Uuid::new_v4().to_string();
        let now = util::format_timestamp(&util::now());
        let language = new
            .language
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "en".to_string());

        db.execute(
            "INSERT INTO books (id, title, subtitle, author_name, description, genre, language, \
             word_count, target_word_count, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
            sql_params![
                id.as_str(),
                new.title,
                new.subtitle,
                new.author_name,
                new.description,
                new.genre,
                language,
                new.target_word_count,
                BookStatus::Draft.as_str(),
                now.as_str(),
                now.as_str()
            ],
        )
        .await?;

        tracing::debug!(book_id = %id, "created book");
        self.get(&id).await
    }

    /// Apply a sparse patch; fields left `None` are not written.
    pub async fn update(&self, id: &str, patch: BookPatch) -> Result<Book> {
        if patch.is_empty() {
            return self.get(id).await;
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        let mut set = |column: &'static str, value: SqlValue| {
            sets.push(column);
            params.push(value);
        };

        if let Some(v) = patch.title {
            set("title = ?", v.into());
        }
        if let Some(v) = patch.subtitle {
            set("subtitle = ?", v.into());
        }
        if let Some(v) = patch.author_name {
            set("author_name = ?", v.into());
        }
        if let Some(v) = patch.description {
            set("description = ?", v.into());
        }
        if let Some(v) = patch.genre {
            set("genre = ?", v.into());
        }
        if let Some(v) = patch.language {
            set("language = ?", v.into());
        }
        if let Some(v) = patch.cover_path {
            set("cover_path = ?", v.into());
        }
        if let Some(v) = patch.cover_image {
            set("cover_image = ?", v.into());
        }
        if let Some(v) = patch.target_word_count {
            set("target_word_count = ?", v.into());
        }
        if let Some(v) = patch.status {
            set("status = ?", v.as_str().into());
        }
        if let Some(v) = patch.last_chapter_id {
            set("last_chapter_id = ?", v.into());
        }
        set("updated_at = ?", util::format_timestamp(&util::now()).into());

        params.push(id.into());
        let sql = format!("UPDATE books SET {} WHERE id = ?", sets.join(", "));

        let db = adapter(&self.db).await?;
        if db.execute(&sql, params).await? == 0 {
            return Err(Error::book_not_found(id));
        }
        self.get(id).await
    }

    /// Delete a book; its chapters go with it through the foreign-key cascade.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let db = adapter(&self.db).await?;
        if db
            .execute("DELETE FROM books WHERE id = ?", sql_params![id])
            .await?
            == 0
        {
            return Err(Error::book_not_found(id));
        }
        tracing::debug!(book_id = %id, "deleted book");
        Ok(())
    }

    /// Recompute and store the book's word count; returns the new total.
    pub async fn sync_word_count(&self, id: &str) -> Result<i64> {
        let db = adapter(&self.db).await?;
        let stmt = word_count_sync(id);
        if db.execute(&stmt.sql, stmt.params).await? == 0 {
            return Err(Error::book_not_found(id));
        }
        Ok(self.get(id).await?.word_count)
    }

    /// Remember the chapter to resume at when the book is next opened.
    pub async fn set_last_chapter(&self, id: &str, chapter_id: Option<&str>) -> Result<Book> {
        self.update(
            id,
            BookPatch {
                last_chapter_id: Some(chapter_id.map(str::to_string)),
                ..Default::default()
            },
        )
        .await
    }
}
