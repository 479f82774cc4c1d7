use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use super::books::word_count_sync;
use super::{adapter, parsed, timestamp};
use crate::error::{Error, Result};
use crate::model::{Chapter, ChapterPatch, ChapterStatus, NewChapter, word_count};
use crate::sql_params;
use crate::storage::{Database, FromRow, Row, SqlValue, Statement, select_as};
use crate::util;

const CHAPTER_COLUMNS: &str = "id, book_id, title, content, synopsis, order_index, parent_id, \
    chapter_type, word_count, status, is_included_in_export, created_at, updated_at";

impl FromRow for Chapter {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Chapter {
            id: row.text("id")?,
            book_id: row.text("book_id")?,
            title: row.text("title")?,
            content: row.opt_text("content")?,
            synopsis: row.opt_text("synopsis")?,
            order: row.int("order_index")?,
            parent_id: row.opt_text("parent_id")?,
            chapter_type: parsed(row, "chapter_type")?,
            word_count: row.int("word_count")?,
            status: parsed(row, "status")?,
            is_included_in_export: row.bool("is_included_in_export")?,
            created_at: timestamp(row, "created_at")?,
            updated_at: timestamp(row, "updated_at")?,
        })
    }
}

/// Chapter persistence and ordering.
///
/// Every operation that changes a book's chapter set or chapter content also
/// rewrites the book's cached word count in the same transaction.
#[derive(Clone)]
pub struct ChapterStore {
    db: Arc<Database>,
}

impl ChapterStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Chapters of a book in order.
    pub async fn list(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let db = adapter(&self.db).await?;
        select_as(
            db.as_ref(),
            &format!(
                "SELECT {CHAPTER_COLUMNS} FROM chapters WHERE book_id = ? \
                 ORDER BY order_index, created_at"
            ),
            sql_params![book_id],
        )
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Chapter> {
        let db = adapter(&self.db).await?;
        select_as::<Chapter>(
            db.as_ref(),
            &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?"),
            sql_params![id],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| Error::chapter_not_found(id))
    }

    /// Append a chapter at the end of the book (order = max + 1).
    ///
    /// New chapters are drafts of the requested type (default `chapter`) with
    /// no content and a zero word count.
    pub async fn create(&self, book_id: &str, new: NewChapter) -> Result<Chapter> {
        let db = adapter(&self.db).await?;
        let exists = db
            .select("SELECT 1 AS found FROM books WHERE id = ?", sql_params![book_id])
            .await?;
        if exists.is_empty() {
            return Err(Error::book_not_found(book_id));
        }

        let id = Uuid::new_v4().to_string();
        let now = util::format_timestamp(&util::now());
        let chapter_type = new.chapter_type.unwrap_or_default();

        let insert = Statement::new(
            "INSERT INTO chapters (id, book_id, title, content, synopsis, order_index, parent_id, \
             chapter_type, word_count, status, is_included_in_export, created_at, updated_at) \
             SELECT ?1, ?2, ?3, NULL, NULL, COALESCE(MAX(order_index), -1) + 1, ?4, ?5, 0, ?6, 1, ?7, ?7 \
             FROM chapters WHERE book_id = ?2",
            sql_params![
                id.as_str(),
                book_id,
                new.title,
                new.parent_id,
                chapter_type.as_str(),
                ChapterStatus::Draft.as_str(),
                now
            ],
        );
        db.execute_batch(vec![insert, word_count_sync(book_id)])
            .await?;

        tracing::debug!(book_id, chapter_id = %id, "created chapter");
        self.get(&id).await
    }

    /// Apply a sparse patch. A content change recomputes the chapter's word
    /// count and the book total in the same transaction.
    pub async fn update(&self, id: &str, patch: ChapterPatch) -> Result<Chapter> {
        let existing = self.get(id).await?;
        if patch.is_empty() {
            return Ok(existing);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<SqlValue> = Vec::new();
        let mut set = |column: &'static str, value: SqlValue| {
            sets.push(column);
            params.push(value);
        };

        let content_changed = patch.content.is_some();
        if let Some(v) = patch.title {
            set("title = ?", v.into());
        }
        if let Some(content) = patch.content {
            let words = content.as_deref().map_or(0, word_count);
            set("content = ?", content.into());
            set("word_count = ?", words.into());
        }
        if let Some(v) = patch.synopsis {
            set("synopsis = ?", v.into());
        }
        if let Some(v) = patch.parent_id {
            set("parent_id = ?", v.into());
        }
        if let Some(v) = patch.chapter_type {
            set("chapter_type = ?", v.as_str().into());
        }
        if let Some(v) = patch.status {
            set("status = ?", v.as_str().into());
        }
        if let Some(v) = patch.is_included_in_export {
            set("is_included_in_export = ?", v.into());
        }
        set("updated_at = ?", util::format_timestamp(&util::now()).into());

        params.push(id.into());
        let mut statements = vec![Statement::new(
            format!("UPDATE chapters SET {} WHERE id = ?", sets.join(", ")),
            params,
        )];
        if content_changed {
            statements.push(word_count_sync(&existing.book_id));
        }

        let db = adapter(&self.db).await?;
        db.execute_batch(statements).await?;
        self.get(id).await
    }

    /// Delete a chapter, close the gap in the book's ordering and resync the
    /// book word count.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let chapter = self.get(id).await?;
        let remaining: Vec<Chapter> = self
            .list(&chapter.book_id)
            .await?
            .into_iter()
            .filter(|c| c.id != id)
            .collect();

        let mut statements = vec![Statement::new(
            "DELETE FROM chapters WHERE id = ?",
            sql_params![id],
        )];
        statements.extend(order_updates(&chapter.book_id, &remaining));
        statements.push(word_count_sync(&chapter.book_id));

        let db = adapter(&self.db).await?;
        db.execute_batch(statements).await?;
        tracing::debug!(chapter_id = id, book_id = %chapter.book_id, "deleted chapter");
        Ok(())
    }

    /// Rewrite every chapter's order to its index in `ordered_ids`.
    ///
    /// `ordered_ids` must list each chapter of the book exactly once.
    pub async fn reorder(&self, book_id: &str, ordered_ids: &[String]) -> Result<()> {
        let current = self.list(book_id).await?;
        let known: HashSet<&str> = current.iter().map(|c| c.id.as_str()).collect();

        let mut seen = HashSet::new();
        for id in ordered_ids {
            if !known.contains(id.as_str()) {
                return Err(Error::InvalidReorder(format!(
                    "chapter {id} does not belong to book {book_id}"
                )));
            }
            if !seen.insert(id.as_str()) {
                return Err(Error::InvalidReorder(format!("chapter {id} listed twice")));
            }
        }
        if seen.len() != known.len() {
            return Err(Error::InvalidReorder(format!(
                "expected {} chapters, got {}",
                known.len(),
                seen.len()
            )));
        }

        let statements: Vec<Statement> = ordered_ids
            .iter()
            .enumerate()
            .map(|(index, id)| {
                Statement::new(
                    "UPDATE chapters SET order_index = ? WHERE id = ? AND book_id = ?",
                    sql_params![index, id.as_str(), book_id],
                )
            })
            .collect();

        let db = adapter(&self.db).await?;
        db.execute_batch(statements).await?;
        tracing::debug!(book_id, count = ordered_ids.len(), "reordered chapters");
        Ok(())
    }
}

/// Updates that renumber `chapters` (already in order) to 0..N-1.
fn order_updates(book_id: &str, chapters: &[Chapter]) -> Vec<Statement> {
    chapters
        .iter()
        .enumerate()
        .filter(|(index, c)| c.order != *index as i64)
        .map(|(index, c)| {
            Statement::new(
                "UPDATE chapters SET order_index = ? WHERE id = ? AND book_id = ?",
                sql_params![index, c.id.as_str(), book_id],
            )
        })
        .collect()
}
