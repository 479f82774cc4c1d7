//! Idempotent schema creation and additive migrations.

use super::StorageAdapter;
use crate::error::{Error, Result};

const CREATE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS books (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        subtitle TEXT,
        author_name TEXT NOT NULL DEFAULT '',
        description TEXT,
        genre TEXT,
        language TEXT NOT NULL DEFAULT 'en',
        cover_path TEXT,
        word_count INTEGER NOT NULL DEFAULT 0,
        target_word_count INTEGER,
        status TEXT NOT NULL DEFAULT 'draft',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        last_opened_at TEXT
    )",
    "CREATE TABLE IF NOT EXISTS chapters (
        id TEXT PRIMARY KEY,
        book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        content TEXT,
        synopsis TEXT,
        order_index INTEGER NOT NULL DEFAULT 0,
        parent_id TEXT,
        chapter_type TEXT NOT NULL DEFAULT 'chapter',
        word_count INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL DEFAULT 'draft',
        is_included_in_export INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cover_templates (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        data TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chapters_book_id ON chapters(book_id)",
    "CREATE INDEX IF NOT EXISTS idx_chapters_book_order ON chapters(book_id, order_index)",
];

/// Columns added after the first release. Attempted on every startup.
const ADDITIVE_MIGRATIONS: &[&str] = &[
    "ALTER TABLE books ADD COLUMN cover_image TEXT",
    "ALTER TABLE books ADD COLUMN last_chapter_id TEXT",
];

/// Create tables and indexes if absent, then apply additive migrations.
///
/// Safe to run on every startup: a migration whose column already exists is
/// discarded silently.
pub async fn migrate(db: &dyn StorageAdapter) -> Result<()> {
    for sql in CREATE_STATEMENTS {
        db.execute(sql, vec![]).await?;
    }

    let mut applied = 0;
    for sql in ADDITIVE_MIGRATIONS {
        match db.execute(sql, vec![]).await {
            Ok(_) => applied += 1,
            Err(e) if is_duplicate_column(&e) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::info!(adapter = db.kind(), applied, "schema ready");
    Ok(())
}

fn is_duplicate_column(err: &Error) -> bool {
    matches!(err, Error::Sqlite(e) if e.to_string().contains("duplicate column name"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EmbeddedAdapter, SnapshotPersister};

    async fn columns(db: &dyn StorageAdapter, table: &str) -> Vec<String> {
        db.select(&format!("PRAGMA table_info({table})"), vec![])
            .await
            .unwrap()
            .iter()
            .map(|row| row.text("name").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = EmbeddedAdapter::open(SnapshotPersister::in_memory())
            .await
            .unwrap();
        migrate(&db).await.unwrap();
        migrate(&db).await.unwrap();

        let cols = columns(&db, "books").await;
        assert!(cols.contains(&"cover_image".to_string()));
        assert!(cols.contains(&"last_chapter_id".to_string()));
        assert_eq!(cols.iter().filter(|c| *c == "last_chapter_id").count(), 1);
    }

    #[tokio::test]
    async fn test_creates_all_tables_and_indexes() {
        let db = EmbeddedAdapter::open(SnapshotPersister::in_memory())
            .await
            .unwrap();
        migrate(&db).await.unwrap();

        let rows = db
            .select(
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name",
                vec![],
            )
            .await
            .unwrap();
        let names: Vec<String> = rows.iter().map(|r| r.text("name").unwrap()).collect();
        for expected in [
            "books",
            "chapters",
            "cover_templates",
            "settings",
            "idx_chapters_book_id",
            "idx_chapters_book_order",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}
