//! Portable SQL dump shared by both adapters.
//!
//! The dump contains only `INSERT` statements; it is meant to be applied to a
//! database whose schema has already been created.

use std::fmt::Write;

use super::{SqlValue, StorageAdapter};
use crate::error::Result;
use crate::util;

/// Tables in dump order (parents before children).
pub const DUMP_TABLES: [&str; 4] = ["books", "chapters", "cover_templates", "settings"];

/// Render every row of every table as an `INSERT` statement.
pub async fn render_sql_dump(db: &dyn StorageAdapter) -> Result<String> {
    let mut out = String::new();
    out.push_str("-- Scriptorium database export\n");
    let _ = writeln!(out, "-- Exported at: {}", util::format_timestamp(&util::now()));
    let _ = writeln!(out, "-- Source adapter: {}", db.kind());
    out.push_str("-- Apply to a database that already has the schema created.\n");

    for table in DUMP_TABLES {
        let rows = db
            .select(&format!("SELECT * FROM {table} ORDER BY rowid"), vec![])
            .await?;
        let _ = writeln!(out, "\n-- Table: {table} ({} rows)", rows.len());

        for row in &rows {
            let columns: Vec<&str> = row.columns().collect();
            let values: Vec<String> = row.values().map(sql_literal).collect();
            let _ = writeln!(
                out,
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                values.join(", ")
            );
        }
    }

    Ok(out)
}

/// Render a value as a SQL literal.
///
/// Strings have single quotes doubled, nulls become `NULL`, numbers pass
/// through, and blobs are hex literals.
pub fn sql_literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(f) if f.is_finite() => f.to_string(),
        SqlValue::Real(_) => "NULL".to_string(),
        SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        SqlValue::Blob(b) => format!("X'{}'", hex::encode_upper(b)),
    }
}
