//! Error types for scriptorium operations.

use thiserror::Error;

/// Errors that can occur while storing books or publishing them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(not(target_arch = "wasm32"))]
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("nothing to export: no chapters are included in export")]
    EmptyExport,

    #[error("invalid chapter ordering: {0}")]
    InvalidReorder(String),

    #[error("invalid cover image: {0}")]
    InvalidCover(String),

    #[error("storage adapter is closed")]
    Closed,

    #[error("background task failed: {0}")]
    Task(String),
}

#[cfg(not(target_arch = "wasm32"))]
impl Error {
    pub(crate) fn book_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "book",
            id: id.into(),
        }
    }

    pub(crate) fn chapter_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "chapter",
            id: id.into(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
