//! # scriptorium
//!
//! Storage layer and deterministic publishing pipeline for a book-writing
//! application.
//!
//! ## Features
//!
//! - One storage contract over two engines: a file-backed database and an
//!   in-memory database snapshotted to host stores
//! - Books and ordered chapters with derived word counts
//! - Content sanitizer that turns editor markup into portable HTML with
//!   numbered endnotes
//! - EPUB 3 packages and paginated print documents, plus an on-screen
//!   pagination preview
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use scriptorium::export::{EpubExportOptions, NoProgress, Publisher};
//! use scriptorium::model::{ChapterPatch, NewBook, NewChapter};
//! use scriptorium::repository::Repository;
//! use scriptorium::storage::Database;
//!
//! # async fn run() -> scriptorium::Result<()> {
//! let repo = Repository::new(Arc::new(Database::in_memory()));
//!
//! let book = repo.books.create(NewBook::new("My Book").with_author("Author Name")).await?;
//! let chapter = repo.chapters.create(&book.id, NewChapter::new("Beginnings")).await?;
//! repo.chapters
//!     .update(&chapter.id, ChapterPatch::content("<p>It was a dark night.</p>"))
//!     .await?;
//!
//! let publisher = Publisher::new(repo);
//! publisher
//!     .export_epub(&book.id, &EpubExportOptions::default(), "my-book.epub".as_ref(), &NoProgress)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sanitizing Content
//!
//! ```
//! use scriptorium::sanitize::prepare_chapter_html;
//!
//! let html = prepare_chapter_html(r#"<p class="ProseMirror-trailingBreak">Hi</p>"#);
//! assert_eq!(html, "<p>Hi</p>");
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub(crate) mod patterns;
#[cfg(not(target_arch = "wasm32"))]
pub mod repository;
pub mod sanitize;
#[cfg(not(target_arch = "wasm32"))]
pub mod session;
#[cfg(not(target_arch = "wasm32"))]
pub mod storage;
pub mod util;

#[cfg(feature = "wasm")]
pub mod wasm;

pub use config::Config;
pub use error::{Error, Result};
#[cfg(not(target_arch = "wasm32"))]
pub use export::Publisher;
pub use export::{EpubExportOptions, ExportReport, ExportStage, PageSize, PrintExportOptions};
pub use model::{Book, Chapter, ChapterType, NewBook, NewChapter};
#[cfg(not(target_arch = "wasm32"))]
pub use repository::Repository;
#[cfg(not(target_arch = "wasm32"))]
pub use session::{AutoSaver, EditorSession};
#[cfg(not(target_arch = "wasm32"))]
pub use storage::Database;
