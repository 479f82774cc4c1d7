//! Publishing pipeline: EPUB packages and paginated print documents.
//!
//! Both targets share the same front half: the exportable chapter set is
//! filtered and ordered, chapter numbers are assigned, and every chapter body
//! goes through [`crate::sanitize::prepare_chapter_html`] exactly once.
//!
//! # Architecture
//!
//! - [`epub`] builds the EPUB 3 package in memory
//! - [`print`] builds one self-contained HTML document with paged-media CSS
//! - [`preview`] splits the print document into on-screen pages
//! - [`Publisher`] loads from the repository, reports [`ExportStage`]s,
//!   serializes exports and writes the artifact atomically
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scriptorium::export::{EpubExportOptions, NoProgress, Publisher};
//! use scriptorium::repository::Repository;
//! use scriptorium::storage::Database;
//!
//! # async fn run() -> scriptorium::Result<()> {
//! let repo = Repository::new(Arc::new(Database::in_memory()));
//! let publisher = Publisher::new(repo);
//! let report = publisher
//!     .export_epub("book-id", &EpubExportOptions::default(), "out".as_ref(), &NoProgress)
//!     .await?;
//! println!("wrote {} bytes to {}", report.bytes, report.path.display());
//! # Ok(())
//! # }
//! ```

use std::fmt;
#[cfg(not(target_arch = "wasm32"))]
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Chapter, ChapterType};
use crate::patterns::{INVALID_FILENAME_CHARS_RE, WHITESPACE_RUN_RE};

pub mod cover;
pub mod epub;
pub mod preview;
pub mod print;
#[cfg(not(target_arch = "wasm32"))]
mod publisher;
pub mod xhtml;

#[cfg(not(target_arch = "wasm32"))]
pub use cover::FsAssetFetcher;
pub use cover::{AssetFetcher, CoverImage};
pub use epub::{EpubPackage, build_epub, package_epub};
pub use preview::{FlowPaginator, Page, Paginator, Preview, PreviewRenderer};
pub use print::{generate_print_html, print_stylesheet};
#[cfg(not(target_arch = "wasm32"))]
pub use publisher::Publisher;

/// Longest filename stem produced by [`suggested_filename`].
pub const MAX_FILENAME_STEM: usize = 100;

/// Placeholder author for books without one.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

// ============================================================================
// Options
// ============================================================================

/// EPUB export options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpubExportOptions {
    /// Include the navigation document in the reading order
    pub include_toc: bool,
    /// Prefix plain chapters with "Chapter N:"
    pub number_chapters: bool,
    /// Render the display title as a heading at the top of each chapter
    pub prepend_titles: bool,
}

impl Default for EpubExportOptions {
    fn default() -> Self {
        Self {
            include_toc: true,
            number_chapters: true,
            prepend_titles: true,
        }
    }
}

/// Print export options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintExportOptions {
    pub page_size: PageSize,
    pub include_toc: bool,
    pub page_numbers: bool,
    /// Show the current chapter title at the top of each page
    pub running_headers: bool,
}

impl Default for PrintExportOptions {
    fn default() -> Self {
        Self {
            page_size: PageSize::A5,
            include_toc: true,
            page_numbers: true,
            running_headers: true,
        }
    }
}

/// Page size presets for print output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    A4,
    #[default]
    A5,
    Letter,
    /// US trade paperback, 6 x 9 in
    Trade,
    /// Digest, 5.5 x 8.5 in
    Digest,
}

impl PageSize {
    pub const ALL: [PageSize; 5] = [
        PageSize::A4,
        PageSize::A5,
        PageSize::Letter,
        PageSize::Trade,
        PageSize::Digest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageSize::A4 => "a4",
            PageSize::A5 => "a5",
            PageSize::Letter => "letter",
            PageSize::Trade => "trade",
            PageSize::Digest => "digest",
        }
    }

    /// Value for the CSS `@page { size }` descriptor.
    pub fn css_size(&self) -> &'static str {
        match self {
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::Letter => "letter",
            PageSize::Trade => "6in 9in",
            PageSize::Digest => "5.5in 8.5in",
        }
    }

    /// Width and height in millimetres.
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::A5 => (148.0, 210.0),
            PageSize::Letter => (215.9, 279.4),
            PageSize::Trade => (152.4, 228.6),
            PageSize::Digest => (139.7, 215.9),
        }
    }

    /// Page margin in millimetres.
    pub fn margin_mm(&self) -> f32 {
        match self {
            PageSize::A4 | PageSize::Letter => 25.0,
            PageSize::A5 | PageSize::Trade | PageSize::Digest => 18.0,
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageSize {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PageSize::ALL
            .into_iter()
            .find(|size| size.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown page size: {s} (expected a4, a5, letter, trade or digest)"))
    }
}

// ============================================================================
// Progress and results
// ============================================================================

/// Coarse export progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportStage {
    Preparing,
    Generating,
    Saving,
}

impl ExportStage {
    pub fn label(&self) -> &'static str {
        match self {
            ExportStage::Preparing => "preparing",
            ExportStage::Generating => "generating",
            ExportStage::Saving => "saving",
        }
    }
}

impl fmt::Display for ExportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives export stage changes.
pub trait ProgressSink: Send + Sync {
    fn stage(&self, stage: ExportStage);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn stage(&self, _stage: ExportStage) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ExportStage) + Send + Sync,
{
    fn stage(&self, stage: ExportStage) {
        self(stage)
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub path: PathBuf,
    pub bytes: u64,
    /// Non-fatal problems, such as a cover that could not be loaded
    pub warnings: Vec<String>,
}

// ============================================================================
// Shared chapter preparation
// ============================================================================

/// Chapters that take part in export, in export order.
pub fn select_exportable(chapters: &[Chapter]) -> Vec<&Chapter> {
    let mut selected: Vec<&Chapter> = chapters
        .iter()
        .filter(|c| c.is_included_in_export)
        .collect();
    selected.sort_by_key(|c| c.order);
    selected
}

/// "Chapter N" numbers for an already filtered and ordered chapter list.
///
/// Only plain chapters are counted; every other type gets `None` and does not
/// advance the counter.
pub fn chapter_numbers(chapters: &[&Chapter]) -> Vec<Option<usize>> {
    let mut next = 0;
    chapters
        .iter()
        .map(|c| {
            c.chapter_type.is_numbered().then(|| {
                next += 1;
                next
            })
        })
        .collect()
}

/// Title shown for a chapter in the output.
pub fn display_title(title: &str, number: Option<usize>, numbered: bool) -> String {
    match number {
        Some(n) if numbered => format!("Chapter {n}: {title}"),
        _ => title.to_string(),
    }
}

/// A chapter ready for a renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedChapter {
    pub id: String,
    pub title: String,
    pub display_title: String,
    pub number: Option<usize>,
    pub chapter_type: ChapterType,
    /// Sanitized body with endnotes appended
    pub html: String,
}

impl PreparedChapter {
    pub fn is_frontmatter(&self) -> bool {
        self.chapter_type == ChapterType::Frontmatter
    }
}

/// Filter, order, number and sanitize chapters for export.
///
/// `anchor_prefix` is called with each chapter's 1-based position and returns
/// the footnote id prefix for that chapter.
pub(crate) fn prepare_chapters(
    chapters: &[Chapter],
    numbered: bool,
    anchor_prefix: impl Fn(usize) -> String,
) -> Result<Vec<PreparedChapter>> {
    let selected = select_exportable(chapters);
    if selected.is_empty() {
        return Err(crate::Error::EmptyExport);
    }
    let numbers = chapter_numbers(&selected);

    Ok(selected
        .into_iter()
        .zip(numbers)
        .enumerate()
        .map(|(index, (chapter, number))| PreparedChapter {
            id: chapter.id.clone(),
            title: chapter.title.clone(),
            display_title: display_title(&chapter.title, number, numbered),
            number,
            chapter_type: chapter.chapter_type,
            html: crate::sanitize::prepare_chapter_html_scoped(
                chapter.content.as_deref().unwrap_or_default(),
                &anchor_prefix(index + 1),
            ),
        })
        .collect())
}

// ============================================================================
// Files
// ============================================================================

/// Filesystem-safe filename for an exported book.
///
/// ```
/// use scriptorium::export::suggested_filename;
///
/// assert_eq!(suggested_filename("My Book: Part 1", "epub"), "My_Book_Part_1.epub");
/// assert_eq!(suggested_filename("???", "html"), "untitled.html");
/// ```
pub fn suggested_filename(title: &str, extension: &str) -> String {
    let cleaned = INVALID_FILENAME_CHARS_RE.replace_all(title, "");
    let collapsed = WHITESPACE_RUN_RE.replace_all(cleaned.trim(), "_");
    let stem: String = collapsed.chars().take(MAX_FILENAME_STEM).collect();
    let stem = stem.trim_matches(|c| c == '_' || c == '.');
    let stem = if stem.is_empty() { "untitled" } else { stem };
    format!("{stem}.{extension}")
}

/// Write `bytes` to `path` through a temp file in the same directory, so the
/// destination either keeps its old content or gets the complete new one.
#[cfg(not(target_arch = "wasm32"))]
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    use std::io::Write;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(bytes.len() as u64)
}
