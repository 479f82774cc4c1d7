use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use super::cover::{AssetFetcher, FsAssetFetcher, resolve_cover};
use super::epub::build_epub;
use super::preview::{FlowPaginator, Preview, PreviewRenderer};
use super::print::generate_print_html;
use super::{
    EpubExportOptions, ExportReport, ExportStage, PrintExportOptions, ProgressSink,
    select_exportable, suggested_filename, write_atomic,
};
use crate::error::{Error, Result};
use crate::model::{Book, Chapter};
use crate::repository::Repository;

/// Loads books from the repository and writes export artifacts.
///
/// Exports are serialized: a request issued while another is in flight waits
/// for it to finish instead of interleaving with it. Exports are not
/// cancellable once started.
pub struct Publisher {
    repo: Repository,
    fetcher: Arc<dyn AssetFetcher>,
    gate: Mutex<()>,
    preview: parking_lot::Mutex<PreviewRenderer>,
}

impl Publisher {
    /// Publisher that resolves external covers on the local filesystem.
    pub fn new(repo: Repository) -> Self {
        Self::with_fetcher(repo, Arc::new(FsAssetFetcher::new()))
    }

    pub fn with_fetcher(repo: Repository, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            repo,
            fetcher,
            gate: Mutex::new(()),
            preview: parking_lot::Mutex::new(PreviewRenderer::<FlowPaginator>::default()),
        }
    }

    /// Whether an export is currently running.
    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Export a book as EPUB. `dest` may be a file path or an existing
    /// directory, in which case a filename is derived from the title.
    pub async fn export_epub(
        &self,
        book_id: &str,
        options: &EpubExportOptions,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<ExportReport> {
        let _guard = self.gate.lock().await;

        progress.stage(ExportStage::Preparing);
        let (book, chapters) = self.load(book_id).await?;

        progress.stage(ExportStage::Generating);
        let package = build_epub(&book, &chapters, options, self.fetcher.as_ref()).await?;

        progress.stage(ExportStage::Saving);
        let path = destination(dest, &book, "epub").await?;
        let bytes = save(path.clone(), package.bytes).await?;

        tracing::info!(book_id, path = %path.display(), bytes, "exported EPUB");
        Ok(ExportReport {
            path,
            bytes,
            warnings: package.warnings,
        })
    }

    /// Export a book as a print-ready HTML document.
    pub async fn export_print(
        &self,
        book_id: &str,
        options: &PrintExportOptions,
        dest: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<ExportReport> {
        let _guard = self.gate.lock().await;

        progress.stage(ExportStage::Preparing);
        let (book, chapters) = self.load(book_id).await?;

        progress.stage(ExportStage::Generating);
        let mut warnings = Vec::new();
        let cover = resolve_cover(&book, self.fetcher.as_ref(), &mut warnings).await;
        let html = generate_print_html(&book, &chapters, options, cover.as_ref())?;

        progress.stage(ExportStage::Saving);
        let path = destination(dest, &book, "html").await?;
        let bytes = save(path.clone(), html.into_bytes()).await?;

        tracing::info!(book_id, path = %path.display(), bytes, "exported print document");
        Ok(ExportReport {
            path,
            bytes,
            warnings,
        })
    }

    /// Paginated on-screen preview of the print document.
    pub async fn preview(&self, book_id: &str, options: &PrintExportOptions) -> Result<Preview> {
        let (book, chapters) = self.load(book_id).await?;
        let mut warnings = Vec::new();
        let cover = resolve_cover(&book, self.fetcher.as_ref(), &mut warnings).await;
        self.preview
            .lock()
            .render(&book, &chapters, options, cover.as_ref())
    }

    async fn load(&self, book_id: &str) -> Result<(Book, Vec<Chapter>)> {
        let book = self.repo.books.get(book_id).await?;
        let chapters = self.repo.chapters.list(book_id).await?;
        if select_exportable(&chapters).is_empty() {
            return Err(Error::EmptyExport);
        }
        Ok((book, chapters))
    }
}

async fn destination(dest: &Path, book: &Book, extension: &str) -> Result<PathBuf> {
    let is_dir = tokio::fs::metadata(dest)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false);
    Ok(if is_dir {
        dest.join(suggested_filename(&book.title, extension))
    } else {
        dest.to_path_buf()
    })
}

async fn save(path: PathBuf, bytes: Vec<u8>) -> Result<u64> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes)).await?
}
