//! Single active-document editing session.
//!
//! [`EditorSession`] tracks which book is open, its chapters and the current
//! chapter. Chapter loads are tagged with the book id they were issued for;
//! a load that completes after the active book changed is discarded and
//! reported as [`LoadOutcome::Stale`].

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::model::{Book, Chapter, ChapterPatch, NewChapter};
use crate::repository::Repository;

mod autosave;

pub use autosave::AutoSaver;

/// Result of a load that may have been overtaken by a book switch.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    Applied(T),
    /// The active book changed while the load was in flight.
    Stale,
}

impl<T> LoadOutcome<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, LoadOutcome::Stale)
    }

    pub fn applied(self) -> Option<T> {
        match self {
            LoadOutcome::Applied(value) => Some(value),
            LoadOutcome::Stale => None,
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    active_book_id: Option<String>,
    book: Option<Book>,
    chapters: Vec<Chapter>,
    current_chapter_id: Option<String>,
}

impl SessionState {
    fn is_active(&self, book_id: &str) -> bool {
        self.active_book_id.as_deref() == Some(book_id)
    }

    fn current(&self) -> Option<&Chapter> {
        let id = self.current_chapter_id.as_deref()?;
        self.chapters.iter().find(|c| c.id == id)
    }
}

/// The editing session over one repository.
pub struct EditorSession {
    repo: Repository,
    state: Mutex<SessionState>,
}

impl EditorSession {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn active_book_id(&self) -> Option<String> {
        self.state.lock().active_book_id.clone()
    }

    pub fn active_book(&self) -> Option<Book> {
        self.state.lock().book.clone()
    }

    pub fn chapters(&self) -> Vec<Chapter> {
        self.state.lock().chapters.clone()
    }

    pub fn current_chapter(&self) -> Option<Chapter> {
        self.state.lock().current().cloned()
    }

    /// Switch the active book without loading anything.
    ///
    /// Loads still in flight for the previous book become stale.
    pub fn activate(&self, book_id: &str) {
        let mut state = self.state.lock();
        if state.is_active(book_id) {
            return;
        }
        *state = SessionState {
            active_book_id: Some(book_id.to_string()),
            ..Default::default()
        };
    }

    /// Forget the active book.
    pub fn close_book(&self) {
        *self.state.lock() = SessionState::default();
    }

    /// Open a book for editing and resume at its last viewed chapter.
    ///
    /// Stamps the book's `last_opened_at`. Resumes at `last_chapter_id` when
    /// that chapter still exists, otherwise at the first chapter.
    pub async fn open_book(&self, book_id: &str) -> Result<LoadOutcome<Book>> {
        self.activate(book_id);
        let book = self.repo.books.load(book_id).await?;

        let chapters = match self.load_chapters(book_id).await? {
            LoadOutcome::Applied(chapters) => chapters,
            LoadOutcome::Stale => return Ok(LoadOutcome::Stale),
        };

        let mut state = self.state.lock();
        if !state.is_active(book_id) {
            tracing::debug!(book_id, "discarding stale book open");
            return Ok(LoadOutcome::Stale);
        }
        state.current_chapter_id = book
            .last_chapter_id
            .as_deref()
            .filter(|id| chapters.iter().any(|c| c.id == *id))
            .map(str::to_string)
            .or_else(|| chapters.first().map(|c| c.id.clone()));
        state.book = Some(book.clone());
        tracing::info!(book_id, chapters = chapters.len(), "opened book");
        Ok(LoadOutcome::Applied(book))
    }

    /// Load a book's chapters and apply them if the book is still active.
    pub async fn load_chapters(&self, book_id: &str) -> Result<LoadOutcome<Vec<Chapter>>> {
        let chapters = self.repo.chapters.list(book_id).await?;

        let mut state = self.state.lock();
        if !state.is_active(book_id) {
            tracing::debug!(
                requested = book_id,
                active = ?state.active_book_id,
                "discarding stale chapter load"
            );
            return Ok(LoadOutcome::Stale);
        }
        state.chapters = chapters.clone();
        if state.current().is_none() {
            state.current_chapter_id = None;
        }
        Ok(LoadOutcome::Applied(chapters))
    }

    /// Reload the active book's metadata and chapters.
    pub async fn refresh(&self) -> Result<LoadOutcome<Book>> {
        let book_id = self.require_active()?;
        let book = self.repo.books.get(&book_id).await?;
        if self.load_chapters(&book_id).await?.is_stale() {
            return Ok(LoadOutcome::Stale);
        }
        let mut state = self.state.lock();
        if !state.is_active(&book_id) {
            return Ok(LoadOutcome::Stale);
        }
        state.book = Some(book.clone());
        Ok(LoadOutcome::Applied(book))
    }

    /// Make a chapter of the active book current and remember it for resume.
    pub async fn select_chapter(&self, chapter_id: &str) -> Result<Chapter> {
        let book_id = self.require_active()?;
        let chapter = {
            let mut state = self.state.lock();
            let chapter = state
                .chapters
                .iter()
                .find(|c| c.id == chapter_id)
                .cloned()
                .ok_or_else(|| Error::chapter_not_found(chapter_id))?;
            state.current_chapter_id = Some(chapter.id.clone());
            chapter
        };

        let book = self
            .repo
            .books
            .set_last_chapter(&book_id, Some(chapter_id))
            .await?;
        self.apply_book(book);
        Ok(chapter)
    }

    /// Append a chapter to the active book and make it current.
    pub async fn create_chapter(&self, new: NewChapter) -> Result<Chapter> {
        let book_id = self.require_active()?;
        let chapter = self.repo.chapters.create(&book_id, new).await?;
        self.load_chapters(&book_id).await?;
        self.select_chapter(&chapter.id).await
    }

    /// Write chapter content immediately and refresh the cached word counts.
    pub async fn save_content(&self, chapter_id: &str, html: &str) -> Result<Chapter> {
        let chapter = self
            .repo
            .chapters
            .update(chapter_id, ChapterPatch::content(html))
            .await?;
        let book = self.repo.books.get(&chapter.book_id).await?;

        let mut state = self.state.lock();
        if state.is_active(&chapter.book_id) {
            if let Some(slot) = state.chapters.iter_mut().find(|c| c.id == chapter.id) {
                *slot = chapter.clone();
            }
            state.book = Some(book);
        }
        Ok(chapter)
    }

    /// Delete a chapter of the active book.
    ///
    /// When the current chapter is deleted, the chapter that takes its
    /// position becomes current, else the previous one, else none. Returns the
    /// new current chapter.
    pub async fn delete_chapter(&self, chapter_id: &str) -> Result<Option<Chapter>> {
        let book_id = self.require_active()?;
        self.repo.chapters.delete(chapter_id).await?;

        let was_current = self.state.lock().current_chapter_id.as_deref() == Some(chapter_id);
        let position = self
            .state
            .lock()
            .chapters
            .iter()
            .position(|c| c.id == chapter_id);

        if self.load_chapters(&book_id).await?.is_stale() {
            return Ok(None);
        }

        let next = {
            let mut state = self.state.lock();
            if was_current {
                let next = position.and_then(|index| {
                    state
                        .chapters
                        .get(index)
                        .or_else(|| index.checked_sub(1).and_then(|i| state.chapters.get(i)))
                        .cloned()
                });
                state.current_chapter_id = next.as_ref().map(|c| c.id.clone());
            }
            state.current().cloned()
        };

        if was_current {
            let book = self
                .repo
                .books
                .set_last_chapter(&book_id, next.as_ref().map(|c| c.id.as_str()))
                .await?;
            self.apply_book(book);
        } else {
            let book = self.repo.books.get(&book_id).await?;
            self.apply_book(book);
        }
        Ok(next)
    }

    /// Reorder the active book's chapters.
    pub async fn reorder_chapters(&self, ordered_ids: &[String]) -> Result<Vec<Chapter>> {
        let book_id = self.require_active()?;
        self.repo.chapters.reorder(&book_id, ordered_ids).await?;
        Ok(self
            .load_chapters(&book_id)
            .await?
            .applied()
            .unwrap_or_default())
    }

    fn require_active(&self) -> Result<String> {
        self.active_book_id().ok_or(Error::NotFound {
            kind: "active book",
            id: String::new(),
        })
    }

    fn apply_book(&self, book: Book) {
        let mut state = self.state.lock();
        if state.is_active(&book.id) {
            state.book = Some(book);
        }
    }
}
