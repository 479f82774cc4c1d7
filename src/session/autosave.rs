//! Debounced chapter content writes.
//!
//! Edits are coalesced in a pending buffer owned by a worker task. The buffer
//! is written when no edit has arrived for the quiet period, when
//! [`AutoSaver::flush`] is called, or when the saver shuts down.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::config::AutoSaveConfig;
use crate::error::{Error, Result};
use crate::model::ChapterPatch;
use crate::repository::ChapterStore;

enum Command {
    Edit { chapter_id: String, content: String },
    Flush(oneshot::Sender<Result<usize>>),
}

/// Handle to the autosave worker.
///
/// Dropping the handle closes the channel; the worker writes whatever is
/// still pending before it exits.
pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

impl AutoSaver {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(store: ChapterStore, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run(store, debounce, rx));
        Self { tx, worker }
    }

    pub fn with_config(store: ChapterStore, config: &AutoSaveConfig) -> Self {
        Self::spawn(store, config.debounce())
    }

    /// Record new content for a chapter and restart the quiet period.
    ///
    /// Later edits to the same chapter replace earlier pending ones.
    pub fn edit(&self, chapter_id: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.tx
            .send(Command::Edit {
                chapter_id: chapter_id.into(),
                content: content.into(),
            })
            .map_err(|_| stopped())
    }

    /// Write all pending content now; returns how many chapters were written.
    pub async fn flush(&self) -> Result<usize> {
        let (ack, done) = oneshot::channel();
        self.tx.send(Command::Flush(ack)).map_err(|_| stopped())?;
        done.await.map_err(|_| stopped())?
    }

    /// Flush and stop the worker.
    pub async fn shutdown(self) -> Result<usize> {
        let written = self.flush().await?;
        drop(self.tx);
        self.worker.await?;
        Ok(written)
    }
}

fn stopped() -> Error {
    Error::Task("autosave worker stopped".into())
}

async fn run(store: ChapterStore, debounce: Duration, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut pending: BTreeMap<String, String> = BTreeMap::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                command = rx.recv() => command,
                () = sleep_until(at) => {
                    deadline = None;
                    if let Err(e) = write_pending(&store, &mut pending).await {
                        tracing::warn!(error = %e, "autosave failed");
                    }
                    continue;
                }
            },
            None => rx.recv().await,
        };

        match command {
            Some(Command::Edit {
                chapter_id,
                content,
            }) => {
                pending.insert(chapter_id, content);
                deadline = Some(Instant::now() + debounce);
            }
            Some(Command::Flush(ack)) => {
                deadline = None;
                let _ = ack.send(write_pending(&store, &mut pending).await);
            }
            None => {
                if let Err(e) = write_pending(&store, &mut pending).await {
                    tracing::warn!(error = %e, "final autosave failed");
                }
                break;
            }
        }
    }
}

/// Write and clear the pending buffer. Every entry is attempted; the first
/// failure is returned after the rest have been tried.
async fn write_pending(store: &ChapterStore, pending: &mut BTreeMap<String, String>) -> Result<usize> {
    let mut written = 0;
    let mut first_error = None;
    for (chapter_id, content) in std::mem::take(pending) {
        match store.update(&chapter_id, ChapterPatch::content(content)).await {
            Ok(_) => written += 1,
            Err(e) => {
                tracing::warn!(chapter_id, error = %e, "could not save chapter");
                first_error.get_or_insert(e);
            }
        }
    }
    if written > 0 {
        tracing::debug!(written, "autosaved chapters");
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(written),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::{NewBook, NewChapter};
    use crate::repository::Repository;
    use crate::storage::Database;

    async fn setup() -> (Repository, String) {
        let repo = Repository::new(Arc::new(Database::in_memory()));
        let book = repo.books.create(NewBook::new("Draft")).await.unwrap();
        let chapter = repo
            .chapters
            .create(&book.id, NewChapter::new("One"))
            .await
            .unwrap();
        (repo, chapter.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_wait_for_quiet_period() {
        let (repo, id) = setup().await;
        let saver = AutoSaver::spawn(repo.chapters.clone(), Duration::from_millis(1000));

        saver.edit(&id, "<p>one two</p>").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        saver.edit(&id, "<p>one two three</p>").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(repo.chapters.get(&id).await.unwrap().content, None);

        tokio::time::sleep(Duration::from_millis(500)).await;
        let chapter = repo.chapters.get(&id).await.unwrap();
        assert_eq!(chapter.content.as_deref(), Some("<p>one two three</p>"));
        assert_eq!(chapter.word_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_bypasses_debounce() {
        let (repo, id) = setup().await;
        let saver = AutoSaver::spawn(repo.chapters.clone(), Duration::from_secs(60));

        saver.edit(&id, "<p>saved now</p>").unwrap();
        assert_eq!(saver.flush().await.unwrap(), 1);
        assert_eq!(saver.flush().await.unwrap(), 0);

        let chapter = repo.chapters.get(&id).await.unwrap();
        assert_eq!(chapter.content.as_deref(), Some("<p>saved now</p>"));
    }

    #[tokio::test]
    async fn test_shutdown_writes_pending() {
        let (repo, id) = setup().await;
        let saver = AutoSaver::spawn(repo.chapters.clone(), Duration::from_secs(60));
        saver.edit(&id, "<p>last words</p>").unwrap();
        assert_eq!(saver.shutdown().await.unwrap(), 1);

        let book_id = repo.chapters.get(&id).await.unwrap().book_id;
        assert_eq!(repo.books.get(&book_id).await.unwrap().word_count, 2);
    }

    #[tokio::test]
    async fn test_flush_reports_missing_chapter() {
        let (repo, _) = setup().await;
        let saver = AutoSaver::spawn(repo.chapters.clone(), Duration::from_secs(60));
        saver.edit("missing", "<p>x</p>").unwrap();
        assert!(matches!(saver.flush().await, Err(Error::NotFound { .. })));
    }
}
