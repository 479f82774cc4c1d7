//! scriptorium - book storage and publishing from the command line

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scriptorium::config::Backend;
use scriptorium::export::{ExportReport, ExportStage};
use scriptorium::model::ChapterPatch;
use scriptorium::{
    ChapterType, Config, Database, NewBook, NewChapter, PageSize, Publisher, Repository,
};

#[derive(Parser)]
#[command(name = "scriptorium")]
#[command(version, about = "Book storage and publishing", long_about = None)]
#[command(after_help = "EXAMPLES:
    scriptorium new-book \"Field Notes\" --author \"Ann Writer\"
    scriptorium add-chapter <BOOK> \"Arrival\" --content arrival.html
    scriptorium export-epub <BOOK> out/
    scriptorium export-print <BOOK> book.html --page-size trade")]
struct Cli {
    /// Database file (file-backed engine)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Snapshot directory (in-memory engine persisted to host stores)
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "db")]
    snapshot_dir: Option<PathBuf>,

    /// Suppress progress messages
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List books, most recently opened first
    Books,
    /// List the chapters of a book in order
    Chapters { book: String },
    /// Create a book
    NewBook {
        title: String,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        subtitle: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Append a chapter to a book
    AddChapter {
        book: String,
        title: String,
        /// Chapter type (chapter, prologue, epilogue, part, frontmatter, backmatter)
        #[arg(long = "type", default_value = "chapter")]
        chapter_type: String,
        /// HTML file with the chapter body
        #[arg(long, value_name = "FILE")]
        content: Option<PathBuf>,
    },
    /// Export a book as EPUB
    ExportEpub {
        book: String,
        /// Output file or directory
        output: PathBuf,
        #[arg(long)]
        no_toc: bool,
        #[arg(long)]
        no_numbers: bool,
        #[arg(long)]
        no_titles: bool,
    },
    /// Export a book as a print-ready HTML document
    ExportPrint {
        book: String,
        /// Output file or directory
        output: PathBuf,
        #[arg(long)]
        page_size: Option<PageSize>,
        #[arg(long)]
        no_toc: bool,
        #[arg(long)]
        no_page_numbers: bool,
        #[arg(long)]
        no_headers: bool,
    },
    /// Write a paginated on-screen preview of the print document
    Preview {
        book: String,
        output: PathBuf,
        #[arg(long)]
        page_size: Option<PageSize>,
    },
    /// Write a SQL dump of the whole database
    Dump {
        /// Output file (stdout when omitted)
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // a missing .env file is fine
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scriptorium=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let db = Arc::new(Database::new(config.storage.clone()));
    let result = run(cli, &config, Arc::clone(&db)).await;
    let closed = db.close().await;

    match result.and(closed.map_err(|e| e.to_string())) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, String> {
    let mut config = Config::from_env()?;
    if let Some(path) = &cli.db {
        config.storage.backend = Backend::Native { path: path.clone() };
    }
    if let Some(dir) = &cli.snapshot_dir {
        config.storage.backend = Backend::Embedded {
            snapshot_dir: Some(dir.clone()),
        };
    }
    Ok(config)
}

async fn run(cli: Cli, config: &Config, db: Arc<Database>) -> Result<(), String> {
    let repo = Repository::new(db);
    let quiet = cli.quiet;
    let progress = move |stage: ExportStage| {
        if !quiet {
            eprintln!("{}...", capitalize(stage.label()));
        }
    };

    match cli.command {
        Command::Books => {
            let books = repo.books.list().await.map_err(|e| e.to_string())?;
            for book in books {
                println!(
                    "{}  {}  ({} words, {})",
                    book.id, book.title, book.word_count, book.status
                );
            }
        }
        Command::Chapters { book } => {
            let chapters = repo.chapters.list(&book).await.map_err(|e| e.to_string())?;
            for chapter in chapters {
                let excluded = if chapter.is_included_in_export { "" } else { "  [excluded]" };
                println!(
                    "{:>3}. {}  {} [{}] ({} words){excluded}",
                    chapter.order + 1,
                    chapter.id,
                    chapter.title,
                    chapter.chapter_type,
                    chapter.word_count
                );
            }
        }
        Command::NewBook {
            title,
            author,
            subtitle,
            language,
        } => {
            let mut new = NewBook::new(title);
            if let Some(author) = author {
                new = new.with_author(author);
            }
            if let Some(subtitle) = subtitle {
                new = new.with_subtitle(subtitle);
            }
            if let Some(language) = language {
                new = new.with_language(language);
            }
            let book = repo.books.create(new).await.map_err(|e| e.to_string())?;
            println!("{}", book.id);
        }
        Command::AddChapter {
            book,
            title,
            chapter_type,
            content,
        } => {
            let chapter_type: ChapterType = chapter_type.parse().map_err(|e| format!("{e}"))?;
            let body = match content {
                Some(path) => Some(
                    tokio::fs::read_to_string(&path)
                        .await
                        .map_err(|e| format!("{}: {e}", path.display()))?,
                ),
                None => None,
            };
            let chapter = repo
                .chapters
                .create(&book, NewChapter::new(title).with_type(chapter_type))
                .await
                .map_err(|e| e.to_string())?;
            if let Some(body) = body {
                repo.chapters
                    .update(&chapter.id, ChapterPatch::content(body))
                    .await
                    .map_err(|e| e.to_string())?;
            }
            println!("{}", chapter.id);
        }
        Command::ExportEpub {
            book,
            output,
            no_toc,
            no_numbers,
            no_titles,
        } => {
            let mut options = config.export.epub.clone();
            options.include_toc &= !no_toc;
            options.number_chapters &= !no_numbers;
            options.prepend_titles &= !no_titles;
            let report = Publisher::new(repo)
                .export_epub(&book, &options, &output, &progress)
                .await
                .map_err(|e| e.to_string())?;
            print_report(&report, quiet);
        }
        Command::ExportPrint {
            book,
            output,
            page_size,
            no_toc,
            no_page_numbers,
            no_headers,
        } => {
            let mut options = config.export.print.clone();
            if let Some(size) = page_size {
                options.page_size = size;
            }
            options.include_toc &= !no_toc;
            options.page_numbers &= !no_page_numbers;
            options.running_headers &= !no_headers;
            let report = Publisher::new(repo)
                .export_print(&book, &options, &output, &progress)
                .await
                .map_err(|e| e.to_string())?;
            print_report(&report, quiet);
        }
        Command::Preview {
            book,
            output,
            page_size,
        } => {
            let mut options = config.export.print.clone();
            if let Some(size) = page_size {
                options.page_size = size;
            }
            let title = repo
                .books
                .get(&book)
                .await
                .map_err(|e| e.to_string())?
                .title;
            let preview = Publisher::new(repo)
                .preview(&book, &options)
                .await
                .map_err(|e| e.to_string())?;
            write_output(&output, preview.to_html(&title).as_bytes())?;
            if !quiet {
                eprintln!("{} pages -> {}", preview.pages.len(), output.display());
            }
        }
        Command::Dump { output } => {
            let dump = repo
                .database()
                .export_data()
                .await
                .map_err(|e| e.to_string())?;
            match output {
                Some(path) => write_output(&path, &dump)?,
                None => {
                    use std::io::Write;
                    std::io::stdout()
                        .write_all(&dump)
                        .map_err(|e| e.to_string())?;
                }
            }
        }
    }
    Ok(())
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), String> {
    scriptorium::export::write_atomic(path, bytes)
        .map(|_| ())
        .map_err(|e| format!("{}: {e}", path.display()))
}

fn print_report(report: &ExportReport, quiet: bool) {
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    if !quiet {
        eprintln!("Done: {} ({} bytes)", report.path.display(), report.bytes);
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use scriptorium::config::StorageConfig;

    #[test]
    fn test_books_help_matches_listing_order() {
        let cli = Cli::command();
        let books = cli.find_subcommand("books").unwrap();
        let about = books.get_about().unwrap().to_string();
        assert_eq!(about, "List books, most recently opened first");
    }

    #[tokio::test]
    async fn test_export_failure_is_reported_once() {
        let storage = StorageConfig {
            backend: Backend::Embedded { snapshot_dir: None },
            ..Default::default()
        };
        let db = Arc::new(Database::new(storage));
        let book = Repository::new(Arc::clone(&db))
            .books
            .create(NewBook::new("Empty"))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_string_lossy().into_owned();
        let args = ["scriptorium", "-q", "export-epub", book.id.as_str(), out.as_str()];
        let cli = Cli::try_parse_from(args).unwrap();

        let err = run(cli, &Config::default(), db).await.unwrap_err();
        assert_eq!(err, scriptorium::Error::EmptyExport.to_string());
    }
}
