use std::sync::Arc;

use scriptorium::export::{
    FsAssetFetcher, NoProgress, PageSize, PrintExportOptions, Publisher, print_stylesheet,
};
use scriptorium::model::{BookPatch, ChapterPatch, ChapterType, NewBook, NewChapter};
use scriptorium::storage::Database;
use scriptorium::{Error, Repository};

const JPEG: [u8; 8] = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F'];

async fn seeded(chapters: &[(&str, ChapterType, &str)]) -> (Repository, String) {
    let repo = Repository::new(Arc::new(Database::in_memory()));
    let book = repo
        .books
        .create(
            NewBook::new("The Long Shore")
                .with_subtitle("Stories")
                .with_author("Ines Vale"),
        )
        .await
        .unwrap();
    for (title, chapter_type, content) in chapters {
        let chapter = repo
            .chapters
            .create(&book.id, NewChapter::new(*title).with_type(*chapter_type))
            .await
            .unwrap();
        repo.chapters
            .update(&chapter.id, ChapterPatch::content(*content))
            .await
            .unwrap();
    }
    (repo, book.id)
}

async fn print(publisher: &Publisher, book_id: &str, options: &PrintExportOptions) -> String {
    let dir = tempfile::tempdir().unwrap();
    let report = publisher
        .export_print(book_id, options, dir.path(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(report.path, dir.path().join("The_Long_Shore.html"));
    std::fs::read_to_string(&report.path).unwrap()
}

#[tokio::test]
async fn test_document_structure() {
    let (repo, book_id) = seeded(&[
        ("Dedication", ChapterType::Frontmatter, "<p>For M.</p>"),
        ("Landfall", ChapterType::Chapter, "<p>The boat came in.</p>"),
        ("Ebb", ChapterType::Chapter, "<p>It left.</p>"),
    ])
    .await;
    let html = print(&Publisher::new(repo), &book_id, &PrintExportOptions::default()).await;

    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<html lang=\"en\">"));
    assert!(html.contains("<title>The Long Shore</title>"));

    // cover, contents, then chapters
    let cover = html.find("<section class=\"cover\">").unwrap();
    let toc = html.find("<nav class=\"toc\">").unwrap();
    let first = html.find("id=\"chapter-1\"").unwrap();
    assert!(cover < toc && toc < first);

    assert!(html.contains("<p class=\"book-subtitle\">Stories</p>"));
    assert!(html.contains("<p class=\"book-author\">Ines Vale</p>"));

    let toc_html = &html[toc..html[toc..].find("</nav>").unwrap() + toc];
    assert!(!toc_html.contains("Dedication"));
    assert!(toc_html.contains("<a href=\"#chapter-2\">Chapter 1: Landfall</a>"));
    assert!(toc_html.contains("<a href=\"#chapter-3\">Chapter 2: Ebb</a>"));

    assert!(html.contains("<article class=\"chapter frontmatter\" id=\"chapter-1\">"));
    assert!(html.contains("<p class=\"chapter-number\">Chapter 2</p>"));
    assert!(html.contains("<h1 class=\"chapter-title\">Ebb</h1>"));
}

#[tokio::test]
async fn test_document_is_self_contained() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cover.jpg"), JPEG).unwrap();

    let (repo, book_id) = seeded(&[("One", ChapterType::Chapter, "<p>Text.</p>")]).await;
    repo.books
        .update(
            &book_id,
            BookPatch {
                cover_path: Some(Some("cover.jpg".into())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let publisher = Publisher::with_fetcher(repo, Arc::new(FsAssetFetcher::with_base(dir.path())));
    let html = print(&publisher, &book_id, &PrintExportOptions::default()).await;

    assert!(html.contains("<img class=\"cover-image\" src=\"data:image/jpeg;base64,"));
    assert!(!html.contains("<h1 class=\"book-title\""));
    assert!(!html.contains("<link"));
    assert!(!html.contains("<script"));
    assert!(!html.contains("cover.jpg"));
    assert!(!html.contains("http://") && !html.contains("https://"));
}

#[tokio::test]
async fn test_footnote_anchors_are_unique_per_chapter() {
    let note = r#"<p>Waves<span data-footnote-content="Many.">.</span></p>"#;
    let (repo, book_id) = seeded(&[
        ("One", ChapterType::Chapter, note),
        ("Two", ChapterType::Chapter, note),
    ])
    .await;
    let html = print(&Publisher::new(repo), &book_id, &PrintExportOptions::default()).await;

    for prefix in ["ch1-", "ch2-"] {
        assert!(html.contains(&format!(r##"href="#{prefix}fn-1" id="{prefix}fnref-1""##)));
        assert!(html.contains(&format!(r#"<li id="{prefix}fn-1" epub:type="endnote">Many."#)));
    }
    assert!(!html.contains("id=\"fn-1\""));
}

#[tokio::test]
async fn test_options_shape_the_stylesheet() {
    let (repo, book_id) = seeded(&[("One", ChapterType::Chapter, "<p>a</p>")]).await;
    let options = PrintExportOptions {
        page_size: PageSize::Letter,
        include_toc: false,
        page_numbers: false,
        running_headers: false,
    };
    let html = print(&Publisher::new(repo), &book_id, &options).await;

    assert!(html.contains("size: letter;"));
    assert!(!html.contains("counter(page)"));
    assert!(!html.contains("string(chapter-title)"));
    assert!(!html.contains("<nav class=\"toc\">"));
}

#[test]
fn test_every_page_size_has_a_stylesheet() {
    for size in PageSize::ALL {
        let css = print_stylesheet(&PrintExportOptions {
            page_size: size,
            ..Default::default()
        });
        assert!(css.contains(&format!("size: {};", size.css_size())));
        assert!(css.contains("counter(page)"));
        assert!(css.contains("string-set: chapter-title content();"));
        assert!(css.contains(".chapter { break-before: page; }"));
        assert!(css.contains("orphans: 3; widows: 3;"));
    }
}

#[tokio::test]
async fn test_preview_paginates_the_print_document() {
    let body: String = (0..120)
        .map(|i| format!("<p>Paragraph {i} of a chapter long enough to need several pages.</p>"))
        .collect();
    let (repo, book_id) = seeded(&[
        ("One", ChapterType::Chapter, body.as_str()),
        ("Two", ChapterType::Chapter, "<p>short</p>"),
    ])
    .await;
    let publisher = Publisher::new(repo);

    let a5 = publisher
        .preview(&book_id, &PrintExportOptions::default())
        .await
        .unwrap();
    let a4 = publisher
        .preview(
            &book_id,
            &PrintExportOptions {
                page_size: PageSize::A4,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // cover + toc + at least two pages for the long chapter + one for the short one
    assert!(a5.pages.len() >= 5);
    assert!(a4.pages.len() < a5.pages.len());
    for (index, page) in a5.pages.iter().enumerate() {
        assert_eq!(page.number, index + 1);
    }
    assert!(a5.pages.iter().any(|p| p.html.contains("<p>short</p>")));
}

#[tokio::test]
async fn test_empty_book_is_rejected() {
    let (repo, book_id) = seeded(&[]).await;
    let dir = tempfile::tempdir().unwrap();
    let publisher = Publisher::new(repo);
    let result = publisher
        .export_print(&book_id, &PrintExportOptions::default(), dir.path(), &NoProgress)
        .await;
    assert!(matches!(result, Err(Error::EmptyExport)));
    assert!(matches!(
        publisher.preview(&book_id, &PrintExportOptions::default()).await,
        Err(Error::EmptyExport)
    ));
}
