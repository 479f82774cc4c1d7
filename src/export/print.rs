//! Paginated print document.
//!
//! One standalone HTML file with inline CSS. Layout is expressed with
//! paged-media rules (`@page`, margin boxes, `string-set`) so any print
//! engine that implements them produces the paginated book without
//! external resources.

use quick_xml::escape::escape;

use super::cover::CoverImage;
use super::{PageSize, PreparedChapter, PrintExportOptions, UNKNOWN_AUTHOR, prepare_chapters};
use crate::error::Result;
use crate::model::{Book, Chapter};

/// Anchor id of the chapter at a 1-based export position.
pub fn chapter_anchor(position: usize) -> String {
    format!("chapter-{position}")
}

/// Build the print document.
///
/// Fails with [`crate::Error::EmptyExport`] when no chapter is included.
pub fn generate_print_html(
    book: &Book,
    chapters: &[Chapter],
    options: &PrintExportOptions,
    cover: Option<&CoverImage>,
) -> Result<String> {
    // chapter numbers always show in print headers
    let prepared = prepare_chapters(chapters, true, |position| format!("ch{position}-"))?;
    let language = match book.language.trim() {
        "" => "en",
        lang => lang,
    };

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n");
    html.push_str(&format!("<html lang=\"{}\">\n<head>\n", escape(language)));
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape(&book.title)));
    html.push_str("<style>\n");
    html.push_str(&print_stylesheet(options));
    html.push_str("</style>\n</head>\n<body>\n");

    html.push_str(&cover_section(book, cover));
    if options.include_toc {
        html.push_str(&toc_section(&prepared));
    }
    for (index, chapter) in prepared.iter().enumerate() {
        html.push_str(&chapter_section(chapter, index + 1));
    }

    html.push_str("</body>\n</html>\n");
    tracing::debug!(
        book_id = %book.id,
        chapters = prepared.len(),
        page_size = %options.page_size,
        "generated print document"
    );
    Ok(html)
}

fn cover_section(book: &Book, cover: Option<&CoverImage>) -> String {
    let mut out = String::from("<section class=\"cover\">\n");
    match cover {
        Some(image) => {
            out.push_str(&format!(
                "<img class=\"cover-image\" src=\"{}\" alt=\"{}\">\n",
                image.to_data_uri(),
                escape(&book.title)
            ));
        }
        None => {
            let author = match book.author_name.trim() {
                "" => UNKNOWN_AUTHOR,
                name => name,
            };
            out.push_str("<div class=\"title-page\">\n");
            out.push_str(&format!(
                "<h1 class=\"book-title\">{}</h1>\n",
                escape(&book.title)
            ));
            if let Some(subtitle) = book.subtitle.as_deref().filter(|s| !s.trim().is_empty()) {
                out.push_str(&format!(
                    "<p class=\"book-subtitle\">{}</p>\n",
                    escape(subtitle)
                ));
            }
            out.push_str(&format!("<p class=\"book-author\">{}</p>\n", escape(author)));
            out.push_str("</div>\n");
        }
    }
    out.push_str("</section>\n");
    out
}

/// Contents listing every exported chapter except frontmatter.
fn toc_section(chapters: &[PreparedChapter]) -> String {
    let mut out = String::from("<nav class=\"toc\">\n<h2>Contents</h2>\n<ol>\n");
    for (index, chapter) in chapters.iter().enumerate() {
        if chapter.is_frontmatter() {
            continue;
        }
        out.push_str(&format!(
            "<li><a href=\"#{}\">{}</a></li>\n",
            chapter_anchor(index + 1),
            escape(&chapter.display_title)
        ));
    }
    out.push_str("</ol>\n</nav>\n");
    out
}

fn chapter_section(chapter: &PreparedChapter, position: usize) -> String {
    let mut out = format!(
        "<article class=\"chapter {}\" id=\"{}\">\n<header class=\"chapter-header\">\n",
        chapter.chapter_type.as_str(),
        chapter_anchor(position)
    );
    if let Some(number) = chapter.number {
        out.push_str(&format!("<p class=\"chapter-number\">Chapter {number}</p>\n"));
    }
    out.push_str(&format!(
        "<h1 class=\"chapter-title\">{}</h1>\n</header>\n",
        escape(&chapter.title)
    ));
    out.push_str(&chapter.html);
    out.push_str("\n</article>\n");
    out
}

/// Paged-media stylesheet for the given options.
pub fn print_stylesheet(options: &PrintExportOptions) -> String {
    let size: PageSize = options.page_size;
    let margin = size.margin_mm();

    let mut css = String::new();
    css.push_str(&format!(
        "@page {{\n  size: {};\n  margin: {margin}mm {margin}mm {bottom}mm;\n",
        size.css_size(),
        bottom = margin + 4.0,
    ));
    if options.running_headers {
        css.push_str(
            "  @top-center { content: string(chapter-title); font-size: 8pt; font-style: italic; }\n",
        );
    }
    if options.page_numbers {
        css.push_str("  @bottom-center { content: counter(page); font-size: 9pt; }\n");
    }
    css.push_str("}\n");

    // no header or folio on the cover and chapter opening pages
    css.push_str(
        "@page cover { margin: 0; @top-center { content: none; } @bottom-center { content: none; } }\n",
    );
    css.push_str("@page chapter-start { @top-center { content: none; } }\n");

    css.push_str(
        r#"html { font-family: Georgia, "Times New Roman", serif; font-size: 11pt; line-height: 1.45; }
body { margin: 0; }
.cover { page: cover; break-after: page; height: 100vh; display: flex; align-items: center; justify-content: center; text-align: center; }
.cover-image { max-width: 100%; max-height: 100%; object-fit: contain; }
.title-page .book-title { font-size: 2.4em; margin: 0 0 0.4em; }
.title-page .book-subtitle { font-size: 1.3em; font-style: italic; margin: 0 0 2em; }
.title-page .book-author { font-size: 1.2em; letter-spacing: 0.05em; }
.toc { break-after: page; }
.toc ol { list-style: none; padding: 0; }
.toc li { margin: 0.3em 0; }
.toc a { color: inherit; text-decoration: none; }
.chapter { break-before: page; }
.cover + .chapter, .toc + .chapter { break-before: auto; }
.chapter-header { page: chapter-start; margin: 3em 0 2em; text-align: center; break-after: avoid; }
.chapter-number { font-variant: small-caps; letter-spacing: 0.1em; margin: 0 0 0.5em; }
h1, h2, h3, h4, h5, h6 { break-after: avoid; page-break-after: avoid; }
p { margin: 0; text-indent: 1.5em; orphans: 3; widows: 3; text-align: justify; hyphens: auto; }
.chapter-header + p, h1 + p, h2 + p, h3 + p, hr + p { text-indent: 0; }
hr.scene-break { border: none; margin: 1em 0; text-align: center; break-after: avoid; }
hr.scene-break::after { content: "* * *"; }
sup.footnote-ref { font-size: 0.7em; line-height: 0; }
sup.footnote-ref a, a.footnote-backref { color: inherit; text-decoration: none; }
.endnotes { margin-top: 2em; font-size: 0.9em; }
.endnotes h2 { font-size: 1em; text-transform: uppercase; letter-spacing: 0.1em; }
.endnotes li p { text-indent: 0; }
img { max-width: 100%; }
"#,
    );
    if options.running_headers {
        css.push_str(".chapter-title { string-set: chapter-title content(); }\n");
    }
    css
}
