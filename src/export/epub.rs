//! EPUB 3 packager.
//!
//! Produces an EPUB 3 package with an NCX table of contents for EPUB 2
//! readers. The whole package is built in memory; [`super::Publisher`] owns
//! the destination write.

use std::io::{Cursor, Seek, Write};

use quick_xml::escape::escape;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::cover::{AssetFetcher, CoverImage, resolve_cover};
use super::xhtml::to_xhtml;
use super::{
    EpubExportOptions, PreparedChapter, UNKNOWN_AUTHOR, prepare_chapters, select_exportable,
};
use crate::error::{Error, Result};
use crate::model::{Book, Chapter, ChapterType};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

const STYLESHEET: &str = r#"body { margin: 0 5%; line-height: 1.5; }
h1.chapter-title { text-align: center; margin: 2em 0 1.5em; page-break-after: avoid; }
p { margin: 0; text-indent: 1.5em; }
h1 + p, h2 + p, hr + p { text-indent: 0; }
hr.scene-break { border: none; margin: 1.5em 0; text-align: center; }
hr.scene-break::after { content: "* * *"; }
sup.footnote-ref { font-size: 0.75em; line-height: 0; }
section.endnotes { margin-top: 3em; font-size: 0.9em; }
section.endnotes li p { text-indent: 0; }
a.footnote-backref { text-decoration: none; }
section.cover { text-align: center; margin: 0; padding: 0; }
section.cover img { max-width: 100%; max-height: 100%; }
nav#toc ol { list-style: none; padding: 0; }
"#;

/// A packaged EPUB plus any non-fatal warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpubPackage {
    pub bytes: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Build an EPUB for `book`, fetching an external cover through `fetcher`.
///
/// Fails with [`Error::EmptyExport`] before any cover or packaging work when
/// no chapter is included in export. A cover that cannot be loaded is skipped
/// with a warning.
pub async fn build_epub(
    book: &Book,
    chapters: &[Chapter],
    options: &EpubExportOptions,
    fetcher: &dyn AssetFetcher,
) -> Result<EpubPackage> {
    if select_exportable(chapters).is_empty() {
        return Err(Error::EmptyExport);
    }
    let mut warnings = Vec::new();
    let cover = resolve_cover(book, fetcher, &mut warnings).await;
    let bytes = package_epub(book, chapters, options, cover.as_ref())?;
    Ok(EpubPackage { bytes, warnings })
}

/// Package an EPUB from a book, its chapters and an already resolved cover.
pub fn package_epub(
    book: &Book,
    chapters: &[Chapter],
    options: &EpubExportOptions,
    cover: Option<&CoverImage>,
) -> Result<Vec<u8>> {
    let prepared = prepare_chapters(chapters, options.number_chapters, |_| String::new())?;
    let plan = PackagePlan::new(book, prepared, options, cover);

    let mut cursor = Cursor::new(Vec::new());
    plan.write(&mut cursor)?;
    let bytes = cursor.into_inner();
    tracing::debug!(
        book_id = %book.id,
        chapters = plan.chapters.len(),
        cover = cover.is_some(),
        bytes = bytes.len(),
        "packaged epub"
    );
    Ok(bytes)
}

// ============================================================================
// Package layout
// ============================================================================

struct ChapterFile {
    id: String,
    href: String,
    chapter: PreparedChapter,
}

struct PackagePlan<'a> {
    book: &'a Book,
    options: &'a EpubExportOptions,
    cover: Option<&'a CoverImage>,
    identifier: String,
    language: String,
    author: String,
    modified: String,
    chapters: Vec<ChapterFile>,
}

impl<'a> PackagePlan<'a> {
    fn new(
        book: &'a Book,
        prepared: Vec<PreparedChapter>,
        options: &'a EpubExportOptions,
        cover: Option<&'a CoverImage>,
    ) -> Self {
        let identifier = match uuid::Uuid::parse_str(&book.id) {
            Ok(uuid) => format!("urn:uuid:{uuid}"),
            Err(_) => format!("urn:scriptorium:book:{}", book.id),
        };
        let language = match book.language.trim() {
            "" => "en".to_string(),
            lang => lang.to_string(),
        };
        let author = match book.author_name.trim() {
            "" => UNKNOWN_AUTHOR.to_string(),
            name => name.to_string(),
        };
        let chapters = prepared
            .into_iter()
            .enumerate()
            .map(|(i, chapter)| ChapterFile {
                id: format!("chapter_{}", i + 1),
                href: format!("chapter_{}.xhtml", i + 1),
                chapter,
            })
            .collect();

        Self {
            book,
            options,
            cover,
            identifier,
            language,
            author,
            modified: book.updated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            chapters,
        }
    }

    fn cover_href(&self) -> Option<String> {
        self.cover
            .map(|cover| format!("images/cover.{}", cover.extension()))
    }

    fn write<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // mimetype must be first and uncompressed
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(self.opf().as_bytes())?;

        zip.start_file("OEBPS/toc.ncx", deflated)?;
        zip.write_all(self.ncx().as_bytes())?;

        zip.start_file("OEBPS/nav.xhtml", deflated)?;
        zip.write_all(self.nav().as_bytes())?;

        zip.start_file("OEBPS/style.css", deflated)?;
        zip.write_all(STYLESHEET.as_bytes())?;

        if let (Some(cover), Some(href)) = (self.cover, self.cover_href()) {
            // images are already compressed
            zip.start_file(format!("OEBPS/{href}"), stored)?;
            zip.write_all(&cover.data)?;

            zip.start_file("OEBPS/cover.xhtml", deflated)?;
            zip.write_all(self.cover_page(&href).as_bytes())?;
        }

        for file in &self.chapters {
            zip.start_file(format!("OEBPS/{}", file.href), deflated)?;
            zip.write_all(self.chapter_document(&file.chapter).as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    /// Spine order: cover page, frontmatter, navigation, everything else.
    fn spine(&self) -> Vec<&str> {
        let mut spine = Vec::new();
        if self.cover.is_some() {
            spine.push("cover");
        }
        spine.extend(
            self.chapters
                .iter()
                .filter(|f| f.chapter.is_frontmatter())
                .map(|f| f.id.as_str()),
        );
        if self.options.include_toc {
            spine.push("nav");
        }
        spine.extend(
            self.chapters
                .iter()
                .filter(|f| !f.chapter.is_frontmatter())
                .map(|f| f.id.as_str()),
        );
        spine
    }

    /// Chapters in reading order (frontmatter first), for TOC entries.
    fn reading_order(&self) -> impl Iterator<Item = &ChapterFile> {
        self.chapters
            .iter()
            .filter(|f| f.chapter.is_frontmatter())
            .chain(self.chapters.iter().filter(|f| !f.chapter.is_frontmatter()))
    }

    fn opf(&self) -> String {
        let book = self.book;
        let mut opf = String::new();

        opf.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId" xml:lang=""#,
        );
        opf.push_str(&escape(&self.language));
        opf.push_str(
            r#"">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
"#,
        );
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            escape(&self.identifier)
        ));
        opf.push_str(&format!(
            "    <dc:title id=\"title\">{}</dc:title>\n",
            escape(&book.title)
        ));
        if let Some(subtitle) = book.subtitle.as_deref().filter(|s| !s.trim().is_empty()) {
            opf.push_str(&format!(
                "    <dc:title id=\"subtitle\">{}</dc:title>\n",
                escape(subtitle)
            ));
            opf.push_str("    <meta refines=\"#title\" property=\"title-type\">main</meta>\n");
            opf.push_str(
                "    <meta refines=\"#subtitle\" property=\"title-type\">subtitle</meta>\n",
            );
        }
        opf.push_str(&format!(
            "    <dc:creator id=\"creator\">{}</dc:creator>\n",
            escape(&self.author)
        ));
        opf.push_str(
            "    <meta refines=\"#creator\" property=\"role\" scheme=\"marc:relators\">aut</meta>\n",
        );
        opf.push_str(&format!(
            "    <dc:language>{}</dc:language>\n",
            escape(&self.language)
        ));
        if let Some(description) = book.description.as_deref().filter(|s| !s.trim().is_empty()) {
            opf.push_str(&format!(
                "    <dc:description>{}</dc:description>\n",
                escape(description)
            ));
        }
        if let Some(genre) = book.genre.as_deref().filter(|s| !s.trim().is_empty()) {
            opf.push_str(&format!("    <dc:subject>{}</dc:subject>\n", escape(genre)));
        }
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            self.modified
        ));
        if self.cover.is_some() {
            // EPUB 2 readers locate the cover through this
            opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        }
        opf.push_str("  </metadata>\n");

        opf.push_str("  <manifest>\n");
        opf.push_str(
            "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
        );
        opf.push_str(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
        opf.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\"/>\n");
        if let (Some(cover), Some(href)) = (self.cover, self.cover_href()) {
            opf.push_str(&format!(
                "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
                href, cover.media_type
            ));
            opf.push_str(
                "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
        }
        for file in &self.chapters {
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                file.id, file.href
            ));
        }
        opf.push_str("  </manifest>\n");

        opf.push_str("  <spine toc=\"ncx\">\n");
        for idref in self.spine() {
            opf.push_str(&format!("    <itemref idref=\"{idref}\"/>\n"));
        }
        opf.push_str("  </spine>\n");

        if self.cover.is_some() || self.options.include_toc {
            opf.push_str("  <guide>\n");
            if self.cover.is_some() {
                opf.push_str("    <reference type=\"cover\" title=\"Cover\" href=\"cover.xhtml\"/>\n");
            }
            if self.options.include_toc {
                opf.push_str(
                    "    <reference type=\"toc\" title=\"Table of Contents\" href=\"nav.xhtml\"/>\n",
                );
            }
            opf.push_str("  </guide>\n");
        }

        opf.push_str("</package>\n");
        opf
    }

    fn ncx(&self) -> String {
        let mut ncx = String::new();
        ncx.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
        );
        ncx.push_str(&escape(&self.identifier));
        ncx.push_str(
            r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle><text>"#,
        );
        ncx.push_str(&escape(&self.book.title));
        ncx.push_str("</text></docTitle>\n  <docAuthor><text>");
        ncx.push_str(&escape(&self.author));
        ncx.push_str("</text></docAuthor>\n  <navMap>\n");

        for (i, file) in self.reading_order().enumerate() {
            let play_order = i + 1;
            ncx.push_str(&format!(
                "    <navPoint id=\"navPoint-{play_order}\" playOrder=\"{play_order}\">\n"
            ));
            ncx.push_str(&format!(
                "      <navLabel><text>{}</text></navLabel>\n",
                escape(&file.chapter.display_title)
            ));
            ncx.push_str(&format!("      <content src=\"{}\"/>\n", file.href));
            ncx.push_str("    </navPoint>\n");
        }

        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }

    fn nav(&self) -> String {
        let mut body = String::from("<nav epub:type=\"toc\" id=\"toc\" role=\"doc-toc\">\n");
        body.push_str("<h1>Contents</h1>\n<ol>\n");
        for file in self.reading_order() {
            body.push_str(&format!(
                "<li><a href=\"{}\">{}</a></li>\n",
                file.href,
                escape(&file.chapter.display_title)
            ));
        }
        body.push_str("</ol>\n</nav>\n");

        body.push_str("<nav epub:type=\"landmarks\" id=\"landmarks\" hidden=\"hidden\">\n<ol>\n");
        if self.cover.is_some() {
            body.push_str("<li><a epub:type=\"cover\" href=\"cover.xhtml\">Cover</a></li>\n");
        }
        body.push_str("<li><a epub:type=\"toc\" href=\"nav.xhtml\">Contents</a></li>\n");
        if let Some(first) = self.reading_order().find(|f| !f.chapter.is_frontmatter()) {
            body.push_str(&format!(
                "<li><a epub:type=\"bodymatter\" href=\"{}\">Start</a></li>\n",
                first.href
            ));
        }
        body.push_str("</ol>\n</nav>\n");

        self.document("Contents", &body)
    }

    fn cover_page(&self, image_href: &str) -> String {
        let body = format!(
            "<section class=\"cover\" epub:type=\"cover\">\n<img src=\"{}\" alt=\"{}\" />\n</section>\n",
            image_href,
            escape(&self.book.title)
        );
        self.document("Cover", &body)
    }

    fn chapter_document(&self, chapter: &PreparedChapter) -> String {
        let mut body = format!(
            "<section class=\"chapter {kind}\" epub:type=\"{epub_type}\">\n",
            kind = chapter.chapter_type.as_str(),
            epub_type = epub_type(chapter.chapter_type),
        );
        if self.options.prepend_titles {
            body.push_str(&format!(
                "<h1 class=\"chapter-title\">{}</h1>\n",
                escape(&chapter.display_title)
            ));
        }
        body.push_str(&to_xhtml(&chapter.html));
        body.push_str("\n</section>\n");
        self.document(&chapter.display_title, &body)
    }

    fn document(&self, title: &str, body: &str) -> String {
        let lang = escape(&self.language);
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">
<head>
<meta charset="UTF-8" />
<title>{title}</title>
<link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
{body}</body>
</html>
"#,
            title = escape(title),
        )
    }
}

/// Structural semantics for a chapter type.
fn epub_type(chapter_type: ChapterType) -> &'static str {
    match chapter_type {
        ChapterType::Chapter => "chapter",
        ChapterType::Prologue => "prologue",
        ChapterType::Epilogue => "epilogue",
        ChapterType::Part => "part",
        ChapterType::Frontmatter => "frontmatter",
        ChapterType::Backmatter => "backmatter",
    }
}
