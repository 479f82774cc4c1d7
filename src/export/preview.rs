//! On-screen pagination preview of the print document.
//!
//! The print document is split into discrete pages for proofing before it is
//! sent to a print engine. Page geometry comes from preview-only styles held
//! in a [`StyleRegistry`]; every render tears the registry down first, so an
//! option change (page size, TOC toggle) never leaves rules from the previous
//! render behind.

use std::collections::BTreeMap;

use quick_xml::escape::escape;

use super::cover::CoverImage;
use super::print::{generate_print_html, print_stylesheet};
use super::{PageSize, PrintExportOptions};
use crate::error::Result;
use crate::model::{Book, Chapter};
use crate::patterns::{
    ANY_TAG_RE, BODY_RE, CHAPTER_GROUP_RE, COVER_GROUP_RE, TAG_TOKEN_RE, TOC_GROUP_RE,
};

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: usize,
    pub html: String,
}

/// Result of a preview render.
#[derive(Debug, Clone, PartialEq)]
pub struct Preview {
    pub page_size: PageSize,
    pub pages: Vec<Page>,
    /// Document stylesheet shared with the print output
    pub stylesheet: String,
    /// Preview-only rules injected for this render
    pub styles: Vec<String>,
}

impl Preview {
    /// Standalone HTML document showing every page in sequence.
    pub fn to_html(&self, title: &str) -> String {
        let mut out = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        out.push_str(&format!("<title>{} (preview)</title>\n<style>\n", escape(title)));
        out.push_str(&self.stylesheet);
        for rule in &self.styles {
            out.push_str(rule);
            out.push('\n');
        }
        out.push_str("</style>\n</head>\n<body class=\"preview\">\n");
        for page in &self.pages {
            out.push_str(&format!(
                "<div class=\"preview-page\" data-page=\"{}\">\n{}\n<div class=\"preview-folio\">{}</div>\n</div>\n",
                page.number, page.html, page.number
            ));
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

/// Splits a print document into pages.
pub trait Paginator: Send + Sync {
    fn paginate(&self, document: &str, page_size: PageSize) -> Vec<Page>;
}

/// Block-flow paginator.
///
/// Each cover, contents and chapter section starts a new page. Inside a
/// section, top-level blocks are packed onto pages by an estimated line count
/// derived from the page geometry. A heading is never left as the last block
/// of a page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowPaginator {
    /// Average glyph advance
    pub char_width_mm: f32,
    pub line_height_mm: f32,
}

impl Default for FlowPaginator {
    fn default() -> Self {
        // 11pt serif body at 1.45 line height
        Self {
            char_width_mm: 1.95,
            line_height_mm: 5.6,
        }
    }
}

impl FlowPaginator {
    /// Characters per line and lines per page for a page size.
    pub fn capacity(&self, page_size: PageSize) -> (usize, usize) {
        let (width, height) = page_size.dimensions_mm();
        let margin = page_size.margin_mm();
        let text_width = (width - 2.0 * margin).max(self.char_width_mm);
        let text_height = (height - 2.0 * margin).max(self.line_height_mm);
        let chars = (text_width / self.char_width_mm).floor() as usize;
        let lines = (text_height / self.line_height_mm).floor() as usize;
        (chars.max(1), lines.max(1))
    }

    fn block_lines(&self, block: &Block<'_>, chars_per_line: usize, lines_per_page: usize) -> usize {
        if block.has_image {
            return lines_per_page / 2;
        }
        let chars = ANY_TAG_RE.replace_all(block.html, "").trim().chars().count();
        let lines = chars.div_ceil(chars_per_line).max(1);
        if block.is_heading { lines * 2 + 1 } else { lines }
    }
}

impl Paginator for FlowPaginator {
    fn paginate(&self, document: &str, page_size: PageSize) -> Vec<Page> {
        let body = BODY_RE
            .captures(document)
            .and_then(|caps| caps.get(1))
            .map_or(document, |m| m.as_str());
        let (chars_per_line, lines_per_page) = self.capacity(page_size);

        let mut pages = Vec::new();
        for group in groups(body) {
            let mut current: Vec<Block<'_>> = Vec::new();
            let mut used = 0;
            for block in split_blocks(group.inner) {
                let lines = self.block_lines(&block, chars_per_line, lines_per_page);
                if !current.is_empty() && used + lines > lines_per_page {
                    let carried = match current.last() {
                        Some(last) if last.is_heading && current.len() > 1 => current.pop(),
                        _ => None,
                    };
                    pages.push(group.wrap(&current));
                    current.clear();
                    used = 0;
                    if let Some(heading) = carried {
                        used += self.block_lines(&heading, chars_per_line, lines_per_page);
                        current.push(heading);
                    }
                }
                used += lines;
                current.push(block);
            }
            pages.push(group.wrap(&current));
        }

        pages
            .into_iter()
            .enumerate()
            .map(|(index, html)| Page {
                number: index + 1,
                html,
            })
            .collect()
    }
}

/// A top-level section of the print document.
struct Group<'a> {
    start: usize,
    open: &'a str,
    inner: &'a str,
    close: &'a str,
}

impl Group<'_> {
    fn wrap(&self, blocks: &[Block<'_>]) -> String {
        let mut html = String::from(self.open);
        for block in blocks {
            html.push_str(block.html);
        }
        html.push_str(self.close);
        html
    }
}

fn groups(body: &str) -> Vec<Group<'_>> {
    let mut found: Vec<Group<'_>> = [&*COVER_GROUP_RE, &*TOC_GROUP_RE, &*CHAPTER_GROUP_RE]
        .into_iter()
        .flat_map(|re| re.captures_iter(body))
        .filter_map(|caps| {
            let open = caps.get(1)?;
            Some(Group {
                start: open.start(),
                open: open.as_str(),
                inner: caps.get(2)?.as_str(),
                close: caps.get(3)?.as_str(),
            })
        })
        .collect();
    found.sort_by_key(|g| g.start);
    found
}

struct Block<'a> {
    html: &'a str,
    is_heading: bool,
    has_image: bool,
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Split section content at top-level element boundaries.
fn split_blocks(inner: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut block_start = 0;
    let mut first_tag: Option<String> = None;
    let mut has_image = false;

    for caps in TAG_TOKEN_RE.captures_iter(inner) {
        let Some(token) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let self_closed = !caps[3].is_empty() || VOID_TAGS.contains(&name.as_str());

        if name == "img" {
            has_image = true;
        }
        if depth == 0 && !closing && first_tag.is_none() {
            first_tag = Some(name.clone());
        }

        if closing {
            depth = depth.saturating_sub(1);
        } else if !self_closed {
            depth += 1;
        }

        if depth == 0 {
            let html = inner[block_start..token.end()].trim();
            if !html.is_empty() {
                blocks.push(Block {
                    html,
                    is_heading: first_tag.as_deref().is_some_and(is_heading_tag),
                    has_image,
                });
            }
            block_start = token.end();
            first_tag = None;
            has_image = false;
        }
    }

    let rest = inner[block_start..].trim();
    if !rest.is_empty() {
        blocks.push(Block {
            html: rest,
            is_heading: false,
            has_image,
        });
    }
    blocks
}

fn is_heading_tag(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "header")
}

/// Named preview-only style rules.
#[derive(Debug, Clone, Default)]
pub struct StyleRegistry {
    rules: BTreeMap<&'static str, String>,
}

impl StyleRegistry {
    pub fn inject(&mut self, key: &'static str, css: String) {
        self.rules.insert(key, css);
    }

    /// Remove every injected rule, returning how many were removed.
    pub fn teardown(&mut self) -> usize {
        let removed = self.rules.len();
        self.rules.clear();
        removed
    }

    pub fn rules(&self) -> Vec<String> {
        self.rules.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Renders print previews, re-rendering from scratch on every call.
pub struct PreviewRenderer<P = FlowPaginator> {
    paginator: P,
    styles: StyleRegistry,
}

impl Default for PreviewRenderer<FlowPaginator> {
    fn default() -> Self {
        Self::new(FlowPaginator::default())
    }
}

impl<P: Paginator> PreviewRenderer<P> {
    pub fn new(paginator: P) -> Self {
        Self {
            paginator,
            styles: StyleRegistry::default(),
        }
    }

    /// Styles currently injected by the last render.
    pub fn injected_styles(&self) -> &StyleRegistry {
        &self.styles
    }

    pub fn render(
        &mut self,
        book: &Book,
        chapters: &[Chapter],
        options: &PrintExportOptions,
        cover: Option<&CoverImage>,
    ) -> Result<Preview> {
        let removed = self.styles.teardown();
        tracing::debug!(removed, page_size = %options.page_size, "rendering preview");

        let document = generate_print_html(book, chapters, options, cover)?;
        self.styles.inject("page", page_style(options.page_size));
        self.styles.inject("sheet", SHEET_STYLE.to_string());

        let pages = self.paginator.paginate(&document, options.page_size);
        Ok(Preview {
            page_size: options.page_size,
            pages,
            stylesheet: print_stylesheet(options),
            styles: self.styles.rules(),
        })
    }
}

const SHEET_STYLE: &str = "body.preview { background: #e5e5e5; margin: 0; padding: 16px 0; }";

fn page_style(size: PageSize) -> String {
    let (width, height) = size.dimensions_mm();
    format!(
        ".preview-page {{ box-sizing: border-box; width: {width}mm; height: {height}mm; \
         padding: {margin}mm; margin: 0 auto 12px; overflow: hidden; position: relative; \
         background: #fff; box-shadow: 0 1px 4px rgba(0, 0, 0, 0.3); }}\n\
         .preview-folio {{ position: absolute; bottom: {folio}mm; left: 0; right: 0; \
         text-align: center; font-size: 9pt; }}",
        margin = size.margin_mm(),
        folio = size.margin_mm() / 2.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChapterType;
    use crate::util;

    fn book() -> Book {
        Book {
            id: "b".into(),
            title: "Proof".into(),
            subtitle: None,
            author_name: "Ann".into(),
            description: None,
            genre: None,
            language: "en".into(),
            cover_path: None,
            cover_image: None,
            word_count: 0,
            target_word_count: None,
            status: Default::default(),
            created_at: util::now(),
            updated_at: util::now(),
            last_opened_at: None,
            last_chapter_id: None,
        }
    }

    fn chapter(title: &str, order: i64, content: String) -> Chapter {
        Chapter {
            id: title.into(),
            book_id: "b".into(),
            title: title.into(),
            content: Some(content),
            synopsis: None,
            order,
            parent_id: None,
            chapter_type: ChapterType::Chapter,
            word_count: 0,
            status: Default::default(),
            is_included_in_export: true,
            created_at: util::now(),
            updated_at: util::now(),
        }
    }

    fn long_text(paragraphs: usize) -> String {
        let sentence = "The quick brown fox jumps over the lazy dog again and again. ";
        (0..paragraphs)
            .map(|_| format!("<p>{}</p>", sentence.repeat(6)))
            .collect()
    }

    #[test]
    fn test_each_section_starts_a_page() {
        let chapters = [
            chapter("One", 0, "<p>short</p>".into()),
            chapter("Two", 1, "<p>short</p>".into()),
        ];
        let mut renderer = PreviewRenderer::<FlowPaginator>::default();
        let preview = renderer
            .render(&book(), &chapters, &PrintExportOptions::default(), None)
            .unwrap();
        // cover, contents, two chapters
        assert_eq!(preview.pages.len(), 4);
        assert!(preview.pages[0].html.starts_with("<section class=\"cover\">"));
        assert!(preview.pages[1].html.starts_with("<nav class=\"toc\">"));
        assert!(preview.pages[3].html.contains("Two"));
        assert_eq!(preview.pages[3].number, 4);
    }

    #[test]
    fn test_long_chapter_spans_pages_with_balanced_wrappers() {
        let chapters = [chapter("Long", 0, long_text(40))];
        let options = PrintExportOptions {
            include_toc: false,
            ..Default::default()
        };
        let preview = PreviewRenderer::<FlowPaginator>::default()
            .render(&book(), &chapters, &options, None)
            .unwrap();
        assert!(preview.pages.len() > 3);
        for page in &preview.pages[1..] {
            assert!(page.html.starts_with("<article"));
            assert!(page.html.ends_with("</article>"));
            assert_eq!(page.html.matches("<p").count(), page.html.matches("</p>").count());
        }
    }

    #[test]
    fn test_smaller_pages_produce_more_pages() {
        let chapters = [chapter("Long", 0, long_text(40))];
        let mut renderer = PreviewRenderer::<FlowPaginator>::default();
        let a4 = renderer
            .render(
                &book(),
                &chapters,
                &PrintExportOptions {
                    page_size: PageSize::A4,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let digest = renderer
            .render(
                &book(),
                &chapters,
                &PrintExportOptions {
                    page_size: PageSize::Digest,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert!(digest.pages.len() > a4.pages.len());
    }

    #[test]
    fn test_rerender_tears_down_previous_styles() {
        let chapters = [chapter("One", 0, "<p>x</p>".into())];
        let mut renderer = PreviewRenderer::<FlowPaginator>::default();
        let a4 = renderer
            .render(
                &book(),
                &chapters,
                &PrintExportOptions {
                    page_size: PageSize::A4,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        assert!(a4.styles.iter().any(|s| s.contains("width: 210mm")));

        let a5 = renderer
            .render(&book(), &chapters, &PrintExportOptions::default(), None)
            .unwrap();
        assert_eq!(a5.styles.len(), 2);
        assert!(a5.styles.iter().all(|s| !s.contains("width: 210mm")));
        assert!(a5.styles.iter().any(|s| s.contains("width: 148mm")));
    }

    #[test]
    fn test_failed_render_leaves_no_stale_styles() {
        let mut renderer = PreviewRenderer::<FlowPaginator>::default();
        renderer
            .render(
                &book(),
                &[chapter("One", 0, "<p>x</p>".into())],
                &PrintExportOptions::default(),
                None,
            )
            .unwrap();
        assert!(!renderer.injected_styles().is_empty());

        let mut hidden = chapter("Hidden", 0, "<p>x</p>".into());
        hidden.is_included_in_export = false;
        assert!(
            renderer
                .render(&book(), &[hidden], &PrintExportOptions::default(), None)
                .is_err()
        );
        assert!(renderer.injected_styles().is_empty());
    }

    #[test]
    fn test_blocks_split_at_top_level() {
        let blocks = split_blocks("<h2>A</h2><p>one</p><ol><li>x</li><li>y</li></ol><hr class=\"scene-break\" />tail");
        let html: Vec<_> = blocks.iter().map(|b| b.html).collect();
        assert_eq!(
            html,
            [
                "<h2>A</h2>",
                "<p>one</p>",
                "<ol><li>x</li><li>y</li></ol>",
                "<hr class=\"scene-break\" />",
                "tail"
            ]
        );
        assert!(blocks[0].is_heading);
        assert!(!blocks[1].is_heading);
    }

    #[test]
    fn test_preview_document_is_standalone() {
        let preview = PreviewRenderer::<FlowPaginator>::default()
            .render(
                &book(),
                &[chapter("One", 0, "<p>x</p>".into())],
                &PrintExportOptions::default(),
                None,
            )
            .unwrap();
        let html = preview.to_html("Proof");
        assert!(html.contains("data-page=\"1\""));
        assert!(html.contains(".preview-page"));
        assert!(!html.contains("<link"));
        assert!(!html.contains("<script"));
    }
}
