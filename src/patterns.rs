//! Cached regex patterns for content processing.
//!
//! Uses LazyLock to compile patterns once on first use.

use regex_lite::Regex;
use std::sync::LazyLock;

// === Markup ===

/// Matches any markup tag (used for word counting)
pub static ANY_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());

/// Matches an opening or self-closing element tag, capturing the tag name
pub static START_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-zA-Z][a-zA-Z0-9]*)\b[^>]*>").unwrap());

/// Non-breaking space entities, treated as whitespace for word counting
pub static NBSP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&nbsp;|&#160;|&#xa0;|&#xA0;").unwrap());

// === Sanitizer ===

/// Matches an inline footnote marker span in either attribute order
pub static FOOTNOTE_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<span\b([^>]*\bdata-footnote-content\s*=\s*"[^"]*"[^>]*)>(.*?)</span>"#)
        .unwrap()
});

/// Captures the footnote text attribute value
pub static FOOTNOTE_CONTENT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bdata-footnote-content\s*=\s*"([^"]*)""#).unwrap());

/// Captures the footnote internal id attribute value
pub static FOOTNOTE_ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bdata-footnote-id\s*=\s*"([^"]*)""#).unwrap());

/// Matches a scene break block written as an element pair (any decorative children)
pub static SCENE_BREAK_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div\b[^>]*\bdata-type\s*=\s*"scene-break"[^>/]*>.*?</div>"#).unwrap()
});

/// Matches a scene break written as a void / self-closing element
pub static SCENE_BREAK_VOID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(?:hr|div)\b[^>]*\bdata-type\s*=\s*"scene-break"[^>]*/?>"#).unwrap()
});

/// Captures a class attribute value
pub static CLASS_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+class\s*=\s*"([^"]*)""#).unwrap());

/// Captures a style attribute value
pub static STYLE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+style\s*=\s*"([^"]*)""#).unwrap());

/// Captures any data-* attribute (name without prefix, optional value)
pub static DATA_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s+data-([a-zA-Z0-9_-]+)(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>"']+))?"#).unwrap()
});

/// Captures the highlight color stored on a mark element
pub static DATA_COLOR_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s+data-color\s*=\s*"([^"]*)""#).unwrap());

// === Filenames ===

/// Characters invalid in filenames on common filesystems
pub static INVALID_FILENAME_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).unwrap());

/// Runs of whitespace
pub static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// === Preview ===

/// Captures the content of the document body
pub static BODY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<body\b[^>]*>(.*)</body>").unwrap());

/// Cover section of a print document
pub static COVER_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)(<section class="cover"[^>]*>)(.*?)(</section>)"#).unwrap()
});

/// Contents section of a print document
pub static TOC_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)(<nav class="toc"[^>]*>)(.*?)(</nav>)"#).unwrap());

/// Chapter section of a print document
pub static CHAPTER_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)(<article\b[^>]*>)(.*?)(</article>)").unwrap());

/// Any start, end or self-closing tag: (slash, name, self-close slash)
pub static TAG_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)\b[^>]*?(/?)>").unwrap());
