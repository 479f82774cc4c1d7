//! Content sanitizer: editor HTML to portable HTML.
//!
//! The editor stores chapter bodies with inline footnote markers, custom
//! scene-break blocks, editor-internal classes and `data-*` attributes.
//! [`sanitize`] rewrites that markup into plain HTML that every export target
//! can consume, and collects the footnotes in document order.
//!
//! Steps run in a fixed order; later steps assume earlier normalization:
//!
//! 1. Footnote markers become visible text plus a numbered reference link
//! 2. Scene-break blocks become `<hr class="scene-break" />`
//! 3. Editor-internal class tokens are removed
//! 4. Empty class attributes are removed
//! 5. Internal `data-*` attributes are removed
//! 6. Highlight colors move into an inline `background-color` on `<mark>`
//!
//! Sanitizing already-sanitized output changes nothing.

use regex_lite::{Captures, NoExpand};

use crate::patterns::{
    CLASS_ATTR_RE, DATA_ATTR_RE, DATA_COLOR_ATTR_RE, FOOTNOTE_CONTENT_ATTR_RE,
    FOOTNOTE_ID_ATTR_RE, FOOTNOTE_MARKER_RE, SCENE_BREAK_BLOCK_RE, SCENE_BREAK_VOID_RE,
    START_TAG_RE, STYLE_ATTR_RE,
};

/// Class token prefixes that only mean something inside the editor.
const EDITOR_CLASS_PREFIXES: &[&str] = &["editor-", "ProseMirror"];

const SCENE_BREAK_HTML: &str = r#"<hr class="scene-break" />"#;

/// A footnote extracted from a chapter body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footnote {
    /// Editor-assigned marker id, or `fn-N` when the marker had none
    pub id: String,
    /// Note text as stored on the marker (already HTML-escaped)
    pub content: String,
    /// 1-based position in document order
    pub number: usize,
}

/// Sanitized chapter body plus its footnotes in document order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SanitizedContent {
    pub html: String,
    pub footnotes: Vec<Footnote>,
}

/// Sanitize one chapter body.
///
/// ```
/// use scriptorium::sanitize::sanitize;
///
/// let out = sanitize(r#"<p class="editor-paragraph">Hi<span data-footnote-content="Note">!</span></p>"#);
/// assert_eq!(out.footnotes.len(), 1);
/// assert!(out.html.starts_with("<p>Hi!<sup"));
/// ```
pub fn sanitize(html: &str) -> SanitizedContent {
    sanitize_scoped(html, "")
}

/// Sanitize with `prefix` prepended to every footnote anchor id.
///
/// Documents that hold several chapters (print output) give each chapter its
/// own prefix so anchor ids stay unique.
pub fn sanitize_scoped(html: &str, prefix: &str) -> SanitizedContent {
    let (html, footnotes) = extract_footnotes(html, prefix);
    let html = replace_scene_breaks(&html);
    let html = strip_editor_classes(&html);
    let html = remove_empty_class_attrs(&html);
    let html = strip_data_attributes(&html);
    let html = normalize_highlights(&html);
    SanitizedContent { html, footnotes }
}

/// Render the endnotes block for a chapter; empty when there are no notes.
pub fn render_endnotes(footnotes: &[Footnote], prefix: &str) -> String {
    if footnotes.is_empty() {
        return String::new();
    }

    let mut out = String::from(
        r#"<section class="endnotes" epub:type="endnotes" role="doc-endnotes"><h2>Notes</h2><ol>"#,
    );
    for note in footnotes {
        out.push_str(&format!(
            r##"<li id="{prefix}fn-{n}" epub:type="endnote">{content} <a href="#{prefix}fnref-{n}" class="footnote-backref">&#8617;</a></li>"##,
            n = note.number,
            content = note.content,
        ));
    }
    out.push_str("</ol></section>");
    out
}

/// Sanitized body with its endnotes appended. This is what export targets embed.
pub fn prepare_chapter_html(html: &str) -> String {
    prepare_chapter_html_scoped(html, "")
}

pub fn prepare_chapter_html_scoped(html: &str, prefix: &str) -> String {
    let SanitizedContent { mut html, footnotes } = sanitize_scoped(html, prefix);
    html.push_str(&render_endnotes(&footnotes, prefix));
    html
}

// ============================================================================
// Steps
// ============================================================================

fn extract_footnotes(html: &str, prefix: &str) -> (String, Vec<Footnote>) {
    let mut footnotes = Vec::new();
    let html = FOOTNOTE_MARKER_RE
        .replace_all(html, |caps: &Captures| {
            let attrs = &caps[1];
            let number = footnotes.len() + 1;
            let content = FOOTNOTE_CONTENT_ATTR_RE
                .captures(attrs)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let id = FOOTNOTE_ID_ATTR_RE
                .captures(attrs)
                .map(|c| c[1].to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("fn-{number}"));
            footnotes.push(Footnote {
                id,
                content,
                number,
            });
            format!(
                r##"{visible}<sup class="footnote-ref"><a href="#{prefix}fn-{number}" id="{prefix}fnref-{number}" epub:type="noteref">{number}</a></sup>"##,
                visible = &caps[2],
            )
        })
        .into_owned();
    (html, footnotes)
}

fn replace_scene_breaks(html: &str) -> String {
    let html = SCENE_BREAK_BLOCK_RE.replace_all(html, SCENE_BREAK_HTML);
    SCENE_BREAK_VOID_RE
        .replace_all(&html, SCENE_BREAK_HTML)
        .into_owned()
}

fn is_editor_class(token: &str) -> bool {
    EDITOR_CLASS_PREFIXES
        .iter()
        .any(|prefix| token.starts_with(prefix))
}

/// Apply `f(tag_name, tag_text)` to every start tag.
fn rewrite_start_tags(html: &str, mut f: impl FnMut(&str, &str) -> String) -> String {
    START_TAG_RE
        .replace_all(html, |caps: &Captures| f(&caps[1], &caps[0]))
        .into_owned()
}

fn strip_editor_classes(html: &str) -> String {
    rewrite_start_tags(html, |_, tag| {
        CLASS_ATTR_RE
            .replace(tag, |caps: &Captures| {
                let kept: Vec<&str> = caps[1]
                    .split_whitespace()
                    .filter(|token| !is_editor_class(token))
                    .collect();
                format!(r#" class="{}""#, kept.join(" "))
            })
            .into_owned()
    })
}

fn remove_empty_class_attrs(html: &str) -> String {
    rewrite_start_tags(html, |_, tag| {
        CLASS_ATTR_RE
            .replace(tag, |caps: &Captures| {
                if caps[1].trim().is_empty() {
                    String::new()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    })
}

fn strip_data_attributes(html: &str) -> String {
    rewrite_start_tags(html, |name, tag| {
        let is_mark = name.eq_ignore_ascii_case("mark");
        DATA_ATTR_RE
            .replace_all(tag, |caps: &Captures| {
                if is_mark && &caps[1] == "color" {
                    caps[0].to_string()
                } else {
                    String::new()
                }
            })
            .into_owned()
    })
}

fn normalize_highlights(html: &str) -> String {
    rewrite_start_tags(html, |name, tag| {
        if !name.eq_ignore_ascii_case("mark") {
            return tag.to_string();
        }
        let Some(color) = DATA_COLOR_ATTR_RE
            .captures(tag)
            .map(|caps| safe_color(&caps[1]))
        else {
            return tag.to_string();
        };

        let tag = DATA_COLOR_ATTR_RE.replace(tag, "").into_owned();
        if color.is_empty() {
            return tag;
        }

        let existing = STYLE_ATTR_RE
            .captures(&tag)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let mut declarations: Vec<String> = existing
            .split(';')
            .map(str::trim)
            .filter(|decl| !decl.is_empty())
            .filter(|decl| {
                decl.split(':')
                    .next()
                    .is_none_or(|prop| !prop.trim().eq_ignore_ascii_case("background-color"))
            })
            .map(str::to_string)
            .collect();
        declarations.push(format!("background-color: {color}"));
        let style = format!(r#" style="{};""#, declarations.join("; "));

        if STYLE_ATTR_RE.is_match(&tag) {
            STYLE_ATTR_RE.replace(&tag, NoExpand(&style)).into_owned()
        } else {
            let end = tag.len() - if tag.ends_with("/>") { 2 } else { 1 };
            format!("{}{}{}", tag[..end].trim_end(), style, &tag[end..])
        }
    })
}

/// Keep only characters that can appear in a CSS color value.
fn safe_color(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || "#(),.% -".contains(*c))
        .collect::<String>()
        .trim()
        .to_string()
}
