use proptest::prelude::*;

use scriptorium::sanitize::{prepare_chapter_html, sanitize, sanitize_scoped};

fn color() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("#ffeb3b".to_string()),
        Just("rgb(255, 0, 0)".to_string()),
        Just("yellow".to_string()),
    ]
}

/// Editor markup the sanitizer sees in practice.
fn fragment() -> impl Strategy<Value = String> {
    let word = "[a-zA-Z]{1,8}";
    prop_oneof![
        word.prop_map(|w| format!("<p>{w}</p>")),
        word.prop_map(|w| format!(r#"<p class="editor-paragraph">{w}</p>"#)),
        (word, word).prop_map(|(a, b)| format!(r#"<p class="editor-p lead">{a} <em data-node="1">{b}</em></p>"#)),
        (word, word).prop_map(|(text, note)| {
            format!(r#"<span data-footnote-content="{note}">{text}</span>"#)
        }),
        (word, word, "[a-z0-9]{1,6}").prop_map(|(text, note, id)| {
            format!(r#"<span data-footnote-id="{id}" data-footnote-content="{note}">{text}</span>"#)
        }),
        Just(r#"<div data-type="scene-break"><span>* * *</span></div>"#.to_string()),
        Just(r#"<hr data-type="scene-break">"#.to_string()),
        (word, color()).prop_map(|(w, c)| format!(r#"<mark data-color="{c}">{w}</mark>"#)),
        (word, color()).prop_map(|(w, c)| {
            format!(r#"<mark class="editor-highlight" style="font-weight: bold" data-color="{c}">{w}</mark>"#)
        }),
        Just(r#"<img src="a.png" data-id="3"><br>"#.to_string()),
    ]
}

fn document() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment(), 0..12).prop_map(|parts| parts.concat())
}

proptest! {
    #[test]
    fn prop_sanitize_is_idempotent(html in document()) {
        let once = sanitize(&html).html;
        let twice = sanitize(&once);
        prop_assert_eq!(&twice.html, &once);
        prop_assert!(twice.footnotes.is_empty());
    }

    #[test]
    fn prop_output_has_no_editor_residue(html in document()) {
        let out = sanitize(&html).html;
        prop_assert!(!out.contains("data-"));
        prop_assert!(!out.contains("editor-"));
        prop_assert!(!out.contains("class=\"\""));
    }

    #[test]
    fn prop_footnotes_numbered_sequentially(html in document()) {
        let markers = html.matches("data-footnote-content").count();
        let out = sanitize(&html);
        prop_assert_eq!(out.footnotes.len(), markers);
        for (index, note) in out.footnotes.iter().enumerate() {
            prop_assert_eq!(note.number, index + 1);
            let reference = format!(r##"<a href="#fn-{0}" id="fnref-{0}" epub:type="noteref">{0}</a>"##, index + 1);
            prop_assert!(out.html.contains(&reference));
        }

        let prepared = prepare_chapter_html(&html);
        prop_assert_eq!(prepared.matches("<li id=\"fn-").count(), markers);
        prop_assert_eq!(markers > 0, prepared.contains("epub:type=\"endnotes\""));
        for number in 1..=markers {
            let opening = format!(r#"<li id="fn-{number}" epub:type="endnote">"#);
            let start = prepared.find(&opening);
            prop_assert!(start.is_some(), "missing endnote {}", number);
            let item = &prepared[start.unwrap()..];
            let item = &item[..item.find("</li>").unwrap()];
            let backref = format!(r##"href="#fnref-{number}""##);
            prop_assert!(item.contains(&backref), "endnote {} has no back-link", number);
        }
    }
}

#[test]
fn test_chapter_with_notes_scene_break_and_highlight() {
    let html = concat!(
        r#"<p class="editor-paragraph">It began<span data-footnote-content="In spring." data-footnote-id="a1">.</span></p>"#,
        r#"<div data-type="scene-break"><span>* * *</span></div>"#,
        r##"<p>Later, <mark data-color="#ffeb3b">much</mark> later<span data-footnote-content="Or so.">!</span></p>"##,
    );
    let expected = concat!(
        r##"<p>It began.<sup class="footnote-ref"><a href="#fn-1" id="fnref-1" epub:type="noteref">1</a></sup></p>"##,
        r#"<hr class="scene-break" />"#,
        r##"<p>Later, <mark style="background-color: #ffeb3b;">much</mark> later!<sup class="footnote-ref"><a href="#fn-2" id="fnref-2" epub:type="noteref">2</a></sup></p>"##,
        r#"<section class="endnotes" epub:type="endnotes" role="doc-endnotes"><h2>Notes</h2><ol>"#,
        r##"<li id="fn-1" epub:type="endnote">In spring. <a href="#fnref-1" class="footnote-backref">&#8617;</a></li>"##,
        r##"<li id="fn-2" epub:type="endnote">Or so. <a href="#fnref-2" class="footnote-backref">&#8617;</a></li>"##,
        "</ol></section>",
    );
    assert_eq!(prepare_chapter_html(html), expected);
}

#[test]
fn test_numbering_restarts_per_chapter() {
    let chapter = r#"<p>x<span data-footnote-content="n">.</span></p>"#;
    let first = sanitize_scoped(chapter, "ch1-");
    let second = sanitize_scoped(chapter, "ch2-");
    assert_eq!(first.footnotes[0].number, 1);
    assert_eq!(second.footnotes[0].number, 1);
    assert_ne!(first.html, second.html);
}

#[test]
fn test_empty_and_plain_input() {
    assert_eq!(prepare_chapter_html(""), "");
    assert_eq!(
        prepare_chapter_html("<p>Nothing to do &amp; nothing changes.</p>"),
        "<p>Nothing to do &amp; nothing changes.</p>"
    );
}
