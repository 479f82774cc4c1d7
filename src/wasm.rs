//! WASM bindings for browser-side publishing.
//!
//! Exposes the pure pipeline (sanitizer, print document, EPUB packaging) to
//! JavaScript via wasm-bindgen. Inputs are JSON-encoded [`Book`] and
//! [`Chapter`] values; covers must be embedded as data URIs.

use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use crate::export::cover::resolve_embedded_cover;
use crate::export::{EpubExportOptions, PrintExportOptions, generate_print_html, package_epub};
use crate::model::{Book, Chapter};

/// Initialize panic hook for better error messages in the browser console.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse<T: DeserializeOwned>(json: &str) -> Result<T, JsValue> {
    serde_json::from_str(json).map_err(js_error)
}

/// Options default when `json` is empty.
fn parse_options<T: DeserializeOwned + Default>(json: &str) -> Result<T, JsValue> {
    if json.trim().is_empty() {
        Ok(T::default())
    } else {
        parse(json)
    }
}

/// Sanitize a chapter body and append its endnotes.
#[wasm_bindgen]
pub fn sanitize_html(html: &str) -> String {
    crate::sanitize::prepare_chapter_html(html)
}

/// Count words in a chapter body.
#[wasm_bindgen]
pub fn word_count(html: &str) -> u32 {
    u32::try_from(crate::model::word_count(html)).unwrap_or(u32::MAX)
}

/// Build the print document.
///
/// Takes book, chapter list and print options as JSON and returns HTML.
#[wasm_bindgen]
pub fn print_html(book: &str, chapters: &str, options: &str) -> Result<String, JsValue> {
    let book: Book = parse(book)?;
    let chapters: Vec<Chapter> = parse(chapters)?;
    let options: PrintExportOptions = parse_options(options)?;

    let mut warnings = Vec::new();
    let cover = resolve_embedded_cover(&book, &mut warnings);
    generate_print_html(&book, &chapters, &options, cover.as_ref()).map_err(js_error)
}

/// Build an EPUB package.
///
/// Takes book, chapter list and EPUB options as JSON and returns EPUB bytes.
#[wasm_bindgen]
pub fn epub_package(book: &str, chapters: &str, options: &str) -> Result<Vec<u8>, JsValue> {
    let book: Book = parse(book)?;
    let chapters: Vec<Chapter> = parse(chapters)?;
    let options: EpubExportOptions = parse_options(options)?;

    let mut warnings = Vec::new();
    let cover = resolve_embedded_cover(&book, &mut warnings);
    package_epub(&book, &chapters, &options, cover.as_ref()).map_err(js_error)
}
