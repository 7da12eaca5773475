//! Markdown to HTML conversion.

use pulldown_cmark::{Options, Parser, html};

/// Render Markdown to HTML.
///
/// Enables tables, footnotes, strikethrough, definition lists and smart
/// punctuation. Raw HTML in the source passes through untouched, so
/// template output embedded in Markdown keeps its markup.
#[must_use]
pub fn markdown_to_html(source: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_SMART_PUNCTUATION
        | Options::ENABLE_DEFINITION_LIST;

    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
