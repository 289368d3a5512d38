// src/infrastructure/markup/sanitize.rs
use crate::infrastructure::markup::to_html::to_html;
use crate::infrastructure::markup::to_markup::to_markup;

/// One full round-trip through the file representation.
///
/// The vault can only faithfully hold plain markup, so content coming from
/// the structured side is committed as whatever survives a round-trip.
/// Applying this twice yields the same string as applying it once; the first
/// application may itself rewrite the input.
pub fn sanitize_html(html: &str) -> String {
    to_html(&to_markup(html))
}

/// One full round-trip through the structured representation; idempotent
/// after one application, like [`sanitize_html`].
pub fn sanitize_markup(markup: &str) -> String {
    to_markup(&to_html(markup))
}
