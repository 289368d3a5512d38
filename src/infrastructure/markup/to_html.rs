// src/infrastructure/markup/to_html.rs
use lazy_static::lazy_static;
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;

use crate::infrastructure::markup::math::{self, MathStyle};

lazy_static! {
    static ref NEWLINE_TAG_REGEX: Regex =
        Regex::new(r"\n?(<.+?>)\n?").expect("Failed to compile newline tag regex");
    static ref WIKILINK_REGEX: Regex = Regex::new(r"\[\[([^\[\]|]+?)(?:\|([^\[\]]+?))?\]\]")
        .expect("Failed to compile wikilink regex");
}

/// Convert field markup to the structured side's HTML representation.
///
/// Math spans are lifted out before the markdown parser runs and restored
/// with the structured side's native wrappers afterwards, so their content
/// passes through verbatim.
pub fn to_html(markup: &str) -> String {
    let (markup, math_spans) = math::extract(markup, MathStyle::Markup);
    let markup = convert_wikilinks(&markup);

    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(&markup, options);
    let mut html_output = String::new();
    html::push_html(&mut html_output, parser);

    // Anki quirk: newlines around HTML tags render as visible breaks.
    let html_output = remove_newlines_around_tags(html_output.trim_end());
    let html_output = unwrap_single_paragraph(&html_output);

    math::restore(&html_output, &math_spans, MathStyle::Html)
}

/// `[[target]]` / `[[target|label]]` to inline HTML; the markdown parser
/// passes inline HTML through untouched.
fn convert_wikilinks(markup: &str) -> String {
    WIKILINK_REGEX
        .replace_all(markup, |caps: &regex::Captures| {
            let target = caps[1].trim();
            let label = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_else(|| link_stem(target).to_string());
            format!(r#"<a href="vault://{target}">{label}</a>"#)
        })
        .into_owned()
}

/// Display name of a link target: base name without the `.md` extension.
pub fn link_stem(target: &str) -> &str {
    let base = target.rsplit('/').next().unwrap_or(target);
    base.strip_suffix(".md").unwrap_or(base)
}

fn remove_newlines_around_tags(html: &str) -> String {
    NEWLINE_TAG_REGEX.replace_all(html, "$1").to_string()
}

/// Fields are single blocks most of the time; a lone `<p>` wrapper would
/// round-trip a plain one-liner into a paragraph. Strip it when it is the
/// only one.
fn unwrap_single_paragraph(html: &str) -> String {
    let inner = html
        .strip_prefix("<p>")
        .and_then(|rest| rest.strip_suffix("</p>"));
    match inner {
        Some(inner) if !inner.contains("<p>") => inner.to_string(),
        _ => html.to_string(),
    }
}
