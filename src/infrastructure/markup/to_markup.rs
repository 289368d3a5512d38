// src/infrastructure/markup/to_markup.rs
use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;

use crate::infrastructure::markup::math::{self, MathStyle};
use crate::infrastructure::markup::to_html::link_stem;

lazy_static! {
    static ref CODE_BLOCK_REGEX: Regex =
        Regex::new(r#"(?s)<pre><code(?: class="language-([^"]*)")?>(.*?)</code></pre>"#)
            .expect("Failed to compile code block regex");
    static ref INLINE_CODE_REGEX: Regex =
        Regex::new(r"(?s)<code>(.*?)</code>").expect("Failed to compile inline code regex");
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]+>").expect("Failed to compile tag regex");
    static ref IMG_REGEX: Regex = Regex::new(r#"<img[^>]*?src="([^"]+)"[^>]*?>"#)
        .expect("Failed to compile img regex");
    static ref VAULT_LINK_REGEX: Regex =
        Regex::new(r#"(?s)<a href="vault://([^"]+)"[^>]*>(.*?)</a>"#)
            .expect("Failed to compile vault link regex");
    static ref URL_LINK_REGEX: Regex = Regex::new(r#"(?s)<a href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("Failed to compile url link regex");
    static ref HEADING_OPEN_REGEX: Regex =
        Regex::new(r"<h([1-6])[^>]*>").expect("Failed to compile heading open regex");
    static ref HEADING_CLOSE_REGEX: Regex =
        Regex::new(r"</h[1-6]>").expect("Failed to compile heading close regex");
    static ref BOLD_REGEX: Regex =
        Regex::new(r"</?(?:b|strong)>").expect("Failed to compile bold regex");
    static ref EMPHASIS_REGEX: Regex =
        Regex::new(r"</?(?:i|em)>").expect("Failed to compile emphasis regex");
    static ref BR_REGEX: Regex = Regex::new(r"<br\s*/?>").expect("Failed to compile br regex");
    static ref BLOCK_OPEN_REGEX: Regex =
        Regex::new(r"<(?:p|div)[^>]*>").expect("Failed to compile block open regex");
    static ref BLOCK_CLOSE_REGEX: Regex =
        Regex::new(r"</(?:p|div)>").expect("Failed to compile block close regex");
    static ref LIST_ITEM_OPEN_REGEX: Regex =
        Regex::new(r"<li[^>]*>").expect("Failed to compile list item regex");
    static ref LIST_TAG_REGEX: Regex =
        Regex::new(r"</li>|</?(?:ul|ol)[^>]*>").expect("Failed to compile list tag regex");
    static ref MULTI_NEWLINE_REGEX: Regex =
        Regex::new(r"\n{3,}").expect("Failed to compile newline collapse regex");
}

// Placeholder markers for lifted code spans, disjoint from the math markers.
const CODE_OPEN: char = '\u{E002}';
const CODE_CLOSE: char = '\u{E003}';

/// Convert structured-side HTML to the file side's markup representation.
///
/// Math spans and code are lifted out first; the entity-decode and escape
/// pass then runs on plain text segments only, so it can never corrupt
/// verbatim math or code content.
pub fn to_markup(html: &str) -> String {
    let (html, math_spans) = math::extract(html, MathStyle::Html);

    let mut code_spans: Vec<String> = Vec::new();
    let html = lift_code_blocks(&html, &mut code_spans);
    let html = lift_inline_code(&html, &mut code_spans);

    let html = escape_text_segments(&html);

    let html = IMG_REGEX.replace_all(&html, "![]($1)");
    let html = VAULT_LINK_REGEX.replace_all(&html, |caps: &regex::Captures| {
        let target = &caps[1];
        let label = caps[2].replace('\\', "");
        if label == link_stem(target) {
            format!("[[{target}]]")
        } else {
            format!("[[{target}|{label}]]")
        }
    });
    let html = URL_LINK_REGEX.replace_all(&html, "[$2]($1)");

    let html = HEADING_OPEN_REGEX.replace_all(&html, |caps: &regex::Captures| {
        let level: usize = caps[1].parse().unwrap_or(1);
        format!("\n\n{} ", "#".repeat(level))
    });
    let html = HEADING_CLOSE_REGEX.replace_all(&html, "\n\n");
    let html = BOLD_REGEX.replace_all(&html, "**");
    let html = EMPHASIS_REGEX.replace_all(&html, "*");
    let html = BR_REGEX.replace_all(&html, "\n");
    let html = LIST_ITEM_OPEN_REGEX.replace_all(&html, "- ");
    let html = LIST_TAG_REGEX.replace_all(&html, "\n");
    let html = BLOCK_CLOSE_REGEX.replace_all(&html, "\n\n");
    let html = BLOCK_OPEN_REGEX.replace_all(&html, "");

    let text = TAG_REGEX.replace_all(&html, "");

    let text = restore_code(&text, &code_spans);
    let text = math::restore(&text, &math_spans, MathStyle::Markup);

    MULTI_NEWLINE_REGEX
        .replace_all(&text, "\n\n")
        .trim_matches('\n')
        .trim_end()
        .to_string()
}

fn lift_code_blocks(html: &str, spans: &mut Vec<String>) -> String {
    CODE_BLOCK_REGEX
        .replace_all(html, |caps: &regex::Captures| {
            let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = decode_html_entities(&caps[2]).into_owned();
            let body = body.trim_end_matches('\n');
            let idx = spans.len();
            spans.push(format!("```{lang}\n{body}\n```"));
            format!("\n\n{CODE_OPEN}{idx}{CODE_CLOSE}\n\n")
        })
        .into_owned()
}

fn lift_inline_code(html: &str, spans: &mut Vec<String>) -> String {
    INLINE_CODE_REGEX
        .replace_all(html, |caps: &regex::Captures| {
            let body = decode_html_entities(&caps[1]).into_owned();
            let idx = spans.len();
            // Double fence when the content itself contains a backtick.
            if body.contains('`') {
                spans.push(format!("`` {body} ``"));
            } else {
                spans.push(format!("`{body}`"));
            }
            format!("{CODE_OPEN}{idx}{CODE_CLOSE}")
        })
        .into_owned()
}

fn restore_code(text: &str, spans: &[String]) -> String {
    let mut out = text.to_string();
    for (idx, span) in spans.iter().enumerate() {
        out = out.replace(&format!("{CODE_OPEN}{idx}{CODE_CLOSE}"), span);
    }
    out
}

/// Decode entities and escape markup-significant characters, tag-delimited
/// text segment by text segment. Tags themselves pass through for the
/// conversion passes that follow.
fn escape_text_segments(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;
    for m in TAG_REGEX.find_iter(html) {
        out.push_str(&escape_segment(&html[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&escape_segment(&html[last..]));
    out
}

fn escape_segment(text: &str) -> String {
    let decoded = decode_html_entities(text).replace('\u{a0}', " ");
    let mut out = String::with_capacity(decoded.len());
    for c in decoded.chars() {
        match c {
            '\\' | '*' | '_' | '`' | '$' | '<' | '>' | '#' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
