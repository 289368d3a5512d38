// src/infrastructure/markup/math.rs
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Markup side: $$...$$ first so block spans never match as two inline ones.
    static ref MARKUP_BLOCK_MATH: Regex =
        Regex::new(r"\$\$((?s:.+?))\$\$").expect("Failed to compile markup block math regex");
    static ref MARKUP_INLINE_MATH: Regex =
        Regex::new(r"\$([^\s$](?:[^$\n]*[^\s$])?)\$")
            .expect("Failed to compile markup inline math regex");
    // Structured side: \(...\) and \[...\].
    static ref HTML_BLOCK_MATH: Regex =
        Regex::new(r"\\\[((?s:.+?))\\\]").expect("Failed to compile html block math regex");
    static ref HTML_INLINE_MATH: Regex =
        Regex::new(r"\\\(((?s:.+?))\\\)").expect("Failed to compile html inline math regex");
}

// Private-use markers bracketing a span index; they survive both the markdown
// parser and every regex pass untouched.
const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

// Stand-in for a backslash-escaped dollar while the math regexes run; the
// regex crate has no lookbehind, so `\$` would otherwise open a span.
const ESCAPED_DOLLAR: char = '\u{E004}';

/// Which delimiter family a text uses for math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathStyle {
    /// `$...$` inline, `$$...$$` block (file side).
    Markup,
    /// `\(...\)` inline, `\[...\]` block (structured side).
    Html,
}

/// Verbatim math content lifted out of a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSpan {
    pub content: String,
}

/// Replace every recognized math span with an opaque placeholder and return
/// the spans in order. Escape and conversion passes then run on the
/// remaining text only, so they can never corrupt verbatim math content;
/// [`restore`] rejoins the spans afterwards.
pub fn extract(text: &str, style: MathStyle) -> (String, Vec<MathSpan>) {
    let mut spans = Vec::new();
    let (block, inline) = match style {
        MathStyle::Markup => (&*MARKUP_BLOCK_MATH, &*MARKUP_INLINE_MATH),
        MathStyle::Html => (&*HTML_BLOCK_MATH, &*HTML_INLINE_MATH),
    };

    let shielded = matches!(style, MathStyle::Markup);
    let text = if shielded {
        text.replace(r"\$", &ESCAPED_DOLLAR.to_string())
    } else {
        text.to_string()
    };

    let lift = |re: &Regex, input: &str, spans: &mut Vec<MathSpan>| -> String {
        re.replace_all(input, |caps: &regex::Captures| {
            let idx = spans.len();
            spans.push(MathSpan {
                content: caps[1].trim_matches('\n').to_string(),
            });
            format!("{OPEN}{idx}{CLOSE}")
        })
        .into_owned()
    };

    let text = lift(block, &text, &mut spans);
    let mut text = lift(inline, &text, &mut spans);
    if shielded {
        text = text.replace(ESCAPED_DOLLAR, r"\$");
    }
    (text, spans)
}

/// Substitute the placeholders back, rendering each span in `style`.
///
/// The delimiter pair is chosen by the span's content: single-line content
/// gets the inline pair, multi-line content the block pair.
pub fn restore(text: &str, spans: &[MathSpan], style: MathStyle) -> String {
    let mut out = text.to_string();
    for (idx, span) in spans.iter().enumerate() {
        let placeholder = format!("{OPEN}{idx}{CLOSE}");
        let multi_line = span.content.contains('\n');
        let rendered = match (style, multi_line) {
            (MathStyle::Markup, false) => format!("${}$", span.content),
            (MathStyle::Markup, true) => format!("$$\n{}\n$$", span.content),
            (MathStyle::Html, false) => format!(r"\({}\)", span.content),
            (MathStyle::Html, true) => format!(r"\[{}\]", span.content),
        };
        out = out.replace(&placeholder, &rendered);
    }
    out
}
