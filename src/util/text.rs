// src/util/text.rs
use html_escape::decode_html_entities;
use regex::Regex;

/// Extract the first line of plain text from HTML content.
///
/// Used for human-readable note titles in status output and logs.
///
/// # Examples
///
/// ```
/// use notebridge::util::text::extract_first_line;
///
/// let html = "<p>What is a Tree?</p><p>Second line</p>";
/// let first_line = extract_first_line(html);
/// assert_eq!(first_line, "What is a Tree?");
/// ```
pub fn extract_first_line(html: &str) -> String {
    // Decode HTML entities first
    let decoded = decode_html_entities(html).to_string();

    // Replace block-level HTML tags with newlines to preserve line breaks
    let block_re = Regex::new(r"</?(p|div|br|li|h[1-6])[^>]*>").unwrap();
    let with_newlines = block_re.replace_all(&decoded, "\n").into_owned();

    // Remove all remaining HTML tags
    let tag_re = Regex::new(r"<[^>]+>").unwrap();
    let no_tags = tag_re.replace_all(&with_newlines, "").into_owned();

    no_tags
        .lines()
        .map(|line| line.trim())
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}
