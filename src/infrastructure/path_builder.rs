// src/infrastructure/path_builder.rs
use anyhow::Result;
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::path::Path;
use tracing::debug;

use crate::constants::{MAX_FILENAME_LEN, RANDOM_SUFFIX_LEN};
use crate::domain::{Note, NotePath, SyncError};
use crate::infrastructure::vault::Vault;

lazy_static! {
    // Span markers and embedded forms that must not leak into file names.
    static ref IMAGE_REGEX: Regex =
        Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("Failed to compile image strip regex");
    static ref WIKILINK_REGEX: Regex = Regex::new(r"\[\[([^\[\]|]+?)(?:\|([^\[\]]+?))?\]\]")
        .expect("Failed to compile wikilink strip regex");
    static ref MATH_REGEX: Regex =
        Regex::new(r"\$+([^$]*)\$+").expect("Failed to compile math strip regex");
    static ref MARKER_REGEX: Regex =
        Regex::new("[*_`#>\\[\\]\\\\]").expect("Failed to compile marker strip regex");
    static ref UNSAFE_REGEX: Regex =
        Regex::new(r#"[/\\:?"<>|\x00-\x1f]"#).expect("Failed to compile unsafe char regex");
    static ref WHITESPACE_REGEX: Regex =
        Regex::new(r"\s+").expect("Failed to compile whitespace regex");
}

/// Derive a file name (without extension) from a note's first field.
///
/// Markup and span markers are stripped, the remainder reduced to a
/// filesystem-safe character set and truncated with room left for a
/// collision suffix.
pub fn derive_file_name(first_field_markup: &str) -> String {
    let text = IMAGE_REGEX.replace_all(first_field_markup, "");
    let text = WIKILINK_REGEX.replace_all(&text, "$1");
    let text = MATH_REGEX.replace_all(&text, "$1");
    let text = MARKER_REGEX.replace_all(&text, "");
    let text = UNSAFE_REGEX.replace_all(&text, " ");

    let first_line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let cleaned = WHITESPACE_REGEX.replace_all(first_line, " ");
    let cleaned = cleaned.trim().trim_end_matches('.');

    if cleaned.is_empty() {
        return "Untitled".to_string();
    }

    // Reserve room for " <id>" / " <token>" suffixes under the name cap.
    let budget = MAX_FILENAME_LEN - RANDOM_SUFFIX_LEN - 1;
    truncate_on_char_boundary(cleaned, budget).to_string()
}

fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].trim_end()
}

/// Build a collision-free path for a new note file.
///
/// Tries the plain derived name, then the note id as suffix, then one random
/// token. A collision after all three is a programming-invariant violation,
/// not a user-facing condition, and fails the pass loudly.
pub fn build_note_path(vault: &Vault, note: &Note) -> Result<NotePath> {
    let folder = vault.folder_for_deck(&note.deck);
    let stem = note
        .fields
        .first()
        .map(|f| derive_file_name(&f.text))
        .unwrap_or_else(|| "Untitled".to_string());

    let candidates = [
        stem.clone(),
        format!("{stem} {}", note.id),
        format!("{stem} {}", random_token()),
    ];

    for candidate in &candidates {
        let relative = folder.join(format!("{candidate}.md"));
        if !vault.root().join(&relative).exists() {
            debug!(name = %candidate, "Derived note file name");
            return Ok(NotePath::new(vault.root(), relative));
        }
    }

    Err(SyncError::FilenameCollision(stem).into())
}

/// File name for a model's template file.
pub fn template_file_name(model_name: &str) -> String {
    let cleaned = derive_file_name(model_name);
    format!("{cleaned}.md")
}

pub fn exists_in(root: &Path, relative: &Path) -> bool {
    root.join(relative).exists()
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect()
}
