// src/domain/field.rs
use serde::{Deserialize, Serialize};

use crate::domain::reference::Reference;

/// Which representation a field's text is in.
///
/// A closed set of variants instead of an open field-type hierarchy; moving
/// between representations goes through the explicit conversion functions in
/// `infrastructure::markup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    /// HTML, as stored on the structured side.
    Structured,
    /// Plain markup, as stored in a vault file.
    File,
    /// Structural placeholder inside a template file, no content.
    Template,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub text: String,
    pub kind: FieldKind,
    pub references: Vec<Reference>,
}

impl Field {
    pub fn structured(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind: FieldKind::Structured,
            references: Vec::new(),
        }
    }

    pub fn file(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            kind: FieldKind::File,
            references: Vec::new(),
        }
    }

    pub fn template(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: String::new(),
            kind: FieldKind::Template,
            references: Vec::new(),
        }
    }

    /// Field text with representation noise removed: CRLF folded to LF,
    /// trailing whitespace stripped per line, outer blank lines dropped.
    pub fn normalized_text(&self) -> String {
        normalize_text(&self.text)
    }

    /// Semantic equality: same name, same normalized text, same reference
    /// list (by textual form, in order).
    pub fn content_eq(&self, other: &Field) -> bool {
        if self.name != other.name {
            return false;
        }
        if self.normalized_text() != other.normalized_text() {
            return false;
        }
        let refs: Vec<&str> = self.references.iter().map(|r| r.text_form.as_str()).collect();
        let other_refs: Vec<&str> = other.references.iter().map(|r| r.text_form.as_str()).collect();
        refs == other_refs
    }
}

pub(crate) fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}
