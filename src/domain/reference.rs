// src/domain/reference.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefKind {
    /// Binary attachment (image, audio, ...).
    Media,
    /// Symbolic pointer to another note's file.
    NoteLink,
}

/// One embedded reference inside a field.
///
/// `text_form` is the reference exactly as it appears in the owning field's
/// text; `target` is the addressed file (name or vault-relative path) as
/// written inside that form. `resolved` is filled by the resolver and is
/// stable: resolving twice yields the same path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: RefKind,
    pub text_form: String,
    pub target: String,
    pub resolved: Option<PathBuf>,
}

impl Reference {
    pub fn media(text_form: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Media,
            text_form: text_form.into(),
            target: target.into(),
            resolved: None,
        }
    }

    pub fn note_link(text_form: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: RefKind::NoteLink,
            text_form: text_form.into(),
            target: target.into(),
            resolved: None,
        }
    }

    /// Base name of the target, without any directory components.
    pub fn base_name(&self) -> &str {
        self.target
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.target.as_str())
    }
}
