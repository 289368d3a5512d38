// src/domain/note.rs
use serde::{Deserialize, Serialize};

use crate::constants::SENTINEL_NOTE_ID;
use crate::domain::field::Field;

const DIFFICULTY_EPSILON: f64 = 1e-6;

/// One note, in either representation (see [`crate::domain::FieldKind`]).
///
/// Field order always matches the model's declared field order; tags carry
/// no duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub model_id: i64,
    pub model_name: String,
    /// Category driving folder placement; `::` separates nested levels.
    pub deck: String,
    pub fields: Vec<Field>,
    pub tags: Vec<String>,
    pub suspended: bool,
    /// Derived scheduling scalar exported for information, not a user edit.
    pub difficulty: f64,
    /// Last edit on the structured side, unix seconds.
    pub date_modified: i64,
    /// When this note was last written into the file store, unix seconds.
    pub date_synced: i64,
}

impl Note {
    /// True while the note has no structured-side counterpart yet.
    pub fn is_unregistered(&self) -> bool {
        self.id == SENTINEL_NOTE_ID
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name == name)
    }

    /// Replace a field's text, or append the field if the note does not have
    /// it yet (keeps declared order by pushing at the end, where the model
    /// places injected fields).
    pub fn set_field_text(&mut self, name: &str, text: impl Into<String>) {
        let text = text.into();
        match self.field_mut(name) {
            Some(field) => field.text = text,
            None => {
                let kind = self
                    .fields
                    .first()
                    .map(|f| f.kind)
                    .unwrap_or(crate::domain::FieldKind::Structured);
                self.fields.push(Field {
                    name: name.to_string(),
                    text,
                    kind,
                    references: Vec::new(),
                });
            }
        }
    }

    /// Tags, deduplicated while preserving first-seen order.
    pub fn dedup_tags(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.tags.retain(|t| seen.insert(t.clone()));
    }

    /// Semantic equality over everything the sync may write: fields (order
    /// sensitive), tags, deck and side-shared properties. Ignores
    /// representation noise such as round-tripped whitespace; any real
    /// field-text or property change is detected.
    ///
    /// This is the sole gate for "was anything writeable changed?".
    pub fn content_eq(&self, other: &Note) -> bool {
        self.fields_eq(other) && self.tags == other.tags && self.deck == other.deck
            && self.properties_eq(other)
    }

    /// Order-sensitive field comparison.
    pub fn fields_eq(&self, other: &Note) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.content_eq(b))
    }

    /// Non-timestamped property comparison (suspension flag, difficulty).
    pub fn properties_eq(&self, other: &Note) -> bool {
        self.suspended == other.suspended
            && (self.difficulty - other.difficulty).abs() < DIFFICULTY_EPSILON
    }
}
