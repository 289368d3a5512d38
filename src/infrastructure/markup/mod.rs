// src/infrastructure/markup/mod.rs
pub mod math;
pub mod sanitize;
pub mod to_html;
pub mod to_markup;

pub use sanitize::{sanitize_html, sanitize_markup};
pub use to_html::to_html;
pub use to_markup::to_markup;

use crate::domain::{Field, FieldKind, Note};

/// Convert a field into the file representation.
///
/// References are intentionally dropped; the resolver re-extracts them from
/// the converted text.
pub fn to_file_field(field: &Field) -> Field {
    let text = match field.kind {
        FieldKind::Structured => to_markup(&field.text),
        FieldKind::File => field.text.clone(),
        FieldKind::Template => String::new(),
    };
    Field {
        name: field.name.clone(),
        text,
        kind: FieldKind::File,
        references: Vec::new(),
    }
}

/// Convert a field into the structured (HTML) representation.
pub fn to_structured_field(field: &Field) -> Field {
    let text = match field.kind {
        FieldKind::Structured => field.text.clone(),
        FieldKind::File => to_html(&field.text),
        FieldKind::Template => String::new(),
    };
    Field {
        name: field.name.clone(),
        text,
        kind: FieldKind::Structured,
        references: Vec::new(),
    }
}

/// Whole-note conversion into the file representation.
pub fn note_to_file_repr(note: &Note) -> Note {
    let mut converted = note.clone();
    converted.fields = note.fields.iter().map(to_file_field).collect();
    converted
}

/// Whole-note conversion into the structured representation.
pub fn note_to_structured_repr(note: &Note) -> Note {
    let mut converted = note.clone();
    converted.fields = note.fields.iter().map(to_structured_field).collect();
    converted
}
