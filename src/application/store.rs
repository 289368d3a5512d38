// src/application/store.rs
use std::path::Path;

use crate::domain::{Model, Note, SyncError};

/// Outcome of a note lookup.
///
/// A corrupted record is an expected condition the orchestrator handles, not
/// an error to bubble through the pass.
#[derive(Debug)]
pub enum NoteLookup {
    Found(Box<Note>),
    Corrupted,
    NotFound,
}

impl NoteLookup {
    pub fn found(self) -> Option<Note> {
        match self {
            NoteLookup::Found(note) => Some(*note),
            _ => None,
        }
    }
}

/// Abstract collection interface of the structured store.
///
/// Notes are in the structured (HTML) representation; the store assigns ids
/// and maintains `date_modified` on every write.
pub trait NoteStore {
    fn note_ids(&mut self) -> Result<Vec<i64>, SyncError>;

    fn get_note(&mut self, id: i64) -> Result<NoteLookup, SyncError>;

    /// Create a note and return its assigned id.
    fn create_note(&mut self, note: &Note) -> Result<i64, SyncError>;

    fn update_note(&mut self, note: &Note) -> Result<(), SyncError>;

    fn delete_note(&mut self, id: i64) -> Result<(), SyncError>;

    fn models(&mut self) -> Result<Vec<Model>, SyncError>;

    fn model_by_name(&mut self, name: &str) -> Result<Option<Model>, SyncError>;

    /// Create a model and return its assigned id.
    fn create_model(&mut self, model: &Model) -> Result<i64, SyncError>;

    /// Append a field to a model's schema. Existing notes expose the new
    /// field as empty text.
    fn add_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError>;

    /// Remove a field from a model's schema, stripping every reference to
    /// it from the model's display templates.
    fn remove_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError>;

    /// Folder holding the store's binary attachments (flat namespace).
    fn media_dir(&self) -> &Path;
}
