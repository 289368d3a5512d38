// src/util/testing.rs

use anyhow::Result;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use crate::application::store::{NoteLookup, NoteStore};
use crate::domain::{Model, Note, SyncError};
use crate::util::time::now_unix;

// Common test environment variables
pub const TEST_ENV_VARS: &[&str] = &["RUST_LOG", "NO_CLEANUP"];

/// Shared in-memory store for testing everything that depends on NoteStore,
/// eliminating the need for each test file to define its own double.
///
/// # Examples
///
/// ```
/// use notebridge::util::testing::MemoryNoteStore;
///
/// let mut store = MemoryNoteStore::builder()
///     .with_basic_model()
///     .build();
/// ```
pub struct MemoryNoteStore {
    notes: BTreeMap<i64, Note>,
    models: BTreeMap<i64, Model>,
    media_dir: PathBuf,
    next_note_id: i64,
    next_model_id: i64,
}

impl MemoryNoteStore {
    pub fn builder() -> MemoryNoteStoreBuilder {
        MemoryNoteStoreBuilder::new()
    }

    /// Override a note's modification timestamp; tests use this to steer
    /// the conflict tie-break without sleeping.
    pub fn set_note_modified(&mut self, id: i64, date_modified: i64) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.date_modified = date_modified;
        }
    }

    /// Mark a note so lookups report it as corrupted.
    pub fn corrupt_note(&mut self, id: i64) {
        if let Some(note) = self.notes.get_mut(&id) {
            note.model_id = i64::MIN;
        }
    }

    pub fn note_count(&self) -> usize {
        self.notes.len()
    }
}

impl NoteStore for MemoryNoteStore {
    fn note_ids(&mut self) -> Result<Vec<i64>, SyncError> {
        Ok(self.notes.keys().copied().collect())
    }

    fn get_note(&mut self, id: i64) -> Result<NoteLookup, SyncError> {
        match self.notes.get(&id) {
            Some(note) if note.model_id == i64::MIN => Ok(NoteLookup::Corrupted),
            Some(note) => Ok(NoteLookup::Found(Box::new(note.clone()))),
            None => Ok(NoteLookup::NotFound),
        }
    }

    fn create_note(&mut self, note: &Note) -> Result<i64, SyncError> {
        let id = self.next_note_id;
        self.next_note_id += 1;

        let mut stored = note.clone();
        stored.id = id;
        stored.date_modified = now_unix();
        self.notes.insert(id, stored);
        Ok(id)
    }

    fn update_note(&mut self, note: &Note) -> Result<(), SyncError> {
        if !self.notes.contains_key(&note.id) {
            return Err(SyncError::NoteNotFound(note.id));
        }
        let mut stored = note.clone();
        stored.date_modified = now_unix();
        self.notes.insert(note.id, stored);
        Ok(())
    }

    fn delete_note(&mut self, id: i64) -> Result<(), SyncError> {
        self.notes
            .remove(&id)
            .map(|_| ())
            .ok_or(SyncError::NoteNotFound(id))
    }

    fn models(&mut self) -> Result<Vec<Model>, SyncError> {
        Ok(self.models.values().cloned().collect())
    }

    fn model_by_name(&mut self, name: &str) -> Result<Option<Model>, SyncError> {
        Ok(self.models.values().find(|m| m.name == name).cloned())
    }

    fn create_model(&mut self, model: &Model) -> Result<i64, SyncError> {
        let id = self.next_model_id;
        self.next_model_id += 1;

        let mut stored = model.clone();
        stored.id = id;
        stored.date_modified = now_unix();
        self.models.insert(id, stored);
        Ok(id)
    }

    fn add_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError> {
        let model = self
            .models
            .get_mut(&model_id)
            .ok_or(SyncError::ModelNotFound(model_id))?;
        if !model.field_names.iter().any(|n| n == field_name) {
            model.field_names.push(field_name.to_string());
            model.date_modified = now_unix();
        }
        Ok(())
    }

    fn remove_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError> {
        let model = self
            .models
            .get_mut(&model_id)
            .ok_or(SyncError::ModelNotFound(model_id))?;
        let before = model.field_names.len();
        model.field_names.retain(|n| n != field_name);
        if model.field_names.len() != before {
            let marker = format!("{{{{{field_name}}}}}");
            for template in &mut model.templates {
                template.question = template.question.replace(&marker, "");
                template.answer = template.answer.replace(&marker, "");
            }
            model.date_modified = now_unix();
        }
        Ok(())
    }

    fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}

/// Builder for MemoryNoteStore
///
/// Provides a fluent interface for seeding store contents.
pub struct MemoryNoteStoreBuilder {
    notes: BTreeMap<i64, Note>,
    models: BTreeMap<i64, Model>,
    media_dir: PathBuf,
}

impl MemoryNoteStoreBuilder {
    pub fn new() -> Self {
        Self {
            notes: BTreeMap::new(),
            models: BTreeMap::new(),
            media_dir: std::env::temp_dir(),
        }
    }

    /// Seed a note under its own id.
    pub fn with_note(mut self, note: Note) -> Self {
        self.notes.insert(note.id, note);
        self
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.models.insert(model.id, model);
        self
    }

    /// Seed the conventional two-field "Basic" model under id 1.
    pub fn with_basic_model(self) -> Self {
        self.with_model(Model {
            id: 1,
            name: "Basic".to_string(),
            field_names: vec!["Front".to_string(), "Back".to_string()],
            templates: vec![crate::domain::DisplayTemplate {
                name: "Card 1".to_string(),
                question: "{{Front}}".to_string(),
                answer: "{{Front}}<hr>{{Back}}".to_string(),
            }],
            date_modified: 0,
        })
    }

    pub fn with_media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = dir.into();
        self
    }

    pub fn build(self) -> MemoryNoteStore {
        let next_note_id = self.notes.keys().max().copied().unwrap_or(1000) + 1;
        let next_model_id = self.models.keys().max().copied().unwrap_or(0) + 1;
        MemoryNoteStore {
            notes: self.notes,
            models: self.models,
            media_dir: self.media_dir,
            next_note_id,
            next_model_id,
        }
    }
}

impl Default for MemoryNoteStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn init_test_setup() -> Result<()> {
    // Set up logging first
    setup_test_logging();

    info!("Test Setup complete");
    Ok(())
}

fn setup_test_logging() {
    debug!("INIT: Attempting logger init from testing.rs");
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "debug");
    }

    // Create a filter for noisy modules
    let noisy_modules = ["walkdir", "rusqlite"];
    let module_filter = filter_fn(move |metadata| {
        !noisy_modules
            .iter()
            .any(|name| metadata.target().starts_with(name))
    });

    // Set up the subscriber with environment filter
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    // Build and set the subscriber
    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_names(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(module_filter)
            .with_filter(env_filter),
    );

    // Only set if we haven't already set a global subscriber
    if tracing::dispatcher::has_been_set() {
        debug!("Tracing subscriber already set");
    } else {
        subscriber.try_init().unwrap_or_else(|e| {
            eprintln!("Error: Failed to set up logging: {}", e);
        });
    }
}

pub fn print_active_env_vars() {
    for var in TEST_ENV_VARS {
        if let Ok(value) = env::var(var) {
            println!("{var}={value}");
        } else {
            println!("{var} is not set");
        }
    }
}
