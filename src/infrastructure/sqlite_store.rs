// src/infrastructure/sqlite_store.rs
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::application::store::{NoteLookup, NoteStore};
use crate::domain::{DisplayTemplate, Field, Model, Note, SyncError};
use crate::util::time::now_unix;

/// SQLite-backed structured store.
///
/// Notes keep their fields as a JSON column; models keep field names and
/// display templates as JSON. Binary attachments live in a flat `media`
/// folder next to the database file.
pub struct SqliteStore {
    conn: Connection,
    media_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredField {
    name: String,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ModelConfig {
    field_names: Vec<String>,
    templates: Vec<DisplayTemplate>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create store folder {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open store database {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS models (
                 id INTEGER PRIMARY KEY,
                 name TEXT NOT NULL UNIQUE,
                 config TEXT NOT NULL,
                 date_modified INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS notes (
                 id INTEGER PRIMARY KEY,
                 model_id INTEGER NOT NULL REFERENCES models(id),
                 deck TEXT NOT NULL,
                 fields TEXT NOT NULL,
                 tags TEXT NOT NULL,
                 suspended INTEGER NOT NULL DEFAULT 0,
                 difficulty REAL NOT NULL DEFAULT 2.5,
                 date_modified INTEGER NOT NULL,
                 date_created INTEGER NOT NULL
             );",
        )
        .context("Failed to initialize store schema")?;

        let media_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
            .join("media");
        std::fs::create_dir_all(&media_dir)
            .with_context(|| format!("Failed to create media folder {}", media_dir.display()))?;

        info!(path = %path.display(), "Opened structured store");
        Ok(Self { conn, media_dir })
    }

    fn load_model(&self, model_id: i64) -> Result<Model, SyncError> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, config, date_modified FROM models WHERE id = ?1",
                params![model_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?
            .ok_or(SyncError::ModelNotFound(model_id))?;

        let config: ModelConfig =
            serde_json::from_str(&row.2).map_err(|e| SyncError::StoreError(e.to_string()))?;
        Ok(Model {
            id: row.0,
            name: row.1,
            field_names: config.field_names,
            templates: config.templates,
            date_modified: row.3,
        })
    }

    fn save_model(&self, model: &Model) -> Result<(), SyncError> {
        let config = serde_json::to_string(&ModelConfig {
            field_names: model.field_names.clone(),
            templates: model.templates.clone(),
        })
        .map_err(|e| SyncError::StoreError(e.to_string()))?;

        self.conn
            .execute(
                "UPDATE models SET name = ?2, config = ?3, date_modified = ?4 WHERE id = ?1",
                params![model.id, model.name, config, now_unix()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Align stored fields to the model's declared order, filling fields the
    /// schema gained since the note was written with empty text.
    fn align_fields(model: &Model, stored: Vec<StoredField>) -> Vec<Field> {
        model
            .field_names
            .iter()
            .map(|name| {
                let text = stored
                    .iter()
                    .find(|f| &f.name == name)
                    .map(|f| f.text.clone())
                    .unwrap_or_default();
                Field::structured(name.clone(), text)
            })
            .collect()
    }
}

fn store_err(e: rusqlite::Error) -> SyncError {
    SyncError::StoreError(e.to_string())
}

fn join_tags(tags: &[String]) -> String {
    tags.join(" ")
}

fn split_tags(tags: &str) -> Vec<String> {
    tags.split_whitespace().map(|s| s.to_string()).collect()
}

impl NoteStore for SqliteStore {
    fn note_ids(&mut self) -> Result<Vec<i64>, SyncError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM notes ORDER BY id")
            .map_err(store_err)?;
        let ids = stmt
            .query_map([], |row| row.get(0))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(store_err)?;
        Ok(ids)
    }

    fn get_note(&mut self, id: i64) -> Result<NoteLookup, SyncError> {
        let row = self
            .conn
            .query_row(
                "SELECT model_id, deck, fields, tags, suspended, difficulty, date_modified
                 FROM notes WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            )
            .optional()
            .map_err(store_err)?;

        let Some((model_id, deck, fields_json, tags, suspended, difficulty, date_modified)) = row
        else {
            return Ok(NoteLookup::NotFound);
        };

        let Ok(stored) = serde_json::from_str::<Vec<StoredField>>(&fields_json) else {
            debug!(id, "Note record with unparseable field payload");
            return Ok(NoteLookup::Corrupted);
        };
        let model = match self.load_model(model_id) {
            Ok(model) => model,
            Err(SyncError::ModelNotFound(_)) => return Ok(NoteLookup::Corrupted),
            Err(e) => return Err(e),
        };

        Ok(NoteLookup::Found(Box::new(Note {
            id,
            model_id,
            model_name: model.name.clone(),
            deck,
            fields: Self::align_fields(&model, stored),
            tags: split_tags(&tags),
            suspended,
            difficulty,
            date_modified,
            date_synced: 0,
        })))
    }

    fn create_note(&mut self, note: &Note) -> Result<i64, SyncError> {
        let fields: Vec<StoredField> = note
            .fields
            .iter()
            .map(|f| StoredField {
                name: f.name.clone(),
                text: f.text.clone(),
            })
            .collect();
        let fields_json =
            serde_json::to_string(&fields).map_err(|e| SyncError::StoreError(e.to_string()))?;
        let now = now_unix();

        self.conn
            .execute(
                "INSERT INTO notes (model_id, deck, fields, tags, suspended, difficulty,
                                    date_modified, date_created)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    note.model_id,
                    note.deck,
                    fields_json,
                    join_tags(&note.tags),
                    note.suspended,
                    note.difficulty,
                    now
                ],
            )
            .map_err(store_err)?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "Created note");
        Ok(id)
    }

    fn update_note(&mut self, note: &Note) -> Result<(), SyncError> {
        let fields: Vec<StoredField> = note
            .fields
            .iter()
            .map(|f| StoredField {
                name: f.name.clone(),
                text: f.text.clone(),
            })
            .collect();
        let fields_json =
            serde_json::to_string(&fields).map_err(|e| SyncError::StoreError(e.to_string()))?;

        let changed = self
            .conn
            .execute(
                "UPDATE notes SET model_id = ?2, deck = ?3, fields = ?4, tags = ?5,
                                  suspended = ?6, difficulty = ?7, date_modified = ?8
                 WHERE id = ?1",
                params![
                    note.id,
                    note.model_id,
                    note.deck,
                    fields_json,
                    join_tags(&note.tags),
                    note.suspended,
                    note.difficulty,
                    now_unix()
                ],
            )
            .map_err(store_err)?;
        if changed == 0 {
            return Err(SyncError::NoteNotFound(note.id));
        }
        Ok(())
    }

    fn delete_note(&mut self, id: i64) -> Result<(), SyncError> {
        let changed = self
            .conn
            .execute("DELETE FROM notes WHERE id = ?1", params![id])
            .map_err(store_err)?;
        if changed == 0 {
            return Err(SyncError::NoteNotFound(id));
        }
        debug!(id, "Deleted note");
        Ok(())
    }

    fn models(&mut self) -> Result<Vec<Model>, SyncError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM models ORDER BY id")
            .map_err(store_err)?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(store_err)?;
        drop(stmt);

        ids.into_iter().map(|id| self.load_model(id)).collect()
    }

    fn model_by_name(&mut self, name: &str) -> Result<Option<Model>, SyncError> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM models WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(store_err)?;
        id.map(|id| self.load_model(id)).transpose()
    }

    fn create_model(&mut self, model: &Model) -> Result<i64, SyncError> {
        let config = serde_json::to_string(&ModelConfig {
            field_names: model.field_names.clone(),
            templates: model.templates.clone(),
        })
        .map_err(|e| SyncError::StoreError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO models (name, config, date_modified) VALUES (?1, ?2, ?3)",
                params![model.name, config, now_unix()],
            )
            .map_err(store_err)?;
        let id = self.conn.last_insert_rowid();
        info!(id, name = %model.name, "Created model");
        Ok(id)
    }

    fn add_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError> {
        let mut model = self.load_model(model_id)?;
        if model.field_names.iter().any(|n| n == field_name) {
            return Ok(());
        }
        model.field_names.push(field_name.to_string());
        info!(model = %model.name, field = field_name, "Added model field");
        self.save_model(&model)
    }

    fn remove_model_field(&mut self, model_id: i64, field_name: &str) -> Result<(), SyncError> {
        let mut model = self.load_model(model_id)?;
        let before = model.field_names.len();
        model.field_names.retain(|n| n != field_name);
        if model.field_names.len() == before {
            return Ok(());
        }

        // Back-propagate into display templates referencing the field.
        let marker = format!("{{{{{field_name}}}}}");
        for template in &mut model.templates {
            template.question = template.question.replace(&marker, "");
            template.answer = template.answer.replace(&marker, "");
        }
        info!(model = %model.name, field = field_name, "Removed model field");
        self.save_model(&model)
    }

    fn media_dir(&self) -> &Path {
        &self.media_dir
    }
}
