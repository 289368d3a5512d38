use anyhow::Result;
use notebridge::application::{NoteStore, SyncOrchestrator, SyncReport};
use notebridge::domain::{Field, Note};
use notebridge::infrastructure::config::{Config, StoreConfig, VaultConfig};
use notebridge::infrastructure::note_file::serialize_note;
use notebridge::util::testing::MemoryNoteStore;
use notebridge::util::time::now_unix;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test fixture pairing a temporary vault with a config pointed at it.
#[allow(dead_code)]
pub struct SyncFixture {
    _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
}

#[allow(dead_code)]
impl SyncFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temporary directory");
        let root = temp_dir.path().join("vault");
        std::fs::create_dir_all(&root).expect("Failed to create vault root");

        let config = Config {
            vault: VaultConfig {
                root: root.to_string_lossy().into_owned(),
                ..Default::default()
            },
            store: StoreConfig {
                path: temp_dir
                    .path()
                    .join("store.db")
                    .to_string_lossy()
                    .into_owned(),
            },
            sync: Default::default(),
        };

        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    /// Run one pass against the given store.
    pub fn run_pass<S: NoteStore>(&self, store: &mut S) -> Result<SyncReport> {
        let mut orchestrator = SyncOrchestrator::new(store, self.config.clone())?;
        orchestrator.run_pass()
    }

    /// A structured-side note ready for seeding into a store.
    pub fn structured_note(id: i64, front: &str, back: &str) -> Note {
        Note {
            id,
            model_id: 1,
            model_name: "Basic".to_string(),
            deck: "Default".to_string(),
            fields: vec![
                Field::structured("Front", front),
                Field::structured("Back", back),
            ],
            tags: vec![],
            suspended: false,
            difficulty: 2.5,
            date_modified: now_unix(),
            date_synced: 0,
        }
    }

    /// A file-side note, for serializing into the vault.
    pub fn file_note(id: i64, front: &str, back: &str) -> Note {
        Note {
            id,
            model_id: 1,
            model_name: "Basic".to_string(),
            deck: String::new(),
            fields: vec![Field::file("Front", front), Field::file("Back", back)],
            tags: vec![],
            suspended: false,
            difficulty: 2.5,
            date_modified: now_unix(),
            date_synced: now_unix(),
        }
    }

    pub fn write_note_file(&self, relative: &str, note: &Note) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create note folder");
        }
        std::fs::write(&path, serialize_note(note, 2)).expect("Failed to write note file");
    }

    pub fn read_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root.join(relative)).expect("Failed to read note file")
    }

    /// Every synchronized note file under the root, reserved folders
    /// excluded, sorted by relative path.
    pub fn note_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| {
                let relative = p.strip_prefix(&self.root).unwrap();
                let first = relative
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .unwrap_or_default();
                !first.starts_with('.')
                    && first != "templates"
                    && first != "trash"
                    && first != "attachments"
            })
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("md"))
            .collect();
        files.sort();
        files
    }

    /// Shift the recorded epoch into the past so same-second edits register
    /// as "after the epoch".
    pub fn backdate_epoch(&self, seconds: i64) {
        let state_path = self.root.join(".notebridge.json");
        let content = std::fs::read_to_string(&state_path).expect("Failed to read sync state");
        let mut state: serde_json::Value =
            serde_json::from_str(&content).expect("Failed to parse sync state");
        let last = state["last_sync"].as_i64().expect("missing last_sync");
        state["last_sync"] = serde_json::Value::from(last - seconds);
        std::fs::write(&state_path, serde_json::to_string_pretty(&state).unwrap())
            .expect("Failed to write sync state");
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join("trash")
    }
}

/// Store seeded with the conventional Basic model.
#[allow(dead_code)]
pub fn basic_store() -> MemoryNoteStore {
    MemoryNoteStore::builder().with_basic_model().build()
}

#[allow(dead_code)]
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
