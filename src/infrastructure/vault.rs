// src/infrastructure/vault.rs
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::{Note, NotePath};
use crate::infrastructure::note_file;

/// One successfully parsed note file.
#[derive(Debug, Clone)]
pub struct VaultEntry {
    pub path: NotePath,
    /// File-representation note; deck derived from folder placement.
    pub note: Note,
    /// Modification signal: max of mtime and creation time, unix seconds.
    pub modified_at: i64,
}

/// A file carrying the sync sentinel that failed to parse.
#[derive(Debug, Clone)]
pub struct MalformedEntry {
    pub path: PathBuf,
    pub note_id: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub entries: Vec<VaultEntry>,
    pub malformed: Vec<MalformedEntry>,
    /// (id, path) pairs ignored this pass because another file claimed the
    /// same id first.
    pub duplicates: Vec<(i64, PathBuf)>,
}

/// The markdown side of the sync: a root folder of note files plus the
/// reserved subfolders for templates, trash and attachments.
pub struct Vault {
    root: PathBuf,
    templates_dir: PathBuf,
    trash_dir: PathBuf,
    attachments_dir: PathBuf,
}

impl Vault {
    pub fn open(
        root: impl AsRef<Path>,
        templates_folder: &str,
        trash_folder: &str,
        attachments_folder: &str,
    ) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            std::fs::create_dir_all(&root)
                .with_context(|| format!("Failed to create vault root {}", root.display()))?;
        }
        Ok(Self {
            templates_dir: root.join(templates_folder),
            trash_dir: root.join(trash_folder),
            attachments_dir: root.join(attachments_folder),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn attachments_dir(&self) -> &Path {
        &self.attachments_dir
    }

    /// Walk the vault and parse every synchronized note file.
    ///
    /// Reserved subfolders and hidden files are skipped; markdown files
    /// without the sync sentinel are left alone. Duplicate ids keep the
    /// first file encountered (walk order is sorted, so this is stable).
    pub fn scan(&self) -> Result<ScanResult> {
        let mut result = ScanResult::default();
        let mut seen_ids: HashMap<i64, PathBuf> = HashMap::new();

        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.path()))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("md") {
                continue;
            }
            if path.starts_with(&self.templates_dir)
                || path.starts_with(&self.trash_dir)
                || path.starts_with(&self.attachments_dir)
            {
                continue;
            }

            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read note file {}", path.display()))?;
            if !note_file::is_synced_note(&content) {
                continue;
            }

            match note_file::parse_note_file(&content) {
                Ok(mut note) => {
                    for field in &mut note.fields {
                        field.references =
                            crate::infrastructure::media::extract_markup_references(&field.text);
                    }
                    if note.id != 0 {
                        if let Some(first) = seen_ids.get(&note.id) {
                            warn!(
                                id = note.id,
                                first = %first.display(),
                                duplicate = %path.display(),
                                "Duplicate note id in vault; keeping first file"
                            );
                            result.duplicates.push((note.id, path.to_path_buf()));
                            continue;
                        }
                        seen_ids.insert(note.id, path.to_path_buf());
                    }
                    note.deck = self.deck_for(path);
                    result.entries.push(VaultEntry {
                        path: self.note_path(path),
                        note,
                        modified_at: file_modified_at(path)?,
                    });
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Malformed note file");
                    result.malformed.push(MalformedEntry {
                        path: path.to_path_buf(),
                        note_id: note_file::extract_note_id(&content),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Deck derived from a note file's folder placement relative to the
    /// root, nested folders joined with `::`.
    pub fn deck_for(&self, path: &Path) -> String {
        let parent = path.parent().unwrap_or(&self.root);
        let relative = parent.strip_prefix(&self.root).unwrap_or(Path::new(""));
        let parts: Vec<&str> = relative
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        if parts.is_empty() {
            "Default".to_string()
        } else {
            parts.join("::")
        }
    }

    /// Folder, relative to the root, that a deck maps to.
    pub fn folder_for_deck(&self, deck: &str) -> PathBuf {
        if deck.is_empty() || deck == "Default" {
            PathBuf::new()
        } else {
            deck.split("::").collect()
        }
    }

    pub fn note_path(&self, absolute: &Path) -> NotePath {
        let relative = absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .to_path_buf();
        NotePath::new(&self.root, relative)
    }

    /// Whole-file write; creates parent folders as needed.
    pub fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create folder {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write note file {}", path.display()))
    }

    /// Move a file into the trash subfolder instead of deleting outright.
    pub fn trash_file(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.trash_dir)
            .with_context(|| format!("Failed to create trash folder {}", self.trash_dir.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed.md".to_string());
        let mut target = self.trash_dir.join(&name);
        let mut counter = 1;
        while target.exists() {
            target = self.trash_dir.join(format!("{counter} {name}"));
            counter += 1;
        }
        std::fs::rename(path, &target)
            .with_context(|| format!("Failed to move {} to trash", path.display()))?;
        debug!(from = %path.display(), to = %target.display(), "Trashed file");
        Ok(())
    }

    /// Index of every file in the vault by base name, for the reference
    /// resolver's ambiguity checks. Trash is excluded; attachments are not.
    pub fn file_index(&self) -> HashMap<String, Vec<PathBuf>> {
        let mut index: HashMap<String, Vec<PathBuf>> = HashMap::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.path()))
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.starts_with(&self.trash_dir) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                index
                    .entry(name.to_string())
                    .or_default()
                    .push(path.to_path_buf());
            }
        }
        index
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

pub fn file_modified_at(path: &Path) -> Result<i64> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let created = metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(mtime.max(created))
}
