// src/application/orchestrator.rs
use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::application::change_detector::{self, ChangeKind};
use crate::application::store::{NoteLookup, NoteStore};
use crate::domain::{Model, Note};
use crate::infrastructure::config::Config;
use crate::infrastructure::epoch_store::EpochStore;
use crate::infrastructure::markup::{self, sanitize_html, to_html::link_stem};
use crate::infrastructure::media::ReferenceResolver;
use crate::infrastructure::note_file::serialize_note;
use crate::infrastructure::path_builder::build_note_path;
use crate::infrastructure::vault::{Vault, VaultEntry};
use crate::util::time::now_unix;

/// Name of the sync-state file kept at the vault root.
const STATE_FILE_NAME: &str = ".notebridge.json";

/// Outcome counters and warnings of one pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub files_created: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub notes_created: usize,
    pub notes_updated: usize,
    pub notes_deleted: usize,
    pub conflicts_resolved: usize,
    pub templates_written: usize,
    pub warnings: Vec<String>,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "files: {} created, {} updated, {} deleted | notes: {} created, {} updated, {} deleted | {} conflicts, {} templates",
            self.files_created,
            self.files_updated,
            self.files_deleted,
            self.notes_created,
            self.notes_updated,
            self.notes_deleted,
            self.conflicts_resolved,
            self.templates_written,
        )];
        for warning in &self.warnings {
            lines.push(format!("warning: {warning}"));
        }
        lines.join("\n")
    }
}

/// Dry-run classification counts for the `status` command.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub structured_new: usize,
    pub structured_updated: usize,
    pub structured_unchanged: usize,
    pub structured_deleted: usize,
    pub files_new: usize,
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub corrupted: usize,
}

impl StatusReport {
    pub fn summary(&self) -> String {
        format!(
            "structured side: {} new, {} updated, {} unchanged, {} deleted\n\
             file side:       {} new, {} updated, {} unchanged\n\
             problems:        {} malformed, {} duplicate ids, {} corrupted records",
            self.structured_new,
            self.structured_updated,
            self.structured_unchanged,
            self.structured_deleted,
            self.files_new,
            self.files_updated,
            self.files_unchanged,
            self.malformed,
            self.duplicates,
            self.corrupted,
        )
    }
}

/// Which side overwrites the other when a note exists on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictWinner {
    Structured,
    File,
    Neither,
}

/// The tie-break for a note present on both sides.
///
/// 1. If the structured-side timestamp differs from the one embedded in the
///    file at last write, the side strictly newer than the file's on-disk
///    mtime wins.
/// 2. Else, an on-disk mtime past the epoch means a file-only metadata edit:
///    the file wins.
/// 3. Else, differing non-timestamped properties are informational exports:
///    the structured side wins.
///
/// Resolution is always whole-note; field-level diffs are never merged.
pub fn resolve_conflict(
    structured_modified: i64,
    embedded_modified: i64,
    file_modified_at: i64,
    epoch: i64,
    properties_differ: bool,
) -> ConflictWinner {
    if structured_modified != embedded_modified {
        if structured_modified > file_modified_at {
            ConflictWinner::Structured
        } else {
            ConflictWinner::File
        }
    } else if file_modified_at > epoch {
        ConflictWinner::File
    } else if properties_differ {
        ConflictWinner::Structured
    } else {
        ConflictWinner::Neither
    }
}

/// Drives one synchronization pass: snapshot both sides, decide an action
/// per note id, materialize it through the translator/resolver/builder.
pub struct SyncOrchestrator<'a, S: NoteStore> {
    store: &'a mut S,
    vault: Vault,
    epoch: EpochStore,
    config: Config,
}

impl<'a, S: NoteStore> SyncOrchestrator<'a, S> {
    pub fn new(store: &'a mut S, config: Config) -> Result<Self> {
        config.validate()?;
        let vault = Vault::open(
            config.vault_root(),
            &config.vault.templates_folder,
            &config.vault.trash_folder,
            &config.vault.attachments_folder,
        )?;
        let epoch = EpochStore::load(vault.root().join(STATE_FILE_NAME))?;
        Ok(Self {
            store,
            vault,
            epoch,
            config,
        })
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Run one pass to completion. Any error aborts the pass without
    /// advancing the epoch; writes already made stay (the next pass
    /// re-derives state from current timestamps).
    pub fn run_pass(&mut self) -> Result<SyncReport> {
        self.config.validate()?;
        let baseline = self.epoch.begin_pass();
        let mut report = SyncReport::default();
        let mut synced_ids = baseline.synced_ids.clone();
        let mut resolver = ReferenceResolver::new(&self.vault);

        let scan = self.vault.scan()?;
        for (id, path) in &scan.duplicates {
            report.warnings.push(format!(
                "duplicate note id {id} in {}; file ignored this pass",
                path.display()
            ));
        }

        // Snapshot the structured side once.
        let mut structured: BTreeMap<i64, Note> = BTreeMap::new();
        let mut corrupted: BTreeSet<i64> = BTreeSet::new();
        for id in self.store.note_ids()? {
            match self.store.get_note(id)? {
                NoteLookup::Found(note) => {
                    structured.insert(id, *note);
                }
                NoteLookup::Corrupted => {
                    corrupted.insert(id);
                }
                NoteLookup::NotFound => {}
            }
        }

        // Self-heal malformed files before classification: trash them and
        // rebuild from the structured side where the id is recoverable.
        let mut healed: BTreeSet<i64> = BTreeSet::new();
        for malformed in &scan.malformed {
            warn!(
                path = %malformed.path.display(),
                reason = %malformed.reason,
                "Malformed note file; deleting and rebuilding"
            );
            report.warnings.push(format!(
                "malformed note file {} rebuilt from the structured side",
                malformed.path.display()
            ));
            self.vault.trash_file(&malformed.path)?;
            match malformed.note_id {
                Some(id) if structured.contains_key(&id) => {
                    let note = structured[&id].clone();
                    self.push_structured_to_file(note, None, &mut resolver, &mut report)?;
                    synced_ids.insert(id);
                    healed.insert(id);
                }
                Some(id) => {
                    synced_ids.remove(&id);
                }
                None => {}
            }
        }

        let mut file_by_id: BTreeMap<i64, VaultEntry> = BTreeMap::new();
        let mut unregistered: Vec<VaultEntry> = Vec::new();
        for entry in scan.entries {
            if entry.note.is_unregistered() {
                unregistered.push(entry);
            } else if !healed.contains(&entry.note.id) {
                file_by_id.insert(entry.note.id, entry);
            }
        }
        let file_ids: BTreeSet<i64> = file_by_id.keys().copied().collect();

        let structured_changes = change_detector::classify_structured(&structured, &baseline);
        let entries_snapshot: Vec<VaultEntry> = file_by_id.values().cloned().collect();
        let file_changes = change_detector::classify_files(&entries_snapshot, &baseline);

        // New files with the sentinel id become structured notes; the
        // assigned id is written back into the file within the same pass.
        for entry in unregistered {
            self.adopt_file(entry, &mut resolver, &mut report, &mut synced_ids, None)?;
        }

        // Process the id union to exhaustion.
        let all_ids: BTreeSet<i64> = structured
            .keys()
            .chain(file_by_id.keys())
            .copied()
            .collect();
        for id in all_ids {
            if healed.contains(&id) {
                // Already rebuilt this pass; the scan predates the rebuild.
                synced_ids.insert(id);
                continue;
            }
            if corrupted.contains(&id) {
                if let Some(entry) = file_by_id.remove(&id) {
                    warn!(id, "Corrupted structured record; rebuilding from file");
                    report
                        .warnings
                        .push(format!("corrupted structured record {id} rebuilt from file"));
                    self.push_file_to_store(&entry, &mut resolver, &mut report)?;
                    synced_ids.insert(id);
                } else {
                    report
                        .warnings
                        .push(format!("corrupted structured record {id} skipped"));
                }
                continue;
            }

            match (structured.get(&id), file_by_id.remove(&id)) {
                (Some(s_note), Some(entry)) => {
                    if structured_changes.kind(id) == Some(ChangeKind::Updated)
                        && file_changes.kind(id) == Some(ChangeKind::Updated)
                    {
                        report.conflicts_resolved += 1;
                    }

                    let properties_differ = !s_note.properties_eq(&entry.note);
                    match resolve_conflict(
                        s_note.date_modified,
                        entry.note.date_modified,
                        entry.modified_at,
                        baseline.epoch,
                        properties_differ,
                    ) {
                        ConflictWinner::Structured => {
                            debug!(id, "Conflict resolved for the structured side");
                            self.push_structured_to_file(
                                s_note.clone(),
                                Some(&entry),
                                &mut resolver,
                                &mut report,
                            )?;
                        }
                        ConflictWinner::File => {
                            debug!(id, "Conflict resolved for the file side");
                            self.push_file_to_store(&entry, &mut resolver, &mut report)?;
                        }
                        ConflictWinner::Neither => {}
                    }
                    synced_ids.insert(id);
                }
                (Some(s_note), None) => {
                    if structured_changes.kind(id) != Some(ChangeKind::New) {
                        // Previously synced, file gone: a file-side deletion.
                        info!(id, "Note file removed; deleting structured note");
                        self.store
                            .delete_note(id)
                            .with_context(|| format!("Failed to delete note {id}"))?;
                        report.notes_deleted += 1;
                        synced_ids.remove(&id);
                    } else {
                        self.push_structured_to_file(
                            s_note.clone(),
                            None,
                            &mut resolver,
                            &mut report,
                        )?;
                        synced_ids.insert(id);
                    }
                }
                (None, Some(entry)) => {
                    if file_changes.kind(id) != Some(ChangeKind::New) {
                        // Previously synced, structured note gone: a
                        // structured-side deletion.
                        info!(id, path = %entry.path.relative.display(), "Structured note removed; trashing file");
                        self.vault.trash_file(&entry.path.absolute)?;
                        report.files_deleted += 1;
                        synced_ids.remove(&id);
                    } else {
                        // A real id the store has never seen and did not just
                        // delete: file-side recreation. Reusing the stale id
                        // would bypass the store's allocator, so the note is
                        // recreated under a fresh id and the remap logged.
                        let new_id = self.adopt_file(
                            entry,
                            &mut resolver,
                            &mut report,
                            &mut synced_ids,
                            Some(id),
                        )?;
                        warn!(old_id = id, new_id, "Recreated structured note under fresh id");
                    }
                }
                (None, None) => {}
            }
        }

        // Ids that vanished from both sides since the last pass.
        for id in &baseline.synced_ids {
            if !structured.contains_key(id) && !corrupted.contains(id) && !file_ids.contains(id) {
                synced_ids.remove(id);
            }
        }

        crate::application::template_sync::sync_templates(
            self.store,
            &self.vault,
            &self.config,
            &mut report,
        )?;

        self.epoch.commit_pass(now_unix(), synced_ids)?;
        info!(summary = %report.summary(), "Sync pass complete");
        Ok(report)
    }

    /// Classify both sides without writing anything.
    pub fn status(&mut self) -> Result<StatusReport> {
        self.config.validate()?;
        let baseline = self.epoch.begin_pass();
        let scan = self.vault.scan()?;

        let mut structured: BTreeMap<i64, Note> = BTreeMap::new();
        let mut corrupted = 0usize;
        for id in self.store.note_ids()? {
            match self.store.get_note(id)? {
                NoteLookup::Found(note) => {
                    structured.insert(id, *note);
                }
                NoteLookup::Corrupted => corrupted += 1,
                NoteLookup::NotFound => {}
            }
        }

        let structured_changes = change_detector::classify_structured(&structured, &baseline);
        let file_changes = change_detector::classify_files(&scan.entries, &baseline);

        Ok(StatusReport {
            structured_new: structured_changes.count(ChangeKind::New),
            structured_updated: structured_changes.count(ChangeKind::Updated),
            structured_unchanged: structured_changes.count(ChangeKind::Unchanged),
            structured_deleted: structured_changes.count(ChangeKind::Deleted),
            files_new: file_changes.count(ChangeKind::New),
            files_updated: file_changes.count(ChangeKind::Updated),
            files_unchanged: file_changes.count(ChangeKind::Unchanged),
            malformed: scan.malformed.len(),
            duplicates: scan.duplicates.len(),
            corrupted,
        })
    }

    /// Sanitize a structured note and write it to the file side, creating
    /// the file or overwriting the existing one.
    fn push_structured_to_file(
        &mut self,
        note: Note,
        existing: Option<&VaultEntry>,
        resolver: &mut ReferenceResolver,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut note = note;

        // The file side can only hold what survives a markup round-trip;
        // sanitizing may itself rewrite the structured side once.
        let mut store_dirty = false;
        for field in &mut note.fields {
            let clean = sanitize_html(&field.text);
            if clean != field.text {
                field.text = clean;
                store_dirty = true;
            }
        }
        let tags_before = note.tags.clone();
        note.dedup_tags();
        if note.tags != tags_before {
            store_dirty = true;
        }
        if store_dirty {
            debug!(id = note.id, "Sanitizing rewrote structured content");
            self.store
                .update_note(&note)
                .with_context(|| format!("Failed to write sanitized note {}", note.id))?;
            note = self
                .store
                .get_note(note.id)?
                .found()
                .ok_or_else(|| anyhow!("note {} vanished during sanitize", note.id))?;
            report.notes_updated += 1;
        }

        let mut file_note = markup::note_to_file_repr(&note);
        if let Some(linkback) = self.config.active_linkback() {
            file_note.fields.retain(|f| f.name != linkback);
        }

        let note_dir: PathBuf = match existing {
            Some(entry) => entry
                .path
                .absolute
                .parent()
                .unwrap_or_else(|| self.vault.root())
                .to_path_buf(),
            None => self.vault.root().join(self.vault.folder_for_deck(&note.deck)),
        };
        for field in &mut file_note.fields {
            let (text, references) = resolver.localize_markup_for_vault(
                &field.text,
                &note_dir,
                self.store.media_dir(),
                self.config.sync.create_missing_attachments,
            )?;
            field.text = text;
            field.references = references;
        }

        match existing {
            Some(entry) => {
                let deck_changed = entry.note.deck != note.deck;
                let stamps_stale = entry.note.date_modified != note.date_modified;
                if !deck_changed && !stamps_stale && file_note.content_eq(&entry.note) {
                    // Equality gate: nothing writeable changed, leave the
                    // file byte-identical.
                    return Ok(());
                }

                file_note.date_synced = now_unix();
                if deck_changed {
                    let path = build_note_path(&self.vault, &file_note)?;
                    self.vault.write_file(
                        &path.absolute,
                        &serialize_note(&file_note, self.config.vault.heading_level),
                    )?;
                    std::fs::remove_file(&entry.path.absolute).with_context(|| {
                        format!("Failed to remove moved note file {}", entry.path.absolute.display())
                    })?;
                    debug!(
                        id = note.id,
                        from = %entry.path.relative.display(),
                        to = %path.relative.display(),
                        "Moved note file for deck change"
                    );
                } else {
                    self.vault.write_file(
                        &entry.path.absolute,
                        &serialize_note(&file_note, self.config.vault.heading_level),
                    )?;
                }
                report.files_updated += 1;
            }
            None => {
                file_note.date_synced = now_unix();
                let path = build_note_path(&self.vault, &file_note)?;
                self.vault.write_file(
                    &path.absolute,
                    &serialize_note(&file_note, self.config.vault.heading_level),
                )?;
                report.files_created += 1;
            }
        }
        Ok(())
    }

    /// Push a file-side note into the structured store (whole-note
    /// overwrite), then refresh the file's embedded stamps so both sides
    /// agree next pass.
    fn push_file_to_store(
        &mut self,
        entry: &VaultEntry,
        resolver: &mut ReferenceResolver,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut note = self.structured_note_from_entry(entry, resolver)?;
        note.id = entry.note.id;

        self.store
            .update_note(&note)
            .with_context(|| format!("Failed to update note {}", note.id))?;
        report.notes_updated += 1;

        self.restamp_file(entry, note.id)?;
        Ok(())
    }

    /// Create a structured note from a file (sentinel id or recreation),
    /// then write the assigned id back into the file.
    fn adopt_file(
        &mut self,
        entry: VaultEntry,
        resolver: &mut ReferenceResolver,
        report: &mut SyncReport,
        synced_ids: &mut BTreeSet<i64>,
        remap_from: Option<i64>,
    ) -> Result<i64> {
        let mut note = self.structured_note_from_entry(&entry, resolver)?;
        note.id = 0;

        let id = self
            .store
            .create_note(&note)
            .with_context(|| format!("Failed to create note for {}", entry.path.relative.display()))?;
        report.notes_created += 1;

        self.restamp_file(&entry, id)?;
        synced_ids.insert(id);

        if let Some(old_id) = remap_from {
            report.warnings.push(format!(
                "note id {old_id} in {} is unknown to the store; recreated as {id}",
                entry.path.relative.display()
            ));
        }
        Ok(id)
    }

    /// Build the structured representation of a file entry: convert markup,
    /// localize references into the store's media namespace, resolve the
    /// model and fill the link-back field.
    fn structured_note_from_entry(
        &mut self,
        entry: &VaultEntry,
        resolver: &mut ReferenceResolver,
    ) -> Result<Note> {
        let mut note = markup::note_to_structured_repr(&entry.note);
        note.dedup_tags();

        let note_dir = entry
            .path
            .absolute
            .parent()
            .unwrap_or_else(|| self.vault.root())
            .to_path_buf();
        for field in &mut note.fields {
            let (text, references) =
                resolver.localize_html_for_store(&field.text, &note_dir, self.store.media_dir())?;
            field.text = text;
            field.references = references;
        }

        note.model_id = self.resolve_model(&note)?;
        if let Some(linkback) = self.config.active_linkback() {
            let relative = entry.path.relative.to_string_lossy().replace('\\', "/");
            let stem = link_stem(&relative);
            note.set_field_text(
                linkback,
                format!(r#"<a href="vault://{relative}">{stem}</a>"#),
            );
        }
        Ok(note)
    }

    /// Rewrite a file's property block so the embedded `date_modified`
    /// matches the store and `date_synced` records this pass.
    fn restamp_file(&mut self, entry: &VaultEntry, id: i64) -> Result<()> {
        let stored = self
            .store
            .get_note(id)?
            .found()
            .ok_or_else(|| anyhow!("note {id} vanished during sync"))?;

        let mut file_note = entry.note.clone();
        file_note.id = id;
        file_note.date_modified = stored.date_modified;
        file_note.date_synced = now_unix();
        self.vault.write_file(
            &entry.path.absolute,
            &serialize_note(&file_note, self.config.vault.heading_level),
        )
    }

    /// Map a file's model name onto a store model, creating the schema
    /// (with a plain front/back display template) when the store has never
    /// seen it.
    fn resolve_model(&mut self, note: &Note) -> Result<i64> {
        if let Some(model) = self.store.model_by_name(&note.model_name)? {
            return Ok(model.id);
        }

        let field_names: Vec<String> = note.fields.iter().map(|f| f.name.clone()).collect();
        let question = field_names
            .first()
            .map(|n| format!("{{{{{n}}}}}"))
            .unwrap_or_default();
        let answer = match field_names.get(1) {
            Some(second) => format!("{question}<hr>{{{{{second}}}}}"),
            None => question.clone(),
        };
        let model = Model {
            id: 0,
            name: note.model_name.clone(),
            field_names,
            templates: vec![crate::domain::DisplayTemplate {
                name: "Card 1".to_string(),
                question,
                answer,
            }],
            date_modified: 0,
        };
        let id = self.store.create_model(&model)?;
        info!(name = %model.name, id, "Created model from file-side schema");
        Ok(id)
    }
}
