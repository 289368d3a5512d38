// src/application/change_detector.rs
use std::collections::BTreeMap;

use crate::domain::Note;
use crate::infrastructure::epoch_store::PassBaseline;
use crate::infrastructure::vault::VaultEntry;

/// Classification of one note id on one side, relative to the last
/// synchronization epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Exists only on this side: sentinel id, or first appearance after
    /// the epoch.
    New,
    /// Known id whose modification signal exceeds the epoch.
    Updated,
    Unchanged,
    /// Structured side only: previously synced id no longer present.
    Deleted,
}

#[derive(Debug, Default)]
pub struct SideChanges {
    pub kinds: BTreeMap<i64, ChangeKind>,
}

impl SideChanges {
    pub fn kind(&self, id: i64) -> Option<ChangeKind> {
        self.kinds.get(&id).copied()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.kinds.values().filter(|k| **k == kind).count()
    }

    pub fn deleted_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.kinds
            .iter()
            .filter(|(_, k)| **k == ChangeKind::Deleted)
            .map(|(id, _)| *id)
    }
}

/// Classify the structured side: every present note by its edit timestamp,
/// plus a `Deleted` entry for every previously synced id that is gone.
pub fn classify_structured(notes: &BTreeMap<i64, Note>, baseline: &PassBaseline) -> SideChanges {
    let mut changes = SideChanges::default();
    for (id, note) in notes {
        let kind = if !baseline.synced_ids.contains(id) {
            ChangeKind::New
        } else if note.date_modified > baseline.epoch {
            ChangeKind::Updated
        } else {
            ChangeKind::Unchanged
        };
        changes.kinds.insert(*id, kind);
    }
    for id in &baseline.synced_ids {
        if !notes.contains_key(id) {
            changes.kinds.insert(*id, ChangeKind::Deleted);
        }
    }
    changes
}

/// Classify the file side by modification signal (mtime/creation time).
/// Sentinel-id entries are always `New`.
pub fn classify_files(entries: &[VaultEntry], baseline: &PassBaseline) -> SideChanges {
    let mut changes = SideChanges::default();
    for entry in entries {
        let id = entry.note.id;
        let kind = if id == 0 || !baseline.synced_ids.contains(&id) {
            ChangeKind::New
        } else if entry.modified_at > baseline.epoch {
            ChangeKind::Updated
        } else {
            ChangeKind::Unchanged
        };
        // Sentinel-id entries share id 0; New either way.
        changes.kinds.insert(id, kind);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Field, NotePath};
    use std::collections::BTreeSet;
    use std::path::Path;

    fn baseline(epoch: i64, ids: &[i64]) -> PassBaseline {
        PassBaseline {
            epoch,
            synced_ids: BTreeSet::from_iter(ids.iter().copied()),
        }
    }

    fn note(id: i64, date_modified: i64) -> Note {
        Note {
            id,
            model_id: 1,
            model_name: "Basic".to_string(),
            deck: "Default".to_string(),
            fields: vec![Field::structured("Front", "f")],
            tags: vec![],
            suspended: false,
            difficulty: 2.5,
            date_modified,
            date_synced: 0,
        }
    }

    fn entry(id: i64, modified_at: i64) -> VaultEntry {
        VaultEntry {
            path: NotePath::new(Path::new("/vault"), "note.md"),
            note: note(id, 0),
            modified_at,
        }
    }

    #[test]
    fn given_never_synced_id_when_classifying_structured_then_new() {
        let notes = BTreeMap::from([(5, note(5, 50))]);
        let changes = classify_structured(&notes, &baseline(100, &[]));

        assert_eq!(changes.kind(5), Some(ChangeKind::New));
    }

    #[test]
    fn given_edit_after_epoch_when_classifying_structured_then_updated() {
        let notes = BTreeMap::from([(5, note(5, 150))]);
        let changes = classify_structured(&notes, &baseline(100, &[5]));

        assert_eq!(changes.kind(5), Some(ChangeKind::Updated));
    }

    #[test]
    fn given_edit_before_epoch_when_classifying_structured_then_unchanged() {
        let notes = BTreeMap::from([(5, note(5, 50))]);
        let changes = classify_structured(&notes, &baseline(100, &[5]));

        assert_eq!(changes.kind(5), Some(ChangeKind::Unchanged));
    }

    #[test]
    fn given_synced_id_missing_when_classifying_structured_then_deleted() {
        let notes = BTreeMap::new();
        let changes = classify_structured(&notes, &baseline(100, &[5]));

        assert_eq!(changes.kind(5), Some(ChangeKind::Deleted));
        assert_eq!(changes.deleted_ids().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn given_edit_exactly_at_epoch_when_classifying_then_unchanged() {
        // The epoch itself is not "after" the epoch.
        let notes = BTreeMap::from([(5, note(5, 100))]);
        let changes = classify_structured(&notes, &baseline(100, &[5]));

        assert_eq!(changes.kind(5), Some(ChangeKind::Unchanged));
    }

    #[test]
    fn given_sentinel_id_file_when_classifying_then_new() {
        let changes = classify_files(&[entry(0, 50)], &baseline(100, &[]));

        assert_eq!(changes.kind(0), Some(ChangeKind::New));
    }

    #[test]
    fn given_file_touched_after_epoch_when_classifying_then_updated() {
        let changes = classify_files(&[entry(7, 150)], &baseline(100, &[7]));

        assert_eq!(changes.kind(7), Some(ChangeKind::Updated));
    }

    #[test]
    fn given_file_untouched_since_epoch_when_classifying_then_unchanged() {
        let changes = classify_files(&[entry(7, 90)], &baseline(100, &[7]));

        assert_eq!(changes.kind(7), Some(ChangeKind::Unchanged));
    }

    #[test]
    fn given_unknown_real_id_file_when_classifying_then_new() {
        let changes = classify_files(&[entry(7, 90)], &baseline(100, &[]));

        assert_eq!(changes.kind(7), Some(ChangeKind::New));
    }

    #[test]
    fn given_mixed_changes_when_counting_then_counts_per_kind() {
        let notes = BTreeMap::from([(1, note(1, 150)), (2, note(2, 50)), (3, note(3, 10))]);
        let changes = classify_structured(&notes, &baseline(100, &[1, 2, 4]));

        assert_eq!(changes.count(ChangeKind::Updated), 1);
        assert_eq!(changes.count(ChangeKind::Unchanged), 1);
        assert_eq!(changes.count(ChangeKind::New), 1);
        assert_eq!(changes.count(ChangeKind::Deleted), 1);
    }
}
