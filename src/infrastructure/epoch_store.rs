// src/infrastructure/epoch_store.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persistent synchronization metadata: the epoch timestamp of the last
/// successful pass and the set of note ids known to be synced.
///
/// Stored as JSON beside the vault. Constructor-injected into the
/// orchestrator; `begin_pass` hands out an immutable baseline and only
/// `commit_pass` advances and persists state, so an aborted pass leaves the
/// previous epoch in place.
#[derive(Debug)]
pub struct EpochStore {
    path: PathBuf,
    state: EpochState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpochState {
    pub last_sync: i64,
    pub synced_ids: BTreeSet<i64>,
}

/// Snapshot taken at pass start; the change detector classifies against
/// this, never against live state.
#[derive(Debug, Clone)]
pub struct PassBaseline {
    pub epoch: i64,
    pub synced_ids: BTreeSet<i64>,
}

impl EpochStore {
    /// Load from file, or start empty if the file doesn't exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .context("Failed to read sync state file")?;
            serde_json::from_str(&content).context("Failed to parse sync state JSON")?
        } else {
            EpochState::default()
        };
        Ok(Self { path, state })
    }

    pub fn begin_pass(&self) -> PassBaseline {
        debug!(epoch = self.state.last_sync, ids = self.state.synced_ids.len(), "Beginning sync pass");
        PassBaseline {
            epoch: self.state.last_sync,
            synced_ids: self.state.synced_ids.clone(),
        }
    }

    /// Advance the epoch and persist; called only after a fully successful
    /// pass, so there is no partial advancement.
    pub fn commit_pass(&mut self, epoch: i64, synced_ids: BTreeSet<i64>) -> Result<()> {
        self.state.last_sync = epoch;
        self.state.synced_ids = synced_ids;

        let json = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize sync state")?;
        std::fs::write(&self.path, json).context("Failed to write sync state file")?;
        debug!(epoch, "Committed sync pass");
        Ok(())
    }

    pub fn last_sync(&self) -> i64 {
        self.state.last_sync
    }

    pub fn synced_ids(&self) -> &BTreeSet<i64> {
        &self.state.synced_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn given_no_file_when_loading_then_starts_empty() {
        let temp = TempDir::new().unwrap();
        let store = EpochStore::load(temp.path().join("state.json")).unwrap();

        assert_eq!(store.last_sync(), 0);
        assert!(store.synced_ids().is_empty());
    }

    #[test]
    fn given_committed_pass_when_reloading_then_state_persists() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut store = EpochStore::load(&path).unwrap();
        store
            .commit_pass(1754560800, BTreeSet::from([1, 2, 3]))
            .unwrap();

        let reloaded = EpochStore::load(&path).unwrap();
        assert_eq!(reloaded.last_sync(), 1754560800);
        assert_eq!(reloaded.synced_ids(), &BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn given_baseline_when_committing_later_then_baseline_is_unaffected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut store = EpochStore::load(&path).unwrap();
        store.commit_pass(100, BTreeSet::from([1])).unwrap();

        let baseline = store.begin_pass();
        store.commit_pass(200, BTreeSet::from([1, 2])).unwrap();

        assert_eq!(baseline.epoch, 100);
        assert_eq!(baseline.synced_ids, BTreeSet::from([1]));
        assert_eq!(store.last_sync(), 200);
    }

    #[test]
    fn given_uncommitted_changes_when_reloading_then_old_state_remains() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");

        let mut store = EpochStore::load(&path).unwrap();
        store.commit_pass(100, BTreeSet::from([1])).unwrap();

        // A new pass begins but never commits.
        let _baseline = store.begin_pass();
        drop(store);

        let reloaded = EpochStore::load(&path).unwrap();
        assert_eq!(reloaded.last_sync(), 100);
    }
}
