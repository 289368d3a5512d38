// src/application/mod.rs
pub mod change_detector;
pub mod orchestrator;
pub mod store;
pub mod template_sync;

pub use change_detector::{ChangeKind, SideChanges};
pub use orchestrator::{ConflictWinner, StatusReport, SyncOrchestrator, SyncReport};
pub use store::{NoteLookup, NoteStore};
