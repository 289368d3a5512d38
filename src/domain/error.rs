// src/domain/error.rs
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Note not found: {0}")]
    NoteNotFound(i64),
    #[error("Model not found: {0}")]
    ModelNotFound(i64),
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Malformed note file {path}: {reason}")]
    MalformedFile { path: PathBuf, reason: String },
    #[error("Cannot resolve reference '{target}': not found in vault and creation is not permitted")]
    UnresolvableReference { target: String },
    #[error("Filename collision could not be resolved for '{0}' even with a random suffix")]
    FilenameCollision(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
