// src/constants.rs
//
// Application-wide constants extracted from magic numbers throughout the codebase.
// Each constant is documented with its purpose and usage context.

/// Maximum length, in bytes, of a generated note file name (without extension).
///
/// Derived names longer than this are truncated on a char boundary so that a
/// collision suffix (the note id or a random token) still fits within common
/// filesystem limits.
///
/// Used in: `infrastructure/path_builder.rs`
pub const MAX_FILENAME_LEN: usize = 120;

/// Length of the random alphanumeric token appended as the last-resort
/// collision suffix.
///
/// Used in: `infrastructure/path_builder.rs`
pub const RANDOM_SUFFIX_LEN: usize = 8;

/// Datetime format used for `date_modified` / `date_synced` in the property
/// block of note and template files.
///
/// Used in: `infrastructure/note_file.rs`
pub const PROPERTY_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Files up to this size are compared byte-for-byte when checking whether an
/// attachment already exists on the target side. Larger files are compared
/// by streaming SHA-256.
///
/// Used in: `infrastructure/media.rs`
pub const FULL_COMPARE_MAX_BYTES: u64 = 64 * 1024;

/// Chunk size for the streaming hash comparison of large attachments.
///
/// Used in: `infrastructure/media.rs`
pub const HASH_CHUNK_BYTES: usize = 8 * 1024;

/// Sentinel line marking a markdown file as a synchronized note.
///
/// Files without this line directly after the property block are ignored by
/// the vault walk.
///
/// Used in: `infrastructure/note_file.rs`, `infrastructure/vault.rs`
pub const SYNC_SENTINEL: &str = "<!--notebridge-->";

/// Sentinel comment opening each field block inside a note file.
///
/// Used in: `infrastructure/note_file.rs`
pub const FIELD_SENTINEL: &str = "<!--field-->";

/// Note id reserved for "not yet created on the structured side".
///
/// Used in: `domain/note.rs`, `application/orchestrator.rs`
pub const SENTINEL_NOTE_ID: i64 = 0;
