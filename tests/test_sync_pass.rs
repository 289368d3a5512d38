mod helpers;

use helpers::{basic_store, SyncFixture};
use notebridge::application::NoteStore;
use notebridge::infrastructure::note_file::parse_note_file;
use notebridge::util::testing::MemoryNoteStore;

#[test]
fn given_new_structured_note_when_syncing_then_creates_file_with_expected_shape() {
    let fixture = SyncFixture::new();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(SyncFixture::structured_note(101, "Some front", "Some back"))
        .build();

    let report = fixture.run_pass(&mut store).unwrap();

    assert_eq!(report.files_created, 1);
    let files = fixture.note_files();
    assert_eq!(files.len(), 1);

    let content = std::fs::read_to_string(&files[0]).unwrap();
    let parsed = parse_note_file(&content).unwrap();
    assert_eq!(parsed.id, 101);
    assert_eq!(parsed.fields.len(), 2);
    // Field blocks appear in declared order.
    assert_eq!(parsed.fields[0].name, "Front");
    assert_eq!(parsed.fields[0].text, "Some front");
    assert_eq!(parsed.fields[1].name, "Back");
    assert_eq!(parsed.fields[1].text, "Some back");
    assert!(parsed.tags.is_empty());
    assert!(parsed.date_synced >= parsed.date_modified);
    // Exactly one property block.
    assert_eq!(content.matches("---\n").count(), 2);
}

#[test]
fn given_synced_vault_when_syncing_again_then_files_are_byte_identical() {
    let fixture = SyncFixture::new();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(SyncFixture::structured_note(101, "Some front", "Some back"))
        .build();

    fixture.run_pass(&mut store).unwrap();
    let files = fixture.note_files();
    let before = std::fs::read_to_string(&files[0]).unwrap();

    let report = fixture.run_pass(&mut store).unwrap();

    let after = std::fs::read_to_string(&files[0]).unwrap();
    assert_eq!(before, after);
    assert_eq!(report.files_created, 0);
    assert_eq!(report.files_updated, 0);
    assert_eq!(report.notes_updated, 0);
}

#[test]
fn given_two_notes_with_same_front_when_syncing_then_second_file_is_id_suffixed() {
    let fixture = SyncFixture::new();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(SyncFixture::structured_note(101, "Some front", "First"))
        .with_note(SyncFixture::structured_note(102, "Some front", "Second"))
        .build();

    fixture.run_pass(&mut store).unwrap();

    let names: Vec<String> = fixture
        .note_files()
        .iter()
        .map(|p| helpers::file_name_of(p))
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Some front.md".to_string()));
    assert!(names.contains(&"Some front 102.md".to_string()));
}

#[test]
fn given_deck_with_nesting_when_syncing_then_file_lands_in_deck_folder() {
    let fixture = SyncFixture::new();
    let mut note = SyncFixture::structured_note(101, "Ownership rules", "Back");
    note.deck = "Rust::Ownership".to_string();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(note)
        .build();

    fixture.run_pass(&mut store).unwrap();

    assert!(fixture
        .root
        .join("Rust/Ownership/Ownership rules.md")
        .is_file());
}

#[test]
fn given_structured_note_with_markup_noise_when_syncing_then_sanitizes_store_once() {
    let fixture = SyncFixture::new();
    // A stray wrapper the markup round-trip cannot represent; the sanitize
    // pass rewrites the structured side once.
    let mut note = SyncFixture::structured_note(101, "<div>Some front</div>", "Some back");
    note.fields[0].text = "<div>Some front</div>".to_string();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(note)
        .build();

    let report = fixture.run_pass(&mut store).unwrap();
    assert_eq!(report.notes_updated, 1);

    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.fields[0].text, "Some front");

    // A second pass changes nothing further.
    let report = fixture.run_pass(&mut store).unwrap();
    assert_eq!(report.notes_updated, 0);
    assert_eq!(report.files_updated, 0);
}

#[test]
fn given_tags_when_syncing_then_written_into_property_block() {
    let fixture = SyncFixture::new();
    let mut note = SyncFixture::structured_note(101, "Some front", "Some back");
    note.tags = vec!["rust".to_string(), "sync".to_string()];
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(note)
        .build();

    fixture.run_pass(&mut store).unwrap();

    let content = std::fs::read_to_string(&fixture.note_files()[0]).unwrap();
    assert!(content.contains("tags: [rust, sync]"));
}

#[test]
fn given_empty_vault_and_store_when_syncing_then_pass_is_a_noop() {
    let fixture = SyncFixture::new();
    let mut store = basic_store();

    let report = fixture.run_pass(&mut store).unwrap();

    assert_eq!(report.files_created, 0);
    assert_eq!(report.notes_created, 0);
    assert_eq!(report.notes_deleted, 0);
    // Only the Basic template file is produced.
    assert_eq!(report.templates_written, 1);
}
