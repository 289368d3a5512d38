mod helpers;

use helpers::SyncFixture;
use notebridge::application::NoteStore;
use notebridge::infrastructure::note_file::{parse_note_file, serialize_note};
use notebridge::util::testing::MemoryNoteStore;
use notebridge::util::time::now_unix;

fn synced_fixture() -> (SyncFixture, MemoryNoteStore) {
    let fixture = SyncFixture::new();
    let mut store = MemoryNoteStore::builder()
        .with_basic_model()
        .with_note(SyncFixture::structured_note(101, "Some front", "Some back"))
        .build();
    fixture.run_pass(&mut store).unwrap();
    (fixture, store)
}

#[test]
fn given_structured_edit_newer_than_file_when_syncing_then_structured_content_wins_on_both_sides()
{
    let (fixture, mut store) = synced_fixture();

    // Edit on the structured side, stamped after the file's mtime.
    let mut note = store.get_note(101).unwrap().found().unwrap();
    note.fields[1].text = "Edited on structured side".to_string();
    store.update_note(&note).unwrap();
    store.set_note_modified(101, now_unix() + 100);

    let report = fixture.run_pass(&mut store).unwrap();

    assert_eq!(report.files_updated, 1);
    let parsed = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    assert_eq!(parsed.fields[1].text, "Edited on structured side");
    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.fields[1].text, "Edited on structured side");
}

#[test]
fn given_file_edit_when_syncing_then_file_content_wins_on_both_sides() {
    let (fixture, mut store) = synced_fixture();

    // Edit the file body, keeping the embedded timestamps as written.
    let mut file_note = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    file_note.fields[1].text = "Edited in the vault".to_string();
    fixture.write_note_file("Some front.md", &file_note);
    // Same-second edits would hide behind the epoch otherwise.
    fixture.backdate_epoch(10);

    let report = fixture.run_pass(&mut store).unwrap();

    assert_eq!(report.notes_updated, 1);
    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.fields[1].text, "Edited in the vault");
    // The file's embedded stamps were refreshed to match the store.
    let parsed = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    assert_eq!(parsed.date_modified, stored.date_modified);
    assert_eq!(parsed.fields[1].text, "Edited in the vault");
}

#[test]
fn given_both_sides_changed_when_structured_is_newer_then_structured_wins_deterministically() {
    let (fixture, mut store) = synced_fixture();

    // File edited at T0 (now), structured side at T1 > T0.
    let mut file_note = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    file_note.fields[1].text = "File side version".to_string();
    fixture.write_note_file("Some front.md", &file_note);
    fixture.backdate_epoch(10);

    let mut note = store.get_note(101).unwrap().found().unwrap();
    note.fields[1].text = "Structured side version".to_string();
    store.update_note(&note).unwrap();
    store.set_note_modified(101, now_unix() + 100);

    let report = fixture.run_pass(&mut store).unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    let parsed = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    assert_eq!(parsed.fields[1].text, "Structured side version");
    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.fields[1].text, "Structured side version");
}

#[test]
fn given_only_property_drift_when_syncing_then_structured_side_wins() {
    let (fixture, mut store) = synced_fixture();

    // The difficulty scalar is an informational export: a drifted value in
    // the store is pushed to the file without a content conflict.
    let mut note = store.get_note(101).unwrap().found().unwrap();
    let date_modified = note.date_modified;
    note.difficulty = 3.1;
    store.update_note(&note).unwrap();
    // Keep the timestamp as embedded so only properties differ.
    store.set_note_modified(101, date_modified);

    fixture.run_pass(&mut store).unwrap();

    let parsed = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    assert!((parsed.difficulty - 3.1).abs() < 1e-9);
    assert_eq!(parsed.fields[1].text, "Some back");
}

#[test]
fn given_suspension_toggle_when_syncing_then_flag_reaches_the_file() {
    let (fixture, mut store) = synced_fixture();

    let mut note = store.get_note(101).unwrap().found().unwrap();
    let date_modified = note.date_modified;
    note.suspended = true;
    store.update_note(&note).unwrap();
    store.set_note_modified(101, date_modified);

    fixture.run_pass(&mut store).unwrap();

    let parsed = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    assert!(parsed.suspended);
}

#[test]
fn given_corrupted_structured_record_with_file_when_syncing_then_rebuilt_from_file() {
    let (fixture, mut store) = synced_fixture();

    store.corrupt_note(101);
    let report = fixture.run_pass(&mut store).unwrap();

    assert!(report.warnings.iter().any(|w| w.contains("corrupted")));
    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.fields[0].text, "Some front");
}

#[test]
fn given_deck_change_on_structured_side_when_syncing_then_file_moves_folders() {
    let (fixture, mut store) = synced_fixture();

    let mut note = store.get_note(101).unwrap().found().unwrap();
    note.deck = "Rust".to_string();
    store.update_note(&note).unwrap();
    store.set_note_modified(101, now_unix() + 100);

    fixture.run_pass(&mut store).unwrap();

    assert!(fixture.root.join("Rust/Some front.md").is_file());
    assert!(!fixture.root.join("Some front.md").exists());
}

#[test]
fn given_file_property_edit_without_field_change_when_syncing_then_file_wins() {
    let (fixture, mut store) = synced_fixture();

    // A file-only metadata edit: tags added by hand, embedded timestamps
    // untouched.
    let mut file_note = parse_note_file(&fixture.read_file("Some front.md")).unwrap();
    file_note.tags = vec!["manual".to_string()];
    let text = serialize_note(&file_note, 2);
    std::fs::write(fixture.root.join("Some front.md"), text).unwrap();
    fixture.backdate_epoch(10);

    fixture.run_pass(&mut store).unwrap();

    let stored = store.get_note(101).unwrap().found().unwrap();
    assert_eq!(stored.tags, vec!["manual"]);
}
