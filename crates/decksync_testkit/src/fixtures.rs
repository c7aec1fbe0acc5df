//! Collection fixtures and helpers for building test content.
//!
//! Helpers write rows the way a client edit would: pending usn, current
//! modification time, one card per template.

use decksync_store::time::{now_millis, now_secs};
use decksync_store::{
    Card, Model, Note, RecordStore, RevlogEntry, WriteMode, DEFAULT_DECK_ID, PENDING_USN,
};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use tempfile::TempDir;

/// Id of the model created by [`basic_model`].
pub const BASIC_MODEL_ID: i64 = 1_000;

/// Id of the model created by [`reversed_model`].
pub const REVERSED_MODEL_ID: i64 = 1_001;

/// A "Basic" model: Front/Back, one template.
pub fn basic_model() -> Model {
    Model::new(
        BASIC_MODEL_ID,
        "Basic",
        &["Front", "Back"],
        &[("Card 1", "{{Front}}", "{{FrontSide}}<hr>{{Back}}")],
    )
}

/// A two-template model that also asks Back to Front.
pub fn reversed_model() -> Model {
    Model::new(
        REVERSED_MODEL_ID,
        "Basic (and reversed card)",
        &["Front", "Back"],
        &[
            ("Card 1", "{{Front}}", "{{FrontSide}}<hr>{{Back}}"),
            ("Card 2", "{{Back}}", "{{FrontSide}}<hr>{{Front}}"),
        ],
    )
}

/// A test collection with automatic cleanup.
///
/// Both constructors seed [`basic_model`] and [`reversed_model`] with a
/// synced usn.
pub struct TestCollection {
    /// The collection store.
    pub store: RecordStore,
    /// Kept alive so the backing file survives as long as the store.
    _temp_dir: Option<TempDir>,
}

impl TestCollection {
    /// Creates an in-memory collection.
    pub fn memory() -> Self {
        let store = RecordStore::open_in_memory().expect("Failed to open in-memory collection");
        seed_models(&store);
        Self {
            store,
            _temp_dir: None,
        }
    }

    /// Creates a collection file inside a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RecordStore::open(temp_dir.path().join("collection.anki2"))
            .expect("Failed to open collection file");
        seed_models(&store);
        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Path of the collection file, `None` for in-memory collections.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir
            .as_ref()
            .map(|d| d.path().join("collection.anki2"))
    }

    /// Consumes the fixture, returning the store.
    ///
    /// Only meaningful for in-memory collections; a file-backed store
    /// loses its directory.
    pub fn into_store(self) -> RecordStore {
        self.store
    }
}

impl Deref for TestCollection {
    type Target = RecordStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl DerefMut for TestCollection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.store
    }
}

fn seed_models(store: &RecordStore) {
    store.put_model(&basic_model()).expect("Failed to add model");
    store.put_model(&reversed_model()).expect("Failed to add model");
}

/// Two in-memory collections that share schema time, modification time
/// and content, as after a full sync.
pub fn twin_collections() -> (RecordStore, RecordStore) {
    let mut copies = cloned_collections(2);
    let second = copies.pop().expect("two copies");
    let first = copies.pop().expect("two copies");
    (first, second)
}

/// `count` in-memory copies of one settled collection.
pub fn cloned_collections(count: usize) -> Vec<RecordStore> {
    let base = TestCollection::memory();
    base.clear_pending(0).expect("Failed to settle base collection");

    let dir = TempDir::new().expect("Failed to create temp directory");
    let snapshot = dir.path().join("base.anki2");
    base.export_to(&snapshot).expect("Failed to export base collection");

    (0..count)
        .map(|_| {
            let mut store = RecordStore::open_in_memory().expect("Failed to open collection");
            store.replace_from(&snapshot).expect("Failed to load base collection");
            store
        })
        .collect()
}

/// Adds a [`basic_model`] note with one card in the default deck.
pub fn add_note(store: &RecordStore, nid: i64, guid: &str, fields: &[&str]) -> Note {
    add_note_of(store, BASIC_MODEL_ID, nid, guid, fields)
}

/// Adds a note of model `mid` and one card per template.
///
/// Card ids are `nid * 100 + ord`.
pub fn add_note_of(store: &RecordStore, mid: i64, nid: i64, guid: &str, fields: &[&str]) -> Note {
    let model = store.require_model(mid).expect("Failed to load model");
    let mut note = Note::new(nid, guid, mid, fields);
    note.mtime = now_secs();
    note.usn = PENDING_USN;
    store.write(&note, WriteMode::Replace).expect("Failed to write note");

    for tmpl in &model.tmpls {
        let mut card = Card::new(nid * 100 + i64::from(tmpl.ord), nid, DEFAULT_DECK_ID, tmpl.ord, nid);
        card.mtime = note.mtime;
        card.usn = PENDING_USN;
        store.write(&card, WriteMode::Replace).expect("Failed to write card");
    }
    note
}

/// Rewrites a note's fields as a local edit at `mtime`.
pub fn edit_note(store: &RecordStore, nid: i64, fields: &[&str], mtime: i64) -> Note {
    let mut note: Note = store
        .get(nid)
        .expect("Failed to load note")
        .expect("Note does not exist");
    note.set_fields(fields);
    note.mtime = mtime;
    note.usn = PENDING_USN;
    store.write(&note, WriteMode::Replace).expect("Failed to write note");
    note
}

/// Deletes a note and its cards, leaving graves to be synced.
pub fn delete_note(store: &RecordStore, nid: i64) {
    store
        .remove_notes(&[nid], PENDING_USN)
        .expect("Failed to remove note");
}

/// Records a review of `cid`, `offset_ms` after now.
pub fn review(store: &RecordStore, cid: i64, offset_ms: i64) -> RevlogEntry {
    let entry = RevlogEntry {
        id: now_millis() + offset_ms,
        cid,
        usn: PENDING_USN,
        ease: 3,
        ivl: 1,
        last_ivl: 0,
        factor: 2_500,
        time: 4_000,
        kind: 0,
    };
    store.write(&entry, WriteMode::Ignore).expect("Failed to write review");
    entry
}

/// Stamps pending changes with the collection's current usn, the way a
/// server records its own edits.
pub fn stamp_as_server(store: &RecordStore) {
    let usn = store.usn().expect("Failed to read usn");
    store.clear_pending(usn).expect("Failed to stamp changes");
}

/// Bumps the collection modification time so the next sync sees changes.
///
/// Only the collection's own previous time is beaten; after a sync with
/// a peer use [`touch_after`] with the peer's time.
pub fn touch(store: &RecordStore) {
    touch_after(store, 0);
}

/// Bumps the modification time past both the collection's own and
/// `peer_mtime`, so the two can never compare equal.
pub fn touch_after(store: &RecordStore, peer_mtime: i64) {
    let meta = store.meta().expect("Failed to load collection metadata");
    let mtime = now_millis().max(meta.mtime + 1).max(peer_mtime + 1);
    store
        .set_modified_at(mtime)
        .expect("Failed to touch collection");
}

/// Runs `f` against a fresh in-memory collection.
pub fn with_collection<F, R>(f: F) -> R
where
    F: FnOnce(&RecordStore) -> R,
{
    let collection = TestCollection::memory();
    f(&collection.store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_collection_has_models() {
        let col = TestCollection::memory();
        assert!(col.model(BASIC_MODEL_ID).unwrap().is_some());
        assert!(col.path().is_none());
    }

    #[test]
    fn file_collection_has_path() {
        let col = TestCollection::file();
        assert!(col.path().unwrap().exists());
    }

    #[test]
    fn twins_are_identical() {
        let (a, b) = twin_collections();
        assert_eq!(a.meta().unwrap(), b.meta().unwrap());
        assert_eq!(a.content_digest().unwrap(), b.content_digest().unwrap());
        assert_eq!(a.sanity_digest().unwrap().pending, 0);
    }

    #[test]
    fn notes_get_a_card_per_template() {
        with_collection(|col| {
            add_note_of(col, REVERSED_MODEL_ID, 7, "g7", &["q", "a"]);
            assert_eq!(col.count::<Card>().unwrap(), 2);
            assert!(col.exists::<Card>(701).unwrap());
            assert!(col.basic_check().unwrap());
        });
    }

    #[test]
    fn touch_moves_mtime_forward() {
        with_collection(|col| {
            let before = col.meta().unwrap().mtime;
            touch(col);
            assert!(col.meta().unwrap().mtime > before);
        });
    }

    #[test]
    fn touch_after_passes_a_peer_in_the_future() {
        with_collection(|col| {
            let peer = now_millis() + 60_000;
            touch_after(col, peer);
            assert_eq!(col.meta().unwrap().mtime, peer + 1);
        });
    }
}
