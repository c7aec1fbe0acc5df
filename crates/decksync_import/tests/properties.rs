//! Merge properties over generated collections.

use decksync_import::{DefaultCallbacks, MergeEngine};
use decksync_store::{Card, Note, RecordStore, RevlogEntry, WriteMode};
use decksync_testkit::{reviewed_note_strategy, TestCollection, BASIC_MODEL_ID};
use proptest::prelude::*;
use std::collections::HashSet;

fn rows() -> impl Strategy<Value = Vec<(Note, Card, RevlogEntry)>> {
    prop::collection::vec(reviewed_note_strategy(BASIC_MODEL_ID), 1..12)
}

/// Writes `rows`, skipping any whose note id or guid is already taken, and
/// returns the note ids written. `guid_prefix` keeps two collections built
/// from the same rows apart.
fn fill(store: &RecordStore, rows: &[(Note, Card, RevlogEntry)], guid_prefix: &str) -> HashSet<i64> {
    let mut ids = HashSet::new();
    let mut guids = HashSet::new();
    for (note, card, entry) in rows {
        if ids.contains(&note.id) || guids.contains(&note.guid) {
            continue;
        }
        ids.insert(note.id);
        guids.insert(note.guid.clone());
        let mut note = note.clone();
        note.guid = format!("{guid_prefix}{}", note.guid);
        store.write(&note, WriteMode::Replace).unwrap();
        store.write(card, WriteMode::Replace).unwrap();
        store.write(entry, WriteMode::Ignore).unwrap();
    }
    ids
}

fn distinct_guids(store: &RecordStore) -> usize {
    store
        .select::<Note, _>("1", [])
        .unwrap()
        .into_iter()
        .map(|n| n.guid)
        .collect::<HashSet<_>>()
        .len()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn colliding_ids_never_merge_foreign_notes(rows in rows()) {
        let src = TestCollection::memory();
        let dst = TestCollection::memory();
        let written = fill(&src, &rows, "");
        let n = written.len();
        // Same ids, guids outside the guid alphabet.
        fill(&dst, &rows, "'");

        let first = MergeEngine::new(&src, &dst).run(&mut DefaultCallbacks).unwrap();
        prop_assert_eq!(first.added, n);
        prop_assert_eq!(first.cards_added, n);
        prop_assert_eq!(dst.count::<Note>().unwrap(), 2 * n as i64);
        prop_assert_eq!(dst.count::<Card>().unwrap(), 2 * n as i64);
        prop_assert_eq!(distinct_guids(&dst), 2 * n);
        prop_assert!(dst.basic_check().unwrap());
        prop_assert!(first.imported_note_ids.iter().all(|id| !written.contains(id)));
    }

    #[test]
    fn importing_a_collection_twice_adds_nothing(rows in rows()) {
        let src = TestCollection::memory();
        let dst = TestCollection::memory();
        let n = fill(&src, &rows, "").len();

        let first = MergeEngine::new(&src, &dst).run(&mut DefaultCallbacks).unwrap();
        prop_assert_eq!(first.added, n);
        let notes = dst.count::<Note>().unwrap();
        let cards = dst.count::<Card>().unwrap();
        let revlog = dst.count::<RevlogEntry>().unwrap();

        let second = MergeEngine::new(&src, &dst).run(&mut DefaultCallbacks).unwrap();
        prop_assert!(second.is_empty());
        prop_assert_eq!(second.duplicates, n);
        prop_assert_eq!(dst.count::<Note>().unwrap(), notes);
        prop_assert_eq!(dst.count::<Card>().unwrap(), cards);
        prop_assert_eq!(dst.count::<RevlogEntry>().unwrap(), revlog);
        prop_assert!(dst.basic_check().unwrap());
    }
}
