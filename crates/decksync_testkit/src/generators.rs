//! Property-based test generators using proptest.
//!
//! Strategies produce rows that satisfy the store's structural rules when
//! written through the fixtures: notes reference an existing model and
//! card ids derive from note ids.

use decksync_store::{Card, Note, RevlogEntry, DECK_SEPARATOR, DEFAULT_DECK_ID, PENDING_USN};
use proptest::prelude::*;

/// Characters used by note guids.
pub const GUID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// Strategy for note guids.
pub fn guid_strategy() -> impl Strategy<Value = String> {
    let chars: Vec<char> = GUID_CHARS.chars().collect();
    prop::collection::vec(prop::sample::select(chars), 6..=10)
        .prop_map(|chars| chars.into_iter().collect())
}

/// Strategy for a single field value. Never contains the field separator.
pub fn field_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 <>/.,!?äöü日本語]{0,40}").expect("Invalid regex")
}

/// Strategy for deck names with up to three hierarchy levels.
pub fn deck_name_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop::string::string_regex("[A-Z][a-z]{1,8}").expect("Invalid regex"),
        1..=3,
    )
    .prop_map(|parts| parts.join(DECK_SEPARATOR))
}

/// Strategy for tag lists.
pub fn tags_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(
        prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex"),
        0..4,
    )
    .prop_map(|tags| tags.into_iter().collect())
}

/// Strategy for pending notes of model `mid` with two fields.
pub fn note_strategy(mid: i64) -> impl Strategy<Value = Note> {
    (
        1i64..1_000_000,
        guid_strategy(),
        field_strategy(),
        field_strategy(),
        tags_strategy(),
        1_600_000_000i64..1_700_000_000,
    )
        .prop_map(move |(id, guid, front, back, tags, mtime)| {
            let mut note = Note::new(id, guid, mid, &[front.as_str(), back.as_str()]);
            note.tags = tags.join(" ");
            note.mtime = mtime;
            note.usn = PENDING_USN;
            note
        })
}

/// Strategy for the first card of `note`, in a random scheduling state.
pub fn card_strategy(note: &Note) -> impl Strategy<Value = Card> {
    let (nid, mtime) = (note.id, note.mtime);
    (0i64..10_000, 0i64..365, 0i64..20).prop_map(move |(due, ivl, reps)| {
        let mut card = Card::new(nid * 100, nid, DEFAULT_DECK_ID, 0, due);
        card.ivl = ivl;
        card.reps = reps;
        card.mtime = mtime;
        card.usn = PENDING_USN;
        card
    })
}

/// Strategy for review log entries of `cid`.
pub fn revlog_strategy(cid: i64) -> impl Strategy<Value = RevlogEntry> {
    (1_600_000_000_000i64..1_700_000_000_000, 1i32..=4, 0i64..100).prop_map(
        move |(id, ease, ivl)| RevlogEntry {
            id,
            cid,
            usn: PENDING_USN,
            ease,
            ivl,
            last_ivl: 0,
            factor: 2_500,
            time: 5_000,
            kind: 1,
        },
    )
}

/// Strategy for a note of model `mid` with its first card and one review
/// of that card.
pub fn reviewed_note_strategy(mid: i64) -> impl Strategy<Value = (Note, Card, RevlogEntry)> {
    note_strategy(mid).prop_flat_map(|note| {
        let cid = note.id * 100;
        (Just(note.clone()), card_strategy(&note), revlog_strategy(cid))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_store::FIELD_SEPARATOR;

    proptest! {
        #[test]
        fn guids_use_the_guid_alphabet(guid in guid_strategy()) {
            prop_assert!(guid.chars().all(|c| GUID_CHARS.contains(c)));
        }

        #[test]
        fn notes_keep_two_fields(note in note_strategy(1)) {
            prop_assert_eq!(note.fields().len(), 2);
            prop_assert_eq!(note.flds.matches(FIELD_SEPARATOR).count(), 1);
        }

        #[test]
        fn reviewed_notes_link_up((note, card, entry) in reviewed_note_strategy(1)) {
            prop_assert_eq!(card.nid, note.id);
            prop_assert_eq!(entry.cid, card.id);
        }

        #[test]
        fn deck_names_have_no_empty_levels(name in deck_name_strategy()) {
            prop_assert!(name.split(DECK_SEPARATOR).all(|part| !part.is_empty()));
        }
    }
}
