//! Wire encoding properties.

use decksync_protocol::{Changes, Chunk, Graves, StartRequest, WireMessage};
use decksync_store::{Deck, Note};
use decksync_testkit::{deck_name_strategy, reviewed_note_strategy, tags_strategy, BASIC_MODEL_ID};
use proptest::prelude::*;

proptest! {
    #[test]
    fn chunks_survive_the_wire(
        rows in prop::collection::vec(reviewed_note_strategy(BASIC_MODEL_ID), 0..8),
        done in any::<bool>(),
    ) {
        let mut chunk = Chunk { done, ..Chunk::default() };
        for (note, card, entry) in rows {
            chunk.notes.push(note);
            chunk.cards.push(card);
            chunk.revlog.push(entry);
        }
        let decoded = Chunk::decode(&chunk.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, chunk);
    }

    #[test]
    fn changes_survive_the_wire(
        names in prop::collection::vec(deck_name_strategy(), 0..6),
        tags in tags_strategy(),
        crt in proptest::option::of(0i64..2_000_000_000),
    ) {
        let decks = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Deck::new(i as i64 + 2, name))
            .collect();
        let changes = Changes { decks, tags, crt, ..Changes::default() };
        let decoded = Changes::decode(&changes.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, changes);
    }

    #[test]
    fn start_requests_survive_the_wire(
        min_usn in -1i32..10_000,
        local_newer in any::<bool>(),
        notes in prop::collection::vec(any::<i64>(), 0..16),
    ) {
        let request = StartRequest {
            min_usn,
            local_newer,
            graves: Graves { notes, ..Graves::default() },
        };
        let decoded = StartRequest::decode(&request.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, request);
    }
}

#[test]
fn truncated_input_is_rejected() {
    let chunk = Chunk {
        notes: vec![Note::new(1, "abc", 5, &["front", "back"])],
        ..Chunk::default()
    };
    let bytes = chunk.encode().unwrap();
    assert!(Chunk::decode(&bytes[..bytes.len() / 2]).is_err());
}
