//! The scheduler hooks the importer relies on.
//!
//! Interval computation lives elsewhere; an import only needs to know the
//! day index of "today", how to reshuffle new cards of a deck that asks for
//! random order, and how to strip scheduling before export.

use crate::error::MergeResult;
use decksync_store::time::now_secs;
use decksync_store::{card_type, queue, NewCardOrder, RecordStore};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::debug;

/// Scheduler services used by import and export.
pub trait Scheduler {
    /// Day index of "today" in `store`.
    fn today(&self, store: &RecordStore) -> MergeResult<i64>;

    /// Reshuffles the new cards of deck `did` if its configuration asks for
    /// random order. Changed cards get `usn`.
    fn maybe_randomize_deck(&self, store: &RecordStore, did: i64, usn: i32) -> MergeResult<()>;

    /// Turns `cids` back into new cards, in note order.
    fn reset_cards_for_export(&self, store: &RecordStore, cids: &[i64]) -> MergeResult<()>;
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    fn today(&self, store: &RecordStore) -> MergeResult<i64> {
        (**self).today(store)
    }

    fn maybe_randomize_deck(&self, store: &RecordStore, did: i64, usn: i32) -> MergeResult<()> {
        (**self).maybe_randomize_deck(store, did, usn)
    }

    fn reset_cards_for_export(&self, store: &RecordStore, cids: &[i64]) -> MergeResult<()> {
        (**self).reset_cards_for_export(store, cids)
    }
}

/// Default [`Scheduler`] over the stored collection metadata.
#[derive(Debug, Clone, Default)]
pub struct BasicScheduler {
    seed: Option<u64>,
}

impl BasicScheduler {
    /// Creates a scheduler shuffling with the thread rng.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scheduler whose shuffles are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

impl Scheduler for BasicScheduler {
    fn today(&self, store: &RecordStore) -> MergeResult<i64> {
        Ok(store.meta()?.today())
    }

    fn maybe_randomize_deck(&self, store: &RecordStore, did: i64, usn: i32) -> MergeResult<()> {
        let Some(deck) = store.deck(did)? else {
            return Ok(());
        };
        let random = store
            .deck_conf(deck.conf)?
            .is_some_and(|conf| conf.new_order == NewCardOrder::Random);
        if !random {
            return Ok(());
        }

        // Siblings share a position: shuffle per note.
        let rows: Vec<(i64, i64)> = store.query(
            "SELECT nid, min(due) FROM cards WHERE did = ?1 AND queue = ?2 AND type = ?3
             GROUP BY nid ORDER BY nid",
            rusqlite::params![did, queue::NEW, card_type::NEW],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let mut positions: Vec<i64> = rows.iter().map(|(_, due)| *due).collect();
        positions.sort_unstable();
        positions.shuffle(&mut self.rng());

        let now = now_secs();
        store.execute_many(
            "UPDATE cards SET due = ?1, mod = ?2, usn = ?3
             WHERE nid = ?4 AND did = ?5 AND queue = ?6 AND type = ?7",
            rows.iter().zip(&positions).map(|((nid, _), due)| {
                rusqlite::params_from_iter([
                    *due,
                    now,
                    i64::from(usn),
                    *nid,
                    did,
                    i64::from(queue::NEW),
                    i64::from(card_type::NEW),
                ])
            }),
        )?;
        debug!(did, notes = rows.len(), "randomized new cards");
        Ok(())
    }

    fn reset_cards_for_export(&self, store: &RecordStore, cids: &[i64]) -> MergeResult<()> {
        let mut cards = Vec::with_capacity(cids.len());
        for &cid in cids {
            if let Some(nid) = store.scalar_opt::<i64, _>("SELECT nid FROM cards WHERE id = ?1", [cid])? {
                cards.push((cid, nid));
            }
        }
        let mut positions: BTreeMap<i64, i64> = cards.iter().map(|&(_, nid)| (nid, 0)).collect();
        for (position, due) in positions.values_mut().enumerate() {
            *due = position as i64 + 1;
        }

        let now = now_secs();
        store.execute_many(
            "UPDATE cards SET
                did = CASE WHEN odid != 0 THEN odid ELSE did END,
                type = ?1, queue = ?2, due = ?3,
                ivl = 0, factor = 0, reps = 0, lapses = 0, left = 0,
                odue = 0, odid = 0, mod = ?4, usn = 0
             WHERE id = ?5",
            cards.iter().map(|(cid, nid)| {
                rusqlite::params_from_iter([
                    i64::from(card_type::NEW),
                    i64::from(queue::NEW),
                    positions.get(nid).copied().unwrap_or(1),
                    now,
                    *cid,
                ])
            }),
        )?;
        if let Some(last) = positions.values().max() {
            store.set_conf_i64("nextPos", last + 1)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_store::{Card, Deck, DeckConf, Note, WriteMode};

    fn store_with_new_cards(order: NewCardOrder) -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        let mut conf = DeckConf::new(5, "Shuffled");
        conf.new_order = order;
        store.put_deck_conf(&conf).unwrap();
        let mut deck = Deck::new(20, "Vocab");
        deck.conf = 5;
        store.put_deck(&deck).unwrap();
        for nid in 1..=20 {
            store
                .write(&Note::new(nid, format!("g{nid}"), 1, &["q", "a"]), WriteMode::Replace)
                .unwrap();
            store
                .write(&Card::new(nid * 10, nid, 20, 0, nid), WriteMode::Replace)
                .unwrap();
        }
        store
    }

    fn dues(store: &RecordStore) -> Vec<i64> {
        store
            .query("SELECT due FROM cards ORDER BY nid", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn randomizes_only_random_decks() {
        let store = store_with_new_cards(NewCardOrder::Due);
        BasicScheduler::with_seed(7)
            .maybe_randomize_deck(&store, 20, -1)
            .unwrap();
        assert_eq!(dues(&store), (1..=20).collect::<Vec<_>>());

        let store = store_with_new_cards(NewCardOrder::Random);
        BasicScheduler::with_seed(7)
            .maybe_randomize_deck(&store, 20, -1)
            .unwrap();
        let mut shuffled = dues(&store);
        assert_ne!(shuffled, (1..=20).collect::<Vec<_>>());
        shuffled.sort_unstable();
        assert_eq!(shuffled, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn unknown_deck_is_ignored() {
        let store = store_with_new_cards(NewCardOrder::Random);
        BasicScheduler::new().maybe_randomize_deck(&store, 999, -1).unwrap();
    }

    #[test]
    fn reset_turns_cards_new() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .write(&Note::new(7, "g", 1, &["q"]), WriteMode::Replace)
            .unwrap();
        let mut card = Card::new(70, 7, 30, 0, 400);
        card.ctype = card_type::REVIEW;
        card.queue = queue::REVIEW;
        card.ivl = 12;
        card.reps = 5;
        card.odid = 1;
        card.odue = 380;
        store.write(&card, WriteMode::Replace).unwrap();

        BasicScheduler::new().reset_cards_for_export(&store, &[70]).unwrap();
        let card: Card = store.get(70).unwrap().unwrap();
        assert_eq!((card.ctype, card.queue), (card_type::NEW, queue::NEW));
        assert_eq!((card.due, card.ivl, card.reps), (1, 0, 0));
        assert_eq!((card.did, card.odid, card.odue), (1, 0, 0));
        assert_eq!(store.conf_i64("nextPos", 0).unwrap(), 2);
    }

    #[test]
    fn today_comes_from_the_store() {
        let store = RecordStore::open_in_memory().unwrap();
        assert_eq!(BasicScheduler::new().today(&store).unwrap(), 0);
    }
}
