//! Card and review log migration.

use crate::decks::DeckMap;
use crate::error::MergeResult;
use crate::ids::probe_id;
use crate::options::ImportOptions;
use decksync_store::time::now_secs;
use decksync_store::{card_type, queue, Card, RecordStore, RevlogEntry, WriteMode};
use std::collections::{BTreeSet, HashSet};
use tracing::trace;

/// Adjusts a source card for the destination's day numbering and takes it
/// out of any filtered deck.
///
/// `ahead_by` is the source's "today" minus the destination's. Day-indexed
/// due dates are shifted back by it; a card parked in a filtered deck gets
/// its original due back and a regular queue.
pub fn rebase_card(card: &mut Card, ahead_by: i64) {
    if card.due_is_day_index() {
        card.due -= ahead_by;
    }
    if card.odue != 0 && matches!(card.ctype, card_type::REVIEW | card_type::RELEARN) {
        card.odue -= ahead_by;
    }
    if card.in_filtered_deck() {
        card.due = card.odue;
        card.odue = 0;
        card.odid = 0;
        if card.ctype == card_type::LEARN {
            card.ctype = card_type::NEW;
        }
        // Queue codes mirror type codes for regular cards.
        card.queue = card.ctype;
    }
}

/// Copies source cards, and their review history, whose note survived
/// reconciliation.
pub struct CardMerger<'a> {
    options: &'a ImportOptions,
    existing: HashSet<(String, u32)>,
    ahead_by: i64,
    usn: i32,
    /// Cards added.
    pub added: usize,
    /// Review log rows added.
    pub revlog_added: usize,
    /// Destination decks that received new-queue cards.
    pub decks_with_new_cards: BTreeSet<i64>,
}

impl<'a> CardMerger<'a> {
    /// Loads the `(guid, ord)` pairs already present in `dst`.
    pub fn new(dst: &RecordStore, options: &'a ImportOptions, ahead_by: i64, usn: i32) -> MergeResult<Self> {
        let existing = dst.query(
            "SELECT n.guid, c.ord FROM cards c JOIN notes n ON c.nid = n.id",
            [],
            |r| Ok((r.get::<_, String>(0)?, r.get::<_, u32>(1)?)),
        )?;
        Ok(Self {
            options,
            existing: existing.into_iter().collect(),
            ahead_by,
            usn,
            added: 0,
            revlog_added: 0,
            decks_with_new_cards: BTreeSet::new(),
        })
    }

    /// Copies `card` onto destination note `nid` (guid `guid`). Returns
    /// false if the note already has a card for that template.
    pub fn merge(
        &mut self,
        src: &RecordStore,
        dst: &RecordStore,
        card: &Card,
        guid: &str,
        nid: i64,
        decks: &mut DeckMap,
    ) -> MergeResult<bool> {
        let key = (guid.to_string(), card.ord);
        if self.existing.contains(&key) {
            return Ok(false);
        }

        let id = probe_id(
            "card",
            card.id,
            self.options.id_probe_step,
            self.options.max_id_probes,
            |id| Ok(dst.exists::<Card>(id)?),
        )?;
        let src_did = if card.in_filtered_deck() { card.odid } else { card.did };

        let mut copy = card.clone();
        rebase_card(&mut copy, self.ahead_by);
        copy.id = id;
        copy.nid = nid;
        copy.did = decks.resolve(dst, src_did)?;
        copy.mtime = now_secs();
        copy.usn = self.usn;
        dst.write(&copy, WriteMode::Replace)?;
        self.existing.insert(key);
        self.added += 1;
        if copy.queue == queue::NEW {
            self.decks_with_new_cards.insert(copy.did);
        }

        for mut entry in src.select::<RevlogEntry, _>("cid = ?1", [card.id])? {
            entry.cid = id;
            entry.usn = self.usn;
            if dst.write(&entry, WriteMode::Ignore)? {
                self.revlog_added += 1;
            }
        }
        trace!(src = card.id, id, nid, did = copy.did, "added card");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review_card(due: i64) -> Card {
        let mut card = Card::new(1, 1, 1, 0, due);
        card.ctype = card_type::REVIEW;
        card.queue = queue::REVIEW;
        card.ivl = 10;
        card
    }

    #[test]
    fn review_due_is_rebased() {
        let mut card = review_card(120);
        rebase_card(&mut card, 20);
        assert_eq!(card.due, 100);

        let mut card = review_card(120);
        rebase_card(&mut card, -5);
        assert_eq!(card.due, 125);
    }

    #[test]
    fn new_and_learning_cards_keep_due() {
        let mut new = Card::new(1, 1, 1, 0, 42);
        rebase_card(&mut new, 20);
        assert_eq!(new.due, 42);

        let mut learning = Card::new(1, 1, 1, 0, 1_700_000_000);
        learning.ctype = card_type::LEARN;
        learning.queue = queue::LEARN;
        rebase_card(&mut learning, 20);
        assert_eq!(learning.due, 1_700_000_000);
    }

    #[test]
    fn filtered_review_card_returns_home() {
        let mut card = review_card(-100_000);
        card.did = 50;
        card.odid = 7;
        card.odue = 300;
        rebase_card(&mut card, 10);
        assert_eq!(card.due, 290);
        assert_eq!((card.odue, card.odid), (0, 0));
        assert_eq!((card.ctype, card.queue), (card_type::REVIEW, queue::REVIEW));
    }

    #[test]
    fn filtered_learning_card_becomes_new() {
        let mut card = Card::new(1, 1, 50, 0, 0);
        card.ctype = card_type::LEARN;
        card.queue = queue::LEARN;
        card.odid = 7;
        card.odue = 12;
        rebase_card(&mut card, 10);
        assert_eq!((card.ctype, card.queue), (card_type::NEW, queue::NEW));
        assert_eq!(card.due, 12);
    }
}
