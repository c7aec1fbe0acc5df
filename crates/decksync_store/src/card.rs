//! Cards and review log entries.

use crate::record::Record;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Card type codes (`cards.type`).
pub mod card_type {
    /// Never studied.
    pub const NEW: i32 = 0;
    /// In learning.
    pub const LEARN: i32 = 1;
    /// Graduated to review.
    pub const REVIEW: i32 = 2;
    /// Relearning after a lapse.
    pub const RELEARN: i32 = 3;
}

/// Queue codes (`cards.queue`).
pub mod queue {
    /// Buried by the user.
    pub const USER_BURIED: i32 = -3;
    /// Buried by the scheduler.
    pub const SCHED_BURIED: i32 = -2;
    /// Suspended.
    pub const SUSPENDED: i32 = -1;
    /// New queue.
    pub const NEW: i32 = 0;
    /// Intraday learning; `due` is a timestamp.
    pub const LEARN: i32 = 1;
    /// Review; `due` is a day index.
    pub const REVIEW: i32 = 2;
    /// Interday learning; `due` is a day index.
    pub const DAY_LEARN: i32 = 3;
}

/// A card: one reviewable prompt generated from a note and a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Card id.
    pub id: i64,
    /// Owning note.
    pub nid: i64,
    /// Deck.
    pub did: i64,
    /// Template ordinal.
    pub ord: u32,
    /// Modification time (seconds).
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i32,
    /// Card type, see [`card_type`].
    pub ctype: i32,
    /// Queue, see [`queue`].
    pub queue: i32,
    /// Due position, day index or timestamp depending on the queue.
    pub due: i64,
    /// Interval in days.
    pub ivl: i64,
    /// Ease factor, in permille.
    pub factor: i64,
    /// Number of reviews.
    pub reps: i64,
    /// Number of lapses.
    pub lapses: i64,
    /// Remaining learning steps.
    pub left: i64,
    /// Original due while in a filtered deck.
    pub odue: i64,
    /// Original deck while in a filtered deck, 0 otherwise.
    pub odid: i64,
    /// Flags.
    pub flags: i32,
    /// Unused payload.
    pub data: String,
}

impl Card {
    /// Creates a new-queue card.
    pub fn new(id: i64, nid: i64, did: i64, ord: u32, due: i64) -> Self {
        Self {
            id,
            nid,
            did,
            ord,
            mtime: 0,
            usn: 0,
            ctype: card_type::NEW,
            queue: queue::NEW,
            due,
            ivl: 0,
            factor: 0,
            reps: 0,
            lapses: 0,
            left: 0,
            odue: 0,
            odid: 0,
            flags: 0,
            data: String::new(),
        }
    }

    /// True if the card's due is a day index (review or interday learning).
    pub fn due_is_day_index(&self) -> bool {
        matches!(self.queue, queue::REVIEW | queue::DAY_LEARN) || self.ctype == card_type::REVIEW
    }

    /// True if the card is parked in a filtered deck.
    pub fn in_filtered_deck(&self) -> bool {
        self.odid != 0
    }
}

impl Record for Card {
    const TABLE: &'static str = "cards";
    const COLUMNS: &'static [&'static str] = &[
        "id", "nid", "did", "ord", "mod", "usn", "type", "queue", "due", "ivl", "factor", "reps",
        "lapses", "left", "odue", "odid", "flags", "data",
    ];
    const MTIME_COLUMN: Option<usize> = Some(4);

    fn id(&self) -> i64 {
        self.id
    }

    fn usn(&self) -> i32 {
        self.usn
    }

    fn set_usn(&mut self, usn: i32) {
        self.usn = usn;
    }

    fn mtime(&self) -> Option<i64> {
        Some(self.mtime)
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            nid: row.get(1)?,
            did: row.get(2)?,
            ord: row.get(3)?,
            mtime: row.get(4)?,
            usn: row.get(5)?,
            ctype: row.get(6)?,
            queue: row.get(7)?,
            due: row.get(8)?,
            ivl: row.get(9)?,
            factor: row.get(10)?,
            reps: row.get(11)?,
            lapses: row.get(12)?,
            left: row.get(13)?,
            odue: row.get(14)?,
            odid: row.get(15)?,
            flags: row.get(16)?,
            data: row.get(17)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Integer(self.nid),
            Value::Integer(self.did),
            Value::Integer(i64::from(self.ord)),
            Value::Integer(self.mtime),
            Value::Integer(i64::from(self.usn)),
            Value::Integer(i64::from(self.ctype)),
            Value::Integer(i64::from(self.queue)),
            Value::Integer(self.due),
            Value::Integer(self.ivl),
            Value::Integer(self.factor),
            Value::Integer(self.reps),
            Value::Integer(self.lapses),
            Value::Integer(self.left),
            Value::Integer(self.odue),
            Value::Integer(self.odid),
            Value::Integer(i64::from(self.flags)),
            Value::Text(self.data.clone()),
        ]
    }
}

/// One review of a card. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevlogEntry {
    /// Review timestamp in milliseconds, doubling as id.
    pub id: i64,
    /// Reviewed card.
    pub cid: i64,
    /// Update sequence number.
    pub usn: i32,
    /// Answer button.
    pub ease: i32,
    /// Interval after the review.
    pub ivl: i64,
    /// Interval before the review.
    pub last_ivl: i64,
    /// Ease factor after the review.
    pub factor: i64,
    /// Time spent, in milliseconds.
    pub time: i64,
    /// Review kind.
    pub kind: i32,
}

impl Record for RevlogEntry {
    const TABLE: &'static str = "revlog";
    const COLUMNS: &'static [&'static str] = &[
        "id", "cid", "usn", "ease", "ivl", "lastIvl", "factor", "time", "type",
    ];
    const MTIME_COLUMN: Option<usize> = None;

    fn id(&self) -> i64 {
        self.id
    }

    fn usn(&self) -> i32 {
        self.usn
    }

    fn set_usn(&mut self, usn: i32) {
        self.usn = usn;
    }

    fn mtime(&self) -> Option<i64> {
        None
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            cid: row.get(1)?,
            usn: row.get(2)?,
            ease: row.get(3)?,
            ivl: row.get(4)?,
            last_ivl: row.get(5)?,
            factor: row.get(6)?,
            time: row.get(7)?,
            kind: row.get(8)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Integer(self.cid),
            Value::Integer(i64::from(self.usn)),
            Value::Integer(i64::from(self.ease)),
            Value::Integer(self.ivl),
            Value::Integer(self.last_ivl),
            Value::Integer(self.factor),
            Value::Integer(self.time),
            Value::Integer(i64::from(self.kind)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WriteMode;
    use crate::RecordStore;

    #[test]
    fn card_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut card = Card::new(10, 1, 1, 0, 5);
        card.queue = queue::REVIEW;
        card.ctype = card_type::REVIEW;
        card.due = 42;
        store.write(&card, WriteMode::Replace).unwrap();
        assert_eq!(store.get::<Card>(10).unwrap(), Some(card));
    }

    #[test]
    fn revlog_insert_or_ignore() {
        let store = RecordStore::open_in_memory().unwrap();
        let entry = RevlogEntry {
            id: 1,
            cid: 10,
            usn: -1,
            ease: 3,
            ivl: 1,
            last_ivl: 0,
            factor: 2500,
            time: 1200,
            kind: 0,
        };
        assert!(store.write(&entry, WriteMode::Ignore).unwrap());
        let mut again = entry.clone();
        again.ease = 1;
        assert!(!store.write(&again, WriteMode::Ignore).unwrap());
        assert_eq!(store.get::<RevlogEntry>(1).unwrap().unwrap().ease, 3);
    }

    #[test]
    fn day_index_queues() {
        let mut card = Card::new(1, 1, 1, 0, 0);
        assert!(!card.due_is_day_index());
        card.queue = queue::DAY_LEARN;
        assert!(card.due_is_day_index());
    }
}
