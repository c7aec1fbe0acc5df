//! Deletion records ("graves") and the removal operations that write them.

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use rusqlite::params;
use serde::{Deserialize, Serialize};

/// Kind of object a grave refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraveKind {
    /// A card.
    Card,
    /// A note.
    Note,
    /// A deck.
    Deck,
}

impl GraveKind {
    /// Stored code.
    pub fn to_code(self) -> i32 {
        match self {
            GraveKind::Card => 0,
            GraveKind::Note => 1,
            GraveKind::Deck => 2,
        }
    }

    /// Decodes a stored code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(GraveKind::Card),
            1 => Some(GraveKind::Note),
            2 => Some(GraveKind::Deck),
            _ => None,
        }
    }
}

/// A deletion record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grave {
    /// Id of the deleted object.
    pub oid: i64,
    /// Kind of the deleted object.
    pub kind: GraveKind,
    /// Update sequence number.
    pub usn: i32,
}

impl RecordStore {
    /// Logs a grave. At most one grave exists per `(oid, kind)`; a repeated
    /// deletion refreshes its usn.
    pub fn add_grave(&self, oid: i64, kind: GraveKind, usn: i32) -> StoreResult<()> {
        self.execute(
            "INSERT OR REPLACE INTO graves (usn, oid, type) VALUES (?1, ?2, ?3)",
            params![usn, oid, kind.to_code()],
        )?;
        Ok(())
    }

    /// Loads graves whose usn satisfies `filter` (an SQL expression over
    /// `usn`).
    pub fn graves_where<P: rusqlite::Params>(&self, filter: &str, params: P) -> StoreResult<Vec<Grave>> {
        let sql = format!("SELECT oid, type, usn FROM graves WHERE {filter} ORDER BY oid");
        let rows: Vec<(i64, i32, i32)> =
            self.query(&sql, params, |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
        rows.into_iter()
            .map(|(oid, code, usn)| {
                let kind = GraveKind::from_code(code)
                    .ok_or_else(|| StoreError::corrupted(format!("unknown grave type {code}")))?;
                Ok(Grave { oid, kind, usn })
            })
            .collect()
    }

    /// Returns true if `oid` has a grave of `kind`.
    pub fn has_grave(&self, oid: i64, kind: GraveKind) -> StoreResult<bool> {
        Ok(self
            .scalar_opt::<i64, _>(
                "SELECT 1 FROM graves WHERE oid = ?1 AND type = ?2",
                params![oid, kind.to_code()],
            )?
            .is_some())
    }

    /// Deletes notes and their cards, logging graves for both.
    pub fn remove_notes(&self, nids: &[i64], usn: i32) -> StoreResult<()> {
        let mut cids = Vec::new();
        for nid in nids {
            cids.extend(self.query("SELECT id FROM cards WHERE nid = ?1", [nid], |r| r.get::<_, i64>(0))?);
        }
        self.remove_cards(&cids, usn, false)?;
        self.remove_notes_only(nids, usn)
    }

    /// Deletes note rows only, logging a grave for each id.
    pub fn remove_notes_only(&self, nids: &[i64], usn: i32) -> StoreResult<()> {
        for &nid in nids {
            self.execute("DELETE FROM notes WHERE id = ?1", [nid])?;
            self.add_grave(nid, GraveKind::Note, usn)?;
        }
        Ok(())
    }

    /// Deletes cards, logging a grave for each id.
    ///
    /// With `remove_orphan_notes`, notes left without any card are deleted
    /// too, keeping the "every note has a card" invariant.
    pub fn remove_cards(&self, cids: &[i64], usn: i32, remove_orphan_notes: bool) -> StoreResult<()> {
        let mut touched = Vec::new();
        for &cid in cids {
            if let Some(nid) = self.scalar_opt::<i64, _>("SELECT nid FROM cards WHERE id = ?1", [cid])? {
                touched.push(nid);
            }
            self.execute("DELETE FROM cards WHERE id = ?1", [cid])?;
            self.add_grave(cid, GraveKind::Card, usn)?;
        }
        if remove_orphan_notes {
            touched.sort_unstable();
            touched.dedup();
            let mut orphans = Vec::new();
            for nid in touched {
                let remaining: i64 = self.scalar("SELECT count() FROM cards WHERE nid = ?1", [nid])?;
                if remaining == 0 {
                    orphans.push(nid);
                }
            }
            self.remove_notes_only(&orphans, usn)?;
        }
        Ok(())
    }

    /// Deletes deck entries, logging a grave for each id. Cards in those
    /// decks are left where they are; the default deck is skipped.
    pub fn remove_decks(&self, dids: &[i64], usn: i32) -> StoreResult<()> {
        for &did in dids {
            if did == crate::deck::DEFAULT_DECK_ID {
                continue;
            }
            self.remove_deck(did)?;
            self.add_grave(did, GraveKind::Deck, usn)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::Card;
    use crate::note::Note;
    use crate::record::WriteMode;

    fn store_with_note() -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        store.write(&Note::new(1, "g1", 5, &["a"]), WriteMode::Replace).unwrap();
        store.write(&Card::new(10, 1, 1, 0, 0), WriteMode::Replace).unwrap();
        store.write(&Card::new(11, 1, 1, 1, 0), WriteMode::Replace).unwrap();
        store
    }

    #[test]
    fn kind_codes() {
        for kind in [GraveKind::Card, GraveKind::Note, GraveKind::Deck] {
            assert_eq!(GraveKind::from_code(kind.to_code()), Some(kind));
        }
        assert_eq!(GraveKind::from_code(9), None);
    }

    #[test]
    fn one_grave_per_object() {
        let store = RecordStore::open_in_memory().unwrap();
        store.add_grave(5, GraveKind::Note, -1).unwrap();
        store.add_grave(5, GraveKind::Note, 3).unwrap();
        store.add_grave(5, GraveKind::Card, 3).unwrap();

        let graves = store.graves_where("1", []).unwrap();
        assert_eq!(graves.len(), 2);
        assert!(store.has_grave(5, GraveKind::Note).unwrap());
        assert!(!store.has_grave(5, GraveKind::Deck).unwrap());
    }

    #[test]
    fn removing_last_card_removes_note() {
        let store = store_with_note();
        store.remove_cards(&[10], -1, true).unwrap();
        assert!(store.exists::<Note>(1).unwrap());

        store.remove_cards(&[11], -1, true).unwrap();
        assert!(!store.exists::<Note>(1).unwrap());
        assert!(store.has_grave(1, GraveKind::Note).unwrap());
        assert_eq!(store.graves_where("usn = -1", []).unwrap().len(), 3);
    }

    #[test]
    fn remove_notes_takes_cards() {
        let store = store_with_note();
        store.remove_notes(&[1], 4).unwrap();
        assert_eq!(store.count::<Card>().unwrap(), 0);
        assert_eq!(store.graves_where("usn = 4", []).unwrap().len(), 3);
    }
}
