//! Structural checks and digests.

use crate::card::{Card, RevlogEntry};
use crate::clock::PENDING_USN;
use crate::error::StoreResult;
use crate::model::hex;
use crate::note::Note;
use crate::record::Record;
use crate::store::RecordStore;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Structural summary compared by both peers at the end of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SanityDigest {
    /// Cards whose note is missing.
    pub orphan_cards: i64,
    /// Notes without any card.
    pub orphan_notes: i64,
    /// Rows and objects still carrying the pending usn.
    pub pending: i64,
    /// Card count.
    pub cards: i64,
    /// Note count.
    pub notes: i64,
    /// Review log count.
    pub revlog: i64,
    /// Grave count.
    pub graves: i64,
    /// Model count.
    pub models: i64,
    /// Deck count.
    pub decks: i64,
    /// Deck configuration count.
    pub deck_confs: i64,
}

impl SanityDigest {
    /// True if the digest shows no local structural problem.
    pub fn is_clean(&self) -> bool {
        self.orphan_cards == 0 && self.orphan_notes == 0 && self.pending == 0
    }
}

impl RecordStore {
    /// Computes the sanity digest of this store.
    pub fn sanity_digest(&self) -> StoreResult<SanityDigest> {
        let models = self.models()?;
        let decks = self.decks()?;
        let confs = self.deck_confs()?;
        let tags = self.tags()?;

        let mut pending: i64 = 0;
        for table in ["cards", "notes", "revlog", "graves"] {
            let sql = format!("SELECT count() FROM {table} WHERE usn = {PENDING_USN}");
            pending += self.scalar::<i64, _>(&sql, [])?;
        }
        pending += models.values().filter(|m| m.usn == PENDING_USN).count() as i64;
        pending += decks.values().filter(|d| d.usn == PENDING_USN).count() as i64;
        pending += confs.values().filter(|c| c.usn == PENDING_USN).count() as i64;
        pending += tags.values().filter(|&&usn| usn == PENDING_USN).count() as i64;

        Ok(SanityDigest {
            orphan_cards: self.orphan_card_count()?,
            orphan_notes: self.orphan_note_count()?,
            pending,
            cards: self.count::<Card>()?,
            notes: self.count::<Note>()?,
            revlog: self.count::<RevlogEntry>()?,
            graves: self.scalar("SELECT count() FROM graves", [])?,
            models: models.len() as i64,
            decks: decks.len() as i64,
            deck_confs: confs.len() as i64,
        })
    }

    fn orphan_card_count(&self) -> StoreResult<i64> {
        self.scalar(
            "SELECT count() FROM cards WHERE nid NOT IN (SELECT id FROM notes)",
            [],
        )
    }

    fn orphan_note_count(&self) -> StoreResult<i64> {
        self.scalar(
            "SELECT count() FROM notes WHERE id NOT IN (SELECT DISTINCT nid FROM cards)",
            [],
        )
    }

    /// Lists structural problems: orphans, notes of unknown models, and
    /// cards whose template ordinal does not exist.
    pub fn structural_problems(&self) -> StoreResult<Vec<String>> {
        let mut problems = Vec::new();

        let orphan_cards = self.orphan_card_count()?;
        if orphan_cards > 0 {
            problems.push(format!("{orphan_cards} cards without a note"));
        }
        let orphan_notes = self.orphan_note_count()?;
        if orphan_notes > 0 {
            problems.push(format!("{orphan_notes} notes without a card"));
        }

        let models = self.models()?;
        let mids: Vec<i64> = self.query("SELECT DISTINCT mid FROM notes", [], |r| r.get(0))?;
        for mid in mids {
            match models.get(&mid) {
                None => problems.push(format!("notes reference missing model {mid}")),
                Some(model) if model.kind == 0 => {
                    let bad: i64 = self.scalar(
                        "SELECT count() FROM cards c JOIN notes n ON c.nid = n.id
                         WHERE n.mid = ?1 AND c.ord >= ?2",
                        rusqlite::params![mid, model.tmpls.len() as i64],
                    )?;
                    if bad > 0 {
                        problems.push(format!("{bad} cards of model {mid} have no template"));
                    }
                }
                Some(_) => {}
            }
        }
        Ok(problems)
    }

    /// Returns true if [`RecordStore::structural_problems`] finds nothing.
    pub fn basic_check(&self) -> StoreResult<bool> {
        Ok(self.structural_problems()?.is_empty())
    }

    /// SHA-256 over the full logical content of the collection.
    ///
    /// Two stores with equal digests hold the same rows and the same `col`
    /// row, independent of page layout.
    pub fn content_digest(&self) -> StoreResult<String> {
        let mut hasher = Sha256::new();
        hash_table(self, &mut hasher, "SELECT * FROM col")?;
        for (table, columns) in [
            (Note::TABLE, Note::COLUMNS),
            (Card::TABLE, Card::COLUMNS),
            (RevlogEntry::TABLE, RevlogEntry::COLUMNS),
        ] {
            let sql = format!("SELECT {} FROM {table} ORDER BY id", columns.join(", "));
            hash_table(self, &mut hasher, &sql)?;
        }
        hash_table(self, &mut hasher, "SELECT oid, type, usn FROM graves ORDER BY oid, type")?;
        Ok(hex(&hasher.finalize()))
    }
}

fn hash_table(store: &RecordStore, hasher: &mut Sha256, sql: &str) -> StoreResult<()> {
    let mut stmt = store.connection().prepare(sql)?;
    let width = stmt.column_count();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        for i in 0..width {
            match row.get_ref(i)? {
                ValueRef::Null => hasher.update(b"n"),
                ValueRef::Integer(v) => {
                    hasher.update(b"i");
                    hasher.update(v.to_le_bytes());
                }
                ValueRef::Real(v) => {
                    hasher.update(b"r");
                    hasher.update(v.to_le_bytes());
                }
                ValueRef::Text(t) | ValueRef::Blob(t) => {
                    hasher.update(b"t");
                    hasher.update((t.len() as u64).to_le_bytes());
                    hasher.update(t);
                }
            }
        }
        hasher.update(b"\n");
    }
    Ok(())
}
