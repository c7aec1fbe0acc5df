//! Collection-level metadata stored in the `col` row.

use crate::clock::PENDING_USN;
use crate::error::StoreResult;
use crate::store::RecordStore;
use crate::time::{now_millis, now_secs, SECS_PER_DAY};
use serde::{Deserialize, Serialize};

/// Collection-wide metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Creation time (seconds, start of the creation day).
    pub crt: i64,
    /// Last modification (milliseconds).
    pub mtime: i64,
    /// Last schema modification (milliseconds).
    pub scm: i64,
    /// Format version.
    pub ver: i64,
    /// Current update sequence number.
    pub usn: i32,
    /// Last successful sync (milliseconds).
    pub last_sync: i64,
    /// Global configuration object.
    pub conf: serde_json::Value,
}

impl CollectionMeta {
    /// Day index of "today" relative to creation.
    pub fn today(&self) -> i64 {
        (now_secs() - self.crt) / SECS_PER_DAY
    }
}

impl RecordStore {
    /// Loads the collection metadata.
    pub fn meta(&self) -> StoreResult<CollectionMeta> {
        let (crt, mtime, scm, ver, usn, last_sync, conf): (i64, i64, i64, i64, i32, i64, String) =
            self.connection().query_row(
                "SELECT crt, mod, scm, ver, usn, ls, conf FROM col",
                [],
                |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                    ))
                },
            )?;
        Ok(CollectionMeta {
            crt,
            mtime,
            scm,
            ver,
            usn,
            last_sync,
            conf: serde_json::from_str(&conf)?,
        })
    }

    /// Current update sequence number of the collection.
    pub fn usn(&self) -> StoreResult<i32> {
        self.scalar("SELECT usn FROM col", [])
    }

    /// Sets the update sequence number.
    pub fn set_usn(&self, usn: i32) -> StoreResult<()> {
        self.execute("UPDATE col SET usn = ?1", [usn])?;
        Ok(())
    }

    /// Marks the collection modified now.
    pub fn set_modified(&self) -> StoreResult<()> {
        self.set_modified_at(now_millis())
    }

    /// Marks the collection modified at `mtime` (milliseconds).
    pub fn set_modified_at(&self, mtime: i64) -> StoreResult<()> {
        self.execute("UPDATE col SET mod = ?1", [mtime])?;
        Ok(())
    }

    /// Records a schema change, which forces the next sync to be a full one.
    pub fn bump_schema(&self) -> StoreResult<()> {
        let now = now_millis();
        self.execute("UPDATE col SET scm = ?1, mod = ?1", [now])?;
        Ok(())
    }

    /// Records a completed sync: modification and last-sync time become
    /// `mtime` and the collection usn becomes `usn`.
    pub fn finish_sync(&self, mtime: i64, usn: i32) -> StoreResult<()> {
        self.execute(
            "UPDATE col SET mod = ?1, ls = ?1, usn = ?2",
            rusqlite::params![mtime, usn],
        )?;
        Ok(())
    }

    /// Rewrites every pending usn (rows, graves, models, decks, deck
    /// configurations and tags) to `usn`.
    pub fn clear_pending(&self, usn: i32) -> StoreResult<()> {
        for table in ["notes", "cards", "revlog", "graves"] {
            self.execute(
                &format!("UPDATE {table} SET usn = ?1 WHERE usn = ?2"),
                [usn, PENDING_USN],
            )?;
        }
        for mut model in self.models()?.into_values().filter(|m| m.usn == PENDING_USN) {
            model.usn = usn;
            self.put_model(&model)?;
        }
        for mut deck in self.decks()?.into_values().filter(|d| d.usn == PENDING_USN) {
            deck.usn = usn;
            self.put_deck(&deck)?;
        }
        for mut conf in self.deck_confs()?.into_values().filter(|c| c.usn == PENDING_USN) {
            conf.usn = usn;
            self.put_deck_conf(&conf)?;
        }
        let mut tags = self.tags()?;
        if tags.values().any(|&t| t == PENDING_USN) {
            tags.values_mut()
                .filter(|t| **t == PENDING_USN)
                .for_each(|t| *t = usn);
            self.set_tags(&tags)?;
        }
        Ok(())
    }

    /// Replaces the global configuration object.
    pub fn set_conf(&self, conf: &serde_json::Value) -> StoreResult<()> {
        self.execute("UPDATE col SET conf = ?1", [serde_json::to_string(conf)?])?;
        Ok(())
    }

    /// Sets the creation time.
    pub fn set_crt(&self, crt: i64) -> StoreResult<()> {
        self.execute("UPDATE col SET crt = ?1", [crt])?;
        Ok(())
    }

    /// Reads an integer config key, falling back to `default`.
    pub fn conf_i64(&self, key: &str, default: i64) -> StoreResult<i64> {
        Ok(self.meta()?.conf.get(key).and_then(|v| v.as_i64()).unwrap_or(default))
    }

    /// Writes an integer config key.
    pub fn set_conf_i64(&self, key: &str, value: i64) -> StoreResult<()> {
        let mut conf = self.meta()?.conf;
        if !conf.is_object() {
            conf = serde_json::json!({});
        }
        conf[key] = serde_json::Value::from(value);
        self.set_conf(&conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_meta() {
        let store = RecordStore::open_in_memory().unwrap();
        let meta = store.meta().unwrap();
        assert_eq!(meta.usn, 0);
        assert_eq!(meta.last_sync, 0);
        assert_eq!(meta.today(), 0);
        assert_eq!(meta.crt % SECS_PER_DAY, 0);
        assert_eq!(store.conf_i64("nextPos", 0).unwrap(), 1);
    }

    #[test]
    fn bump_schema_changes_scm() {
        let store = RecordStore::open_in_memory().unwrap();
        store.execute("UPDATE col SET scm = 0", []).unwrap();
        store.bump_schema().unwrap();
        assert!(store.meta().unwrap().scm > 0);
    }

    #[test]
    fn finish_sync_sets_all_three() {
        let store = RecordStore::open_in_memory().unwrap();
        store.finish_sync(1234, 9).unwrap();
        let meta = store.meta().unwrap();
        assert_eq!(meta.mtime, 1234);
        assert_eq!(meta.last_sync, 1234);
        assert_eq!(meta.usn, 9);
    }

    #[test]
    fn clear_pending_rewrites_everything() {
        let store = RecordStore::open_in_memory().unwrap();
        store.register_tags(["t"], PENDING_USN).unwrap();
        store.add_grave(3, crate::GraveKind::Card, PENDING_USN).unwrap();
        let mut deck = crate::Deck::new(2, "x");
        deck.usn = PENDING_USN;
        store.put_deck(&deck).unwrap();
        assert_eq!(store.sanity_digest().unwrap().pending, 3);

        store.clear_pending(0).unwrap();
        assert_eq!(store.sanity_digest().unwrap().pending, 0);
        assert_eq!(store.tags().unwrap()["t"], 0);
    }

    #[test]
    fn conf_keys_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        store.set_conf_i64("nextPos", 77).unwrap();
        assert_eq!(store.conf_i64("nextPos", 0).unwrap(), 77);
        assert_eq!(store.conf_i64("missing", 5).unwrap(), 5);
    }
}
