//! Collection schema and first-run initialization.
//!
//! The layout is the classic single-file collection:
//!
//! ```text
//! col     one row: crt, mod, scm, ver, usn, ls + JSON blobs
//!         (conf, models, decks, dconf, tags)
//! notes   id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data
//! cards   id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
//!         reps, lapses, left, odue, odid, flags, data
//! revlog  id, cid, usn, ease, ivl, lastIvl, factor, time, type
//! graves  usn, oid, type
//! ```

use crate::deck::{Deck, DeckConf, DEFAULT_CONF_ID, DEFAULT_DECK_ID};
use crate::error::StoreResult;
use crate::time::{now_millis, now_secs, SECS_PER_DAY};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

/// Collection format version written to `col.ver`.
pub const SCHEMA_VERSION: i64 = 11;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS col (
    id      integer primary key,
    crt     integer not null,
    mod     integer not null,
    scm     integer not null,
    ver     integer not null,
    dty     integer not null,
    usn     integer not null,
    ls      integer not null,
    conf    text not null,
    models  text not null,
    decks   text not null,
    dconf   text not null,
    tags    text not null
);
CREATE TABLE IF NOT EXISTS notes (
    id      integer primary key,
    guid    text not null,
    mid     integer not null,
    mod     integer not null,
    usn     integer not null,
    tags    text not null,
    flds    text not null,
    sfld    text not null,
    csum    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE IF NOT EXISTS cards (
    id      integer primary key,
    nid     integer not null,
    did     integer not null,
    ord     integer not null,
    mod     integer not null,
    usn     integer not null,
    type    integer not null,
    queue   integer not null,
    due     integer not null,
    ivl     integer not null,
    factor  integer not null,
    reps    integer not null,
    lapses  integer not null,
    left    integer not null,
    odue    integer not null,
    odid    integer not null,
    flags   integer not null,
    data    text not null
);
CREATE TABLE IF NOT EXISTS revlog (
    id      integer primary key,
    cid     integer not null,
    usn     integer not null,
    ease    integer not null,
    ivl     integer not null,
    lastIvl integer not null,
    factor  integer not null,
    time    integer not null,
    type    integer not null
);
CREATE TABLE IF NOT EXISTS graves (
    usn     integer not null,
    oid     integer not null,
    type    integer not null
);
CREATE UNIQUE INDEX IF NOT EXISTS ix_graves_oid_type ON graves (oid, type);
CREATE INDEX IF NOT EXISTS ix_notes_usn ON notes (usn);
CREATE INDEX IF NOT EXISTS ix_notes_guid ON notes (guid);
CREATE INDEX IF NOT EXISTS ix_cards_usn ON cards (usn);
CREATE INDEX IF NOT EXISTS ix_cards_nid ON cards (nid);
CREATE INDEX IF NOT EXISTS ix_cards_sched ON cards (did, queue, due);
CREATE INDEX IF NOT EXISTS ix_revlog_usn ON revlog (usn);
CREATE INDEX IF NOT EXISTS ix_revlog_cid ON revlog (cid);
";

/// Creates the tables if needed and seeds the `col` row on an empty file.
pub(crate) fn initialize(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(DDL)?;

    let rows: i64 = conn.query_row("SELECT count() FROM col", [], |r| r.get(0))?;
    if rows > 0 {
        return Ok(());
    }

    let now = now_secs();
    let crt = now - now % SECS_PER_DAY;
    let millis = now_millis();

    let mut decks = BTreeMap::new();
    decks.insert(DEFAULT_DECK_ID, Deck::default_deck());
    let mut dconf = BTreeMap::new();
    dconf.insert(DEFAULT_CONF_ID, DeckConf::default_conf());
    let conf = serde_json::json!({ "nextPos": 1, "curDeck": DEFAULT_DECK_ID });

    conn.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?3, ?4, 0, 0, 0, ?5, '{}', ?6, ?7, '{}')",
        params![
            crt,
            millis,
            millis,
            SCHEMA_VERSION,
            serde_json::to_string(&conf)?,
            serde_json::to_string(&decks)?,
            serde_json::to_string(&dconf)?,
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT count() FROM col", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn seeds_default_deck_and_conf() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let decks: String = conn
            .query_row("SELECT decks FROM col", [], |r| r.get(0))
            .unwrap();
        let decks: BTreeMap<i64, Deck> = serde_json::from_str(&decks).unwrap();
        assert_eq!(decks[&DEFAULT_DECK_ID].name, "Default");
        assert_eq!(decks[&DEFAULT_DECK_ID].conf, DEFAULT_CONF_ID);
    }
}
