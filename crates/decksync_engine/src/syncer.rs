//! Merge primitives shared by both roles of a sync session.
//!
//! A [`Syncer`] is created per session and per side. It knows which rows
//! this side has to send (through its [`VersionClock`]) and how to fold the
//! peer's rows into the local store. The client drives it from
//! [`crate::SyncSession`]; the in-process server drives it from
//! [`crate::LocalPeer`].

use crate::error::SyncResult;
use decksync_protocol::{Changes, Chunk, ChunkTable, Graves};
use decksync_store::{
    Card, GraveKind, Note, Record, RecordStore, RevlogEntry, Role, UsnWindow, VersionClock,
    WriteMode, PENDING_USN,
};
use tracing::debug;

/// Order in which received deletions are applied.
pub const GRAVE_ORDER: [GraveKind; 3] = [GraveKind::Note, GraveKind::Card, GraveKind::Deck];

/// Rows applied from one chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Rows written.
    pub applied: usize,
    /// Rows dropped because the local copy was at least as new.
    pub kept_local: usize,
    /// Rows dropped because they had been deleted.
    pub buried: usize,
}

/// One side of one sync session.
#[derive(Debug, Clone)]
pub struct Syncer {
    clock: VersionClock,
    window: UsnWindow,
    newer: bool,
    chunk_size: usize,
    table: Option<ChunkTable>,
    cursor: i64,
}

impl Syncer {
    /// Creates the syncer for `role` over a store currently at `usn`.
    ///
    /// `newer` is true if this side's collection was modified more recently
    /// than the peer's.
    pub fn new(role: Role, usn: i32, window: UsnWindow, newer: bool, chunk_size: usize) -> Self {
        Self {
            clock: VersionClock::new(role, usn),
            window,
            newer,
            chunk_size: chunk_size.max(1),
            table: Some(ChunkTable::ORDER[0]),
            cursor: i64::MIN,
        }
    }

    /// The negotiated window.
    pub fn window(&self) -> UsnWindow {
        self.window
    }

    /// The role this syncer plays.
    pub fn role(&self) -> Role {
        self.clock.role()
    }

    fn filter(&self) -> String {
        self.clock.filter_sql(self.window.min_usn)
    }

    fn is_client(&self) -> bool {
        self.clock.role() == Role::Client
    }

    /// Deletions this side has to send. The client stamps them with
    /// `max_usn` so they are not sent again.
    pub fn pending_graves(&self, store: &RecordStore) -> SyncResult<Graves> {
        let graves = store.graves_where(&self.filter(), [])?;
        if self.is_client() {
            store.execute(
                "UPDATE graves SET usn = ?1 WHERE usn = ?2",
                [self.window.max_usn, PENDING_USN],
            )?;
        }
        Ok(Graves::from_graves(graves))
    }

    /// Applies the peer's deletions. The graves written here already exist
    /// on the peer and are stamped with the store's own usn.
    pub fn apply_graves(&self, store: &RecordStore, graves: &Graves) -> SyncResult<()> {
        let usn = self.clock.applied_stamp();
        for kind in GRAVE_ORDER {
            let ids = graves.ids(kind);
            if ids.is_empty() {
                continue;
            }
            match kind {
                GraveKind::Note => store.remove_notes_only(ids, usn)?,
                GraveKind::Card => store.remove_cards(ids, usn, false)?,
                GraveKind::Deck => store.remove_decks(ids, usn)?,
            }
        }
        debug!(role = ?self.role(), count = graves.len(), "applied graves");
        Ok(())
    }

    /// Small objects this side has to send.
    ///
    /// Everything sent carries `max_usn`; the client also persists that
    /// stamp. Global config and creation time are included only when this
    /// side is newer.
    pub fn local_changes(&self, store: &RecordStore) -> SyncResult<Changes> {
        let max = self.window.max_usn;
        let min = self.window.min_usn;
        let mut changes = Changes::default();

        for mut model in store.models()?.into_values() {
            if self.clock.selects(model.usn, min) {
                model.usn = max;
                if self.is_client() {
                    store.put_model(&model)?;
                }
                changes.models.push(model);
            }
        }
        for mut deck in store.decks()?.into_values() {
            if self.clock.selects(deck.usn, min) {
                deck.usn = max;
                if self.is_client() {
                    store.put_deck(&deck)?;
                }
                changes.decks.push(deck);
            }
        }
        for mut conf in store.deck_confs()?.into_values() {
            if self.clock.selects(conf.usn, min) {
                conf.usn = max;
                if self.is_client() {
                    store.put_deck_conf(&conf)?;
                }
                changes.deck_confs.push(conf);
            }
        }

        let mut registry = store.tags()?;
        let mut stamped = false;
        for (tag, usn) in registry.iter_mut() {
            if self.clock.selects(*usn, min) {
                changes.tags.push(tag.clone());
                if self.is_client() {
                    *usn = max;
                    stamped = true;
                }
            }
        }
        if stamped {
            store.set_tags(&registry)?;
        }

        if self.newer {
            let meta = store.meta()?;
            changes.conf = Some(meta.conf);
            changes.crt = Some(meta.crt);
        }

        debug!(role = ?self.role(), objects = changes.object_count(), "collected changes");
        Ok(changes)
    }

    /// Folds the peer's small objects into the store. An object replaces
    /// the local one only if its mtime is strictly greater.
    pub fn merge_changes(&self, store: &RecordStore, changes: &Changes) -> SyncResult<()> {
        let models = store.models()?;
        for model in &changes.models {
            if models.get(&model.id).map_or(true, |local| model.mtime > local.mtime) {
                store.put_model(model)?;
            }
        }
        let decks = store.decks()?;
        for deck in &changes.decks {
            if decks.get(&deck.id).map_or(true, |local| deck.mtime > local.mtime) {
                store.put_deck(deck)?;
            }
        }
        let confs = store.deck_confs()?;
        for conf in &changes.deck_confs {
            if confs.get(&conf.id).map_or(true, |local| conf.mtime > local.mtime) {
                store.put_deck_conf(conf)?;
            }
        }

        store.register_tags(changes.tags.iter().map(String::as_str), self.window.max_usn)?;

        if let Some(conf) = &changes.conf {
            store.set_conf(conf)?;
        }
        if let Some(crt) = changes.crt {
            store.set_crt(crt)?;
        }
        Ok(())
    }

    /// True once every table has been sent.
    pub fn is_drained(&self) -> bool {
        self.table.is_none()
    }

    /// Next page of rows to send, at most `chunk_size` rows across tables.
    ///
    /// Rows are keyset-paged by id. Once a table drains, the client
    /// rewrites its pending rows in that table to `max_usn`.
    pub fn chunk(&mut self, store: &RecordStore) -> SyncResult<Chunk> {
        let mut chunk = Chunk::default();
        let mut remaining = self.chunk_size;

        while let Some(table) = self.table {
            if remaining == 0 {
                break;
            }
            let (taken, last_id) = match table {
                ChunkTable::Revlog => self.page::<RevlogEntry>(store, remaining, &mut chunk.revlog)?,
                ChunkTable::Cards => self.page::<Card>(store, remaining, &mut chunk.cards)?,
                ChunkTable::Notes => self.page::<Note>(store, remaining, &mut chunk.notes)?,
            };
            if let Some(id) = last_id {
                self.cursor = id;
            }
            if taken < remaining {
                self.finish_table(store, table)?;
                self.table = table.next();
                self.cursor = i64::MIN;
            }
            remaining -= taken;
        }

        chunk.done = self.table.is_none();
        Ok(chunk)
    }

    fn page<R: Record>(
        &self,
        store: &RecordStore,
        limit: usize,
        out: &mut Vec<R>,
    ) -> SyncResult<(usize, Option<i64>)> {
        let rows: Vec<R> = store.select_page(&self.filter(), self.cursor, limit)?;
        let taken = rows.len();
        let last = rows.last().map(Record::id);
        out.extend(rows.into_iter().map(|mut row| {
            row.set_usn(self.window.max_usn);
            row
        }));
        Ok((taken, last))
    }

    fn finish_table(&self, store: &RecordStore, table: ChunkTable) -> SyncResult<()> {
        if !self.is_client() {
            return Ok(());
        }
        let name = match table {
            ChunkTable::Revlog => RevlogEntry::TABLE,
            ChunkTable::Cards => Card::TABLE,
            ChunkTable::Notes => Note::TABLE,
        };
        store.execute(
            &format!("UPDATE {name} SET usn = ?1 WHERE usn = ?2"),
            [self.window.max_usn, PENDING_USN],
        )?;
        Ok(())
    }

    /// Applies one page of the peer's rows.
    ///
    /// Review log rows are insert-or-ignore. Cards and notes replace the
    /// local row only if strictly newer, and are dropped if a grave of the
    /// same kind exists.
    pub fn apply_chunk(&self, store: &RecordStore, chunk: &Chunk) -> SyncResult<ChunkStats> {
        let mut stats = ChunkStats::default();
        let inserted = store.write_all(&chunk.revlog, WriteMode::Ignore)?;
        stats.applied += inserted;
        stats.kept_local += chunk.revlog.len() - inserted;

        merge_rows(store, &chunk.cards, GraveKind::Card, &mut stats)?;
        merge_rows(store, &chunk.notes, GraveKind::Note, &mut stats)?;
        Ok(stats)
    }
}

fn merge_rows<R: Record>(
    store: &RecordStore,
    rows: &[R],
    kind: GraveKind,
    stats: &mut ChunkStats,
) -> SyncResult<()> {
    for row in rows {
        if store.has_grave(row.id(), kind)? {
            stats.buried += 1;
            continue;
        }
        let newer = match (store.stored_mtime::<R>(row.id())?, row.mtime()) {
            (Some(local), Some(incoming)) => incoming > local,
            _ => true,
        };
        if newer {
            store.write(row, WriteMode::Replace)?;
            stats.applied += 1;
        } else {
            stats.kept_local += 1;
        }
    }
    Ok(())
}
