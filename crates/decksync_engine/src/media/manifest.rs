//! Local media manifest: what the client believes its media folder holds.

use decksync_store::StoreResult;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::debug;

const DDL: &str = "
CREATE TABLE IF NOT EXISTS media (
    fname TEXT PRIMARY KEY NOT NULL,
    hash  TEXT,
    mtime INTEGER NOT NULL,
    dirty INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_media_dirty ON media (dirty);
CREATE TABLE IF NOT EXISTS meta (last_usn INTEGER NOT NULL);
INSERT INTO meta (last_usn) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM meta);
";

/// SHA-256 of file content, lowercase hex.
pub fn file_hash(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    /// File name, relative to the media folder.
    pub fname: String,
    /// Content hash; `None` means the file was deleted.
    pub hash: Option<String>,
    /// File modification time (seconds).
    pub mtime: i64,
    /// True if the change has not been uploaded yet.
    pub dirty: bool,
}

/// What a folder rescan found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// New files.
    pub added: usize,
    /// Files whose content changed.
    pub changed: usize,
    /// Files that disappeared.
    pub removed: usize,
}

/// The client's media manifest, kept in its own SQLite database.
#[derive(Debug)]
pub struct MediaManifest {
    conn: Connection,
}

impl MediaManifest {
    /// Opens (creating if missing) the manifest at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(DDL)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory manifest.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DDL)?;
        Ok(Self { conn })
    }

    /// Highest peer usn this client has caught up with.
    pub fn last_usn(&self) -> StoreResult<i32> {
        Ok(self
            .conn
            .query_row("SELECT last_usn FROM meta", [], |r| r.get(0))?)
    }

    /// Records the peer usn this client has caught up with.
    pub fn set_last_usn(&self, usn: i32) -> StoreResult<()> {
        self.conn.execute("UPDATE meta SET last_usn = ?1", [usn])?;
        Ok(())
    }

    /// Looks up an entry.
    pub fn entry(&self, fname: &str) -> StoreResult<Option<MediaEntry>> {
        Ok(self
            .conn
            .query_row(
                "SELECT fname, hash, mtime, dirty FROM media WHERE fname = ?1",
                [fname],
                entry_from_row,
            )
            .optional()?)
    }

    /// Inserts or replaces an entry.
    pub fn set_entry(&self, fname: &str, hash: Option<&str>, mtime: i64, dirty: bool) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO media (fname, hash, mtime, dirty) VALUES (?1, ?2, ?3, ?4)",
            params![fname, hash, mtime, dirty],
        )?;
        Ok(())
    }

    /// Forgets an entry entirely.
    pub fn remove_entry(&self, fname: &str) -> StoreResult<()> {
        self.conn
            .execute("DELETE FROM media WHERE fname = ?1", [fname])?;
        Ok(())
    }

    /// Up to `limit` dirty entries, by name.
    pub fn dirty_entries(&self, limit: usize) -> StoreResult<Vec<MediaEntry>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT fname, hash, mtime, dirty FROM media WHERE dirty = 1 ORDER BY fname LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// True if anything awaits upload.
    pub fn has_dirty(&self) -> StoreResult<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM media WHERE dirty = 1 LIMIT 1", [], |r| r.get::<_, i64>(0))
            .optional()?
            .is_some())
    }

    /// Marks entries as uploaded. Clean deletions are dropped.
    pub fn mark_clean<'a>(&self, fnames: impl IntoIterator<Item = &'a str>) -> StoreResult<()> {
        for fname in fnames {
            self.conn
                .execute("DELETE FROM media WHERE fname = ?1 AND hash IS NULL", [fname])?;
            self.conn
                .execute("UPDATE media SET dirty = 0 WHERE fname = ?1", [fname])?;
        }
        Ok(())
    }

    /// Number of present (not deleted) files.
    pub fn count(&self) -> StoreResult<u32> {
        Ok(self
            .conn
            .query_row("SELECT count() FROM media WHERE hash IS NOT NULL", [], |r| r.get(0))?)
    }

    /// Compares `folder` with the manifest and marks every difference
    /// dirty. Sub-directories are ignored.
    pub fn rescan(&self, folder: &Path) -> StoreResult<ScanSummary> {
        let mut summary = ScanSummary::default();
        let mut seen = std::collections::BTreeSet::new();

        if folder.is_dir() {
            for item in std::fs::read_dir(folder)? {
                let item = item?;
                let meta = item.metadata()?;
                if !meta.is_file() {
                    continue;
                }
                let Some(fname) = item.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or_default();
                let hash = file_hash(&std::fs::read(item.path())?);

                match self.entry(&fname)? {
                    Some(entry) if entry.hash.as_deref() == Some(hash.as_str()) => {}
                    Some(entry) => {
                        if entry.hash.is_some() {
                            summary.changed += 1;
                        } else {
                            summary.added += 1;
                        }
                        self.set_entry(&fname, Some(&hash), mtime, true)?;
                    }
                    None => {
                        summary.added += 1;
                        self.set_entry(&fname, Some(&hash), mtime, true)?;
                    }
                }
                seen.insert(fname);
            }
        }

        let present: Vec<String> = {
            let mut stmt = self
                .conn
                .prepare_cached("SELECT fname FROM media WHERE hash IS NOT NULL")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        for fname in present.into_iter().filter(|f| !seen.contains(f)) {
            summary.removed += 1;
            self.set_entry(&fname, None, 0, true)?;
        }

        debug!(?summary, folder = %folder.display(), "rescanned media folder");
        Ok(summary)
    }
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaEntry> {
    Ok(MediaEntry {
        fname: row.get(0)?,
        hash: row.get(1)?,
        mtime: row.get(2)?,
        dirty: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            file_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn rescan_tracks_additions_changes_and_removals() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"one").unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"two").unwrap();

        let first = manifest.rescan(dir.path()).unwrap();
        assert_eq!(first, ScanSummary { added: 2, changed: 0, removed: 0 });
        manifest.mark_clean(["a.jpg", "b.jpg"]).unwrap();
        assert!(!manifest.has_dirty().unwrap());

        std::fs::write(dir.path().join("a.jpg"), b"uno").unwrap();
        std::fs::remove_file(dir.path().join("b.jpg")).unwrap();
        let second = manifest.rescan(dir.path()).unwrap();
        assert_eq!(second, ScanSummary { added: 0, changed: 1, removed: 1 });
        assert_eq!(manifest.count().unwrap(), 1);

        let dirty = manifest.dirty_entries(10).unwrap();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[1].hash, None);

        manifest.mark_clean(["b.jpg"]).unwrap();
        assert!(manifest.entry("b.jpg").unwrap().is_none());
    }

    #[test]
    fn last_usn_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("media.db");
        {
            let manifest = MediaManifest::open(&path).unwrap();
            assert_eq!(manifest.last_usn().unwrap(), 0);
            manifest.set_last_usn(12).unwrap();
        }
        assert_eq!(MediaManifest::open(&path).unwrap().last_usn().unwrap(), 12);
    }
}
