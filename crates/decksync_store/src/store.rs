//! The transactional record store.

use crate::error::{StoreError, StoreResult};
use crate::lock::CollectionLock;
use crate::schema;
use rusqlite::types::FromSql;
use rusqlite::{Connection, DatabaseName, OpenFlags, OptionalExtension, Params, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A collection store backed by a single SQLite file (or memory).
///
/// All mutation groups run inside named savepoints. Savepoints nest, so a
/// group opened with [`RecordStore::transaction`] may itself call code that
/// opens further groups.
///
/// # Example
///
/// ```rust,ignore
/// let store = RecordStore::open("collection.anki2")?;
/// store.transaction("rename", |s| {
///     s.execute("UPDATE notes SET usn = -1 WHERE id = ?1", [nid])?;
///     Ok::<_, StoreError>(())
/// })?;
/// ```
#[derive(Debug)]
pub struct RecordStore {
    conn: Connection,
    path: Option<PathBuf>,
    read_only: bool,
    _lock: Option<CollectionLock>,
}

impl RecordStore {
    /// Opens (creating if missing) the collection at `path`.
    ///
    /// Takes the advisory lock `<path>.lock`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let lock = CollectionLock::acquire(path)?;
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "opened collection");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            read_only: false,
            _lock: Some(lock),
        })
    }

    /// Opens an existing collection without write access and without the
    /// lock file. Used for import sources.
    pub fn open_read_only(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("collection not found: {}", path.display()),
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let has_col: i64 = conn.query_row(
            "SELECT count() FROM sqlite_master WHERE type = 'table' AND name = 'col'",
            [],
            |r| r.get(0),
        )?;
        if has_col == 0 {
            return Err(StoreError::corrupted("missing col table"));
        }
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            read_only: true,
            _lock: None,
        })
    }

    /// Creates a fresh in-memory collection.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn,
            path: None,
            read_only: false,
            _lock: None,
        })
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns true if the store was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs a query and maps every row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> StoreResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params, f)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Executes a single statement and returns the affected row count.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> StoreResult<usize> {
        Ok(self.conn.prepare_cached(sql)?.execute(params)?)
    }

    /// Executes one statement once per parameter set.
    pub fn execute_many<P, I>(&self, sql: &str, rows: I) -> StoreResult<usize>
    where
        P: Params,
        I: IntoIterator<Item = P>,
    {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let mut changed = 0;
        for params in rows {
            changed += stmt.execute(params)?;
        }
        Ok(changed)
    }

    /// Returns the first column of the first row.
    pub fn scalar<T: FromSql, P: Params>(&self, sql: &str, params: P) -> StoreResult<T> {
        Ok(self.conn.query_row(sql, params, |r| r.get(0))?)
    }

    /// Like [`RecordStore::scalar`], but `None` when the query returns no row.
    pub fn scalar_opt<T: FromSql, P: Params>(&self, sql: &str, params: P) -> StoreResult<Option<T>> {
        Ok(self
            .conn
            .query_row(sql, params, |r| r.get(0))
            .optional()?)
    }

    /// Opens the named savepoint.
    pub fn savepoint(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    /// Releases (commits) the named savepoint.
    pub fn release(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        self.conn.execute_batch(&format!("RELEASE {name}"))?;
        Ok(())
    }

    /// Rolls back to and then releases the named savepoint.
    pub fn rollback_to(&self, name: &str) -> StoreResult<()> {
        check_savepoint_name(name)?;
        self.conn
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        Ok(())
    }

    /// Returns true if no transaction or savepoint is open.
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    /// Runs `f` inside the named savepoint.
    ///
    /// The savepoint is released when `f` returns `Ok` and rolled back when
    /// it returns `Err`; the error is then returned unchanged.
    pub fn transaction<T, E, F>(&self, name: &str, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&Self) -> Result<T, E>,
    {
        self.savepoint(name)?;
        match f(self) {
            Ok(value) => {
                self.release(name)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback_to(name) {
                    tracing::warn!(savepoint = name, error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs `PRAGMA integrity_check`.
    pub fn integrity_check(&self) -> StoreResult<()> {
        let results: Vec<String> = self.query("PRAGMA integrity_check", [], |r| r.get(0))?;
        if results.len() == 1 && results[0] == "ok" {
            Ok(())
        } else {
            Err(StoreError::corrupted(results.join("; ")))
        }
    }

    /// Refreshes planner statistics and, when requested and possible,
    /// reclaims free pages.
    pub fn maintain(&self, vacuum: bool) -> StoreResult<()> {
        if self.read_only {
            return Ok(());
        }
        self.conn.execute_batch("ANALYZE")?;
        if vacuum && self.conn.is_autocommit() {
            self.conn.execute_batch("VACUUM")?;
        }
        Ok(())
    }

    /// Writes a compacted copy of the whole collection to `dest`.
    pub fn export_to(&self, dest: &Path) -> StoreResult<()> {
        if !self.conn.is_autocommit() {
            return Err(StoreError::invalid_operation(
                "cannot export while a transaction is open",
            ));
        }
        if dest.exists() {
            std::fs::remove_file(dest)?;
        }
        let dest = dest.to_str().ok_or_else(|| {
            StoreError::invalid_operation(format!("non utf-8 path: {}", dest.display()))
        })?;
        self.conn.execute("VACUUM INTO ?1", [dest])?;
        Ok(())
    }

    /// Replaces the whole content of this store with the collection at `src`.
    ///
    /// The caller is expected to have verified `src` first.
    pub fn replace_from(&mut self, src: &Path) -> StoreResult<()> {
        if self.read_only {
            return Err(StoreError::invalid_operation("store is read-only"));
        }
        if !self.conn.is_autocommit() {
            return Err(StoreError::invalid_operation(
                "cannot replace while a transaction is open",
            ));
        }
        self.conn.restore(
            DatabaseName::Main,
            src,
            None::<fn(rusqlite::backup::Progress)>,
        )?;
        schema::initialize(&self.conn)?;
        debug!(src = %src.display(), "replaced collection content");
        Ok(())
    }
}

fn check_savepoint_name(name: &str) -> StoreResult<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(StoreError::invalid_operation(format!(
            "invalid savepoint name: {name:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn transaction_commits_on_ok() {
        let store = RecordStore::open_in_memory().unwrap();
        store
            .transaction("t", |s| {
                s.execute("UPDATE col SET usn = 7", [])?;
                Ok::<_, StoreError>(())
            })
            .unwrap();
        assert_eq!(store.scalar::<i32, _>("SELECT usn FROM col", []).unwrap(), 7);
    }

    #[test]
    fn transaction_rolls_back_on_err() {
        let store = RecordStore::open_in_memory().unwrap();
        let result: StoreResult<()> = store.transaction("t", |s| {
            s.execute("UPDATE col SET usn = 7", [])?;
            Err(StoreError::invalid_operation("boom"))
        });
        assert!(result.is_err());
        assert_eq!(store.scalar::<i32, _>("SELECT usn FROM col", []).unwrap(), 0);
        assert!(store.is_autocommit());
    }

    #[test]
    fn nested_savepoints() {
        let store = RecordStore::open_in_memory().unwrap();
        store.savepoint("outer").unwrap();
        store.execute("UPDATE col SET usn = 1", []).unwrap();
        store.savepoint("inner").unwrap();
        store.execute("UPDATE col SET usn = 2", []).unwrap();
        store.rollback_to("inner").unwrap();
        store.release("outer").unwrap();
        assert_eq!(store.scalar::<i32, _>("SELECT usn FROM col", []).unwrap(), 1);
    }

    #[test]
    fn rejects_bad_savepoint_names() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.savepoint("x; DROP TABLE notes").is_err());
        assert!(store.savepoint("").is_err());
    }

    #[test]
    fn integrity_check_passes_on_fresh_store() {
        let store = RecordStore::open_in_memory().unwrap();
        store.integrity_check().unwrap();
        store.maintain(true).unwrap();
    }

    #[test]
    fn export_then_replace() {
        let dir = tempdir().unwrap();
        let a_path = dir.path().join("a.anki2");
        let copy_path = dir.path().join("copy.anki2");

        let a = RecordStore::open(&a_path).unwrap();
        a.execute("UPDATE col SET usn = 42", []).unwrap();
        a.export_to(&copy_path).unwrap();

        let mut b = RecordStore::open_in_memory().unwrap();
        b.replace_from(&copy_path).unwrap();
        assert_eq!(b.scalar::<i32, _>("SELECT usn FROM col", []).unwrap(), 42);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.anki2");
        let _first = RecordStore::open(&path).unwrap();
        assert!(matches!(
            RecordStore::open(&path),
            Err(StoreError::CollectionLocked)
        ));
    }

    #[test]
    fn read_only_requires_existing_file() {
        let dir = tempdir().unwrap();
        assert!(RecordStore::open_read_only(dir.path().join("missing.anki2")).is_err());
    }
}
