//! Row-shaped records shared by sync and import.

use crate::error::StoreResult;
use crate::store::RecordStore;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Row};

/// A row of one of the large tables (`revlog`, `cards`, `notes`).
///
/// `COLUMNS` lists the stored column order; `from_row` and `values` must
/// agree with it.
pub trait Record: Sized + Clone {
    /// Table name.
    const TABLE: &'static str;
    /// Column names, in stored order.
    const COLUMNS: &'static [&'static str];
    /// Index into [`Record::COLUMNS`] of the modification time, `None` for
    /// append-only tables.
    const MTIME_COLUMN: Option<usize>;

    /// Primary id.
    fn id(&self) -> i64;
    /// Update sequence number.
    fn usn(&self) -> i32;
    /// Replaces the update sequence number.
    fn set_usn(&mut self, usn: i32);
    /// Modification time, for tables that carry one.
    fn mtime(&self) -> Option<i64>;
    /// Decodes a row selected with [`Record::COLUMNS`].
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    /// Values in [`Record::COLUMNS`] order.
    fn values(&self) -> Vec<Value>;
}

/// How an insert treats an existing row with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the existing row.
    Replace,
    /// Keep the existing row.
    Ignore,
}

impl WriteMode {
    fn verb(self) -> &'static str {
        match self {
            WriteMode::Replace => "INSERT OR REPLACE",
            WriteMode::Ignore => "INSERT OR IGNORE",
        }
    }
}

fn select_sql<R: Record>() -> String {
    format!("SELECT {} FROM {}", R::COLUMNS.join(", "), R::TABLE)
}

fn insert_sql<R: Record>(mode: WriteMode) -> String {
    let placeholders: Vec<String> = (1..=R::COLUMNS.len()).map(|i| format!("?{i}")).collect();
    format!(
        "{} INTO {} ({}) VALUES ({})",
        mode.verb(),
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

impl RecordStore {
    /// Loads the record with the given id.
    pub fn get<R: Record>(&self, id: i64) -> StoreResult<Option<R>> {
        let sql = format!("{} WHERE id = ?1", select_sql::<R>());
        Ok(self.query(&sql, [id], R::from_row)?.into_iter().next())
    }

    /// Loads records matching `filter` (an SQL expression over the table's
    /// columns), ordered by id.
    pub fn select<R: Record, P: rusqlite::Params>(&self, filter: &str, params: P) -> StoreResult<Vec<R>> {
        let sql = format!("{} WHERE {} ORDER BY id", select_sql::<R>(), filter);
        self.query(&sql, params, R::from_row)
    }

    /// Loads at most `limit` records matching `filter` whose id is above
    /// `after`, ordered by id. Used for keyset paging.
    pub fn select_page<R: Record>(&self, filter: &str, after: i64, limit: usize) -> StoreResult<Vec<R>> {
        let sql = format!(
            "{} WHERE ({}) AND id > ?1 ORDER BY id LIMIT ?2",
            select_sql::<R>(),
            filter
        );
        self.query(&sql, rusqlite::params![after, limit as i64], R::from_row)
    }

    /// Writes one record.
    pub fn write<R: Record>(&self, record: &R, mode: WriteMode) -> StoreResult<bool> {
        let sql = insert_sql::<R>(mode);
        Ok(self.execute(&sql, params_from_iter(record.values()))? > 0)
    }

    /// Writes many records with one prepared statement.
    pub fn write_all<R: Record>(&self, records: &[R], mode: WriteMode) -> StoreResult<usize> {
        let sql = insert_sql::<R>(mode);
        self.execute_many(&sql, records.iter().map(|r| params_from_iter(r.values())))
    }

    /// Modification time of the stored row with `id`, if the table has one
    /// and the row exists.
    pub fn stored_mtime<R: Record>(&self, id: i64) -> StoreResult<Option<i64>> {
        let Some(column) = R::MTIME_COLUMN else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            R::COLUMNS[column],
            R::TABLE
        );
        self.scalar_opt(&sql, [id])
    }

    /// Returns true if a row with `id` exists.
    pub fn exists<R: Record>(&self, id: i64) -> StoreResult<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", R::TABLE);
        Ok(self.scalar_opt::<i64, _>(&sql, [id])?.is_some())
    }

    /// Number of rows in the record's table.
    pub fn count<R: Record>(&self) -> StoreResult<i64> {
        self.scalar(&format!("SELECT count() FROM {}", R::TABLE), [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Note;

    #[test]
    fn pages_follow_the_id_cursor() {
        let store = RecordStore::open_in_memory().unwrap();
        for id in 1..=5 {
            let mut note = Note::new(id, format!("g{id}"), 1, &["x"]);
            note.usn = if id % 2 == 0 { 0 } else { -1 };
            store.write(&note, WriteMode::Replace).unwrap();
        }

        let first: Vec<Note> = store.select_page("usn = -1", i64::MIN, 2).unwrap();
        assert_eq!(first.iter().map(|n| n.id).collect::<Vec<_>>(), vec![1, 3]);
        let rest: Vec<Note> = store.select_page("usn = -1", 3, 2).unwrap();
        assert_eq!(rest.iter().map(|n| n.id).collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn ignore_keeps_existing_row() {
        let store = RecordStore::open_in_memory().unwrap();
        let note = Note::new(1, "g", 1, &["old"]);
        assert!(store.write(&note, WriteMode::Replace).unwrap());

        let newer = Note::new(1, "g", 1, &["new"]);
        assert!(!store.write(&newer, WriteMode::Ignore).unwrap());
        let stored: Note = store.get(1).unwrap().unwrap();
        assert_eq!(stored.fields(), vec!["old"]);
    }
}
