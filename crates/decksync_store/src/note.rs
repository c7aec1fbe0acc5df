//! Notes.

use crate::record::Record;
use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Separator between the stored field values of a note.
pub const FIELD_SEPARATOR: char = '\x1f';

/// A note: the content shared by one or more cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Note id.
    pub id: i64,
    /// Globally unique id, stable across collections.
    pub guid: String,
    /// Model id.
    pub mid: i64,
    /// Modification time (seconds).
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i32,
    /// Space-separated tags.
    pub tags: String,
    /// Field values joined by [`FIELD_SEPARATOR`].
    pub flds: String,
    /// Sort field cache.
    pub sfld: String,
    /// Checksum of the first field.
    pub csum: i64,
    /// Flags.
    pub flags: i32,
    /// Unused payload.
    pub data: String,
}

impl Note {
    /// Creates a note with the given field values; caches are filled in.
    pub fn new(id: i64, guid: impl Into<String>, mid: i64, fields: &[&str]) -> Self {
        let mut note = Self {
            id,
            guid: guid.into(),
            mid,
            mtime: 0,
            usn: 0,
            tags: String::new(),
            flds: String::new(),
            sfld: String::new(),
            csum: 0,
            flags: 0,
            data: String::new(),
        };
        note.set_fields(fields);
        note
    }

    /// Field values, in model order.
    pub fn fields(&self) -> Vec<&str> {
        self.flds.split(FIELD_SEPARATOR).collect()
    }

    /// Replaces the field values and refreshes the caches (sort field 0).
    pub fn set_fields(&mut self, fields: &[&str]) {
        self.flds = fields.join(&FIELD_SEPARATOR.to_string());
        self.refresh_cache(0);
    }

    /// Recomputes the sort field and checksum caches.
    pub fn refresh_cache(&mut self, sort_field: usize) {
        let (sfld, first) = {
            let fields = self.fields();
            (
                fields.get(sort_field).copied().unwrap_or_default().to_string(),
                fields.first().copied().unwrap_or_default().to_string(),
            )
        };
        self.sfld = sfld;
        self.csum = field_checksum(&first);
    }
}

/// Checksum of a field value: the first 32 bits of its SHA-256 digest.
pub fn field_checksum(value: &str) -> i64 {
    let digest = Sha256::digest(value.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

impl Record for Note {
    const TABLE: &'static str = "notes";
    const COLUMNS: &'static [&'static str] = &[
        "id", "guid", "mid", "mod", "usn", "tags", "flds", "sfld", "csum", "flags", "data",
    ];
    const MTIME_COLUMN: Option<usize> = Some(3);

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
            guid: row.get(1)?,
            mid: row.get(2)?,
            mtime: row.get(3)?,
            usn: row.get(4)?,
            tags: row.get(5)?,
            flds: row.get(6)?,
            sfld: row.get(7)?,
            csum: row.get(8)?,
            flags: row.get(9)?,
            data: row.get(10)?,
        })
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.id),
            Value::Text(self.guid.clone()),
            Value::Integer(self.mid),
            Value::Integer(self.mtime),
            Value::Integer(i64::from(self.usn)),
            Value::Text(self.tags.clone()),
            Value::Text(self.flds.clone()),
            Value::Text(self.sfld.clone()),
            Value::Integer(self.csum),
            Value::Integer(i64::from(self.flags)),
            Value::Text(self.data.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::WriteMode;
    use crate::RecordStore;

    #[test]
    fn modification_time_is_column_three() {
        assert_eq!(Note::MTIME_COLUMN, Some(3));
        assert_eq!(Note::COLUMNS[3], "mod");
        assert_eq!(Note::COLUMNS[4], "usn");

        let mut note = Note::new(1, "g", 5, &["a"]);
        note.mtime = 1000;
        note.usn = 7;
        assert_eq!(note.values()[3], Value::Integer(1000));
        assert_eq!(note.values()[4], Value::Integer(7));
    }

    #[test]
    fn fields_and_caches() {
        let mut note = Note::new(1, "g", 5, &["front", "back"]);
        assert_eq!(note.fields(), vec!["front", "back"]);
        assert_eq!(note.sfld, "front");
        assert_eq!(note.csum, field_checksum("front"));

        note.refresh_cache(1);
        assert_eq!(note.sfld, "back");
    }

    #[test]
    fn stored_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut note = Note::new(100, "abc", 5, &["x", "y"]);
        note.mtime = 1000;
        note.tags = " t ".into();
        store.write(&note, WriteMode::Replace).unwrap();

        assert_eq!(store.get::<Note>(100).unwrap(), Some(note));
        assert_eq!(store.stored_mtime::<Note>(100).unwrap(), Some(1000));
        assert_eq!(store.stored_mtime::<Note>(101).unwrap(), None);
    }
}
