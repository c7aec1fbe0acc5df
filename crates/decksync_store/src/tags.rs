//! Tag registry.

use crate::error::StoreResult;
use crate::store::RecordStore;
use std::collections::BTreeMap;

/// Splits a note's space-separated tag string.
pub fn split_tags(tags: &str) -> impl Iterator<Item = &str> {
    tags.split_whitespace()
}

/// Joins tags into the stored form: space separated, padded by spaces.
pub fn join_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> String {
    let joined: Vec<&str> = tags.into_iter().filter(|t| !t.is_empty()).collect();
    if joined.is_empty() {
        String::new()
    } else {
        format!(" {} ", joined.join(" "))
    }
}

impl RecordStore {
    /// The tag registry: tag name to usn.
    pub fn tags(&self) -> StoreResult<BTreeMap<String, i32>> {
        let json: String = self.scalar("SELECT tags FROM col", [])?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Registers tags that are not yet known, stamping them with `usn`.
    ///
    /// Returns true if any tag was added.
    pub fn register_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
        usn: i32,
    ) -> StoreResult<bool> {
        let mut registry = self.tags()?;
        let mut added = false;
        for tag in tags {
            if !registry.contains_key(tag) {
                registry.insert(tag.to_string(), usn);
                added = true;
            }
        }
        if added {
            self.write_tags(&registry)?;
        }
        Ok(added)
    }

    /// Replaces the whole registry.
    pub fn set_tags(&self, registry: &BTreeMap<String, i32>) -> StoreResult<()> {
        self.write_tags(registry)
    }

    fn write_tags(&self, registry: &BTreeMap<String, i32>) -> StoreResult<()> {
        self.execute("UPDATE col SET tags = ?1", [serde_json::to_string(registry)?])?;
        Ok(())
    }
}
