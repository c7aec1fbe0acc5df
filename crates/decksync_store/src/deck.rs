//! Decks and deck configurations.
//!
//! Deck names form a hierarchy through the `::` separator; a deck's parents
//! are implied by the prefixes of its name.

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Id of the catch-all default deck.
pub const DEFAULT_DECK_ID: i64 = 1;

/// Id of the placeholder deck configuration.
pub const DEFAULT_CONF_ID: i64 = 1;

/// Name of the catch-all default deck.
pub const DEFAULT_DECK_NAME: &str = "Default";

/// Separator between hierarchy levels of a deck name.
pub const DECK_SEPARATOR: &str = "::";

/// A deck.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// Deck id.
    pub id: i64,
    /// Full hierarchical name.
    pub name: String,
    /// Modification time (seconds).
    #[serde(rename = "mod")]
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i32,
    /// Description.
    #[serde(default)]
    pub desc: String,
    /// True for filtered (dynamic) decks.
    #[serde(rename = "dyn", default)]
    pub filtered: bool,
    /// Deck configuration id.
    #[serde(default = "default_conf_id")]
    pub conf: i64,
    /// Collapsed in the deck browser.
    #[serde(default)]
    pub collapsed: bool,
}

fn default_conf_id() -> i64 {
    DEFAULT_CONF_ID
}

impl Deck {
    /// Creates a regular deck using the placeholder configuration.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mtime: 0,
            usn: 0,
            desc: String::new(),
            filtered: false,
            conf: DEFAULT_CONF_ID,
            collapsed: false,
        }
    }

    pub(crate) fn default_deck() -> Self {
        Self::new(DEFAULT_DECK_ID, DEFAULT_DECK_NAME)
    }
}

/// Order in which new cards are introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewCardOrder {
    /// Shuffled.
    Random,
    /// In the order they were added.
    Due,
}

/// Scheduling configuration shared by decks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckConf {
    /// Configuration id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Modification time (seconds).
    #[serde(rename = "mod")]
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i32,
    /// New cards introduced per day.
    pub new_per_day: u32,
    /// Reviews per day.
    pub reviews_per_day: u32,
    /// New card order.
    pub new_order: NewCardOrder,
    /// Maximum interval, in days.
    pub max_interval: u32,
    /// Starting ease, in permille.
    pub starting_ease: u32,
}

impl DeckConf {
    /// Creates a configuration with stock scheduling parameters.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            mtime: 0,
            usn: 0,
            new_per_day: 20,
            reviews_per_day: 200,
            new_order: NewCardOrder::Due,
            max_interval: 36_500,
            starting_ease: 2_500,
        }
    }

    pub(crate) fn default_conf() -> Self {
        Self::new(DEFAULT_CONF_ID, "Default")
    }
}

/// Names of every ancestor of `name`, outermost first.
///
/// `"a::b::c"` yields `["a", "a::b"]`.
pub fn parent_names(name: &str) -> Vec<String> {
    let parts: Vec<&str> = name.split(DECK_SEPARATOR).collect();
    (1..parts.len())
        .map(|n| parts[..n].join(DECK_SEPARATOR))
        .collect()
}

/// Case-insensitive key used for name comparisons.
pub fn name_key(name: &str) -> String {
    name.to_lowercase()
}

impl RecordStore {
    /// All decks keyed by id.
    pub fn decks(&self) -> StoreResult<BTreeMap<i64, Deck>> {
        let json: String = self.scalar("SELECT decks FROM col", [])?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Looks up a deck.
    pub fn deck(&self, id: i64) -> StoreResult<Option<Deck>> {
        Ok(self.decks()?.remove(&id))
    }

    /// Looks up a deck by (case-insensitive) name.
    pub fn deck_by_name(&self, name: &str) -> StoreResult<Option<Deck>> {
        let key = name_key(name);
        Ok(self
            .decks()?
            .into_values()
            .find(|d| name_key(&d.name) == key))
    }

    /// Inserts or replaces a deck as given.
    pub fn put_deck(&self, deck: &Deck) -> StoreResult<()> {
        let mut decks = self.decks()?;
        decks.insert(deck.id, deck.clone());
        self.execute("UPDATE col SET decks = ?1", [serde_json::to_string(&decks)?])?;
        Ok(())
    }

    /// Removes a deck entry. Cards are left untouched.
    ///
    /// The default deck cannot be removed.
    pub fn remove_deck(&self, id: i64) -> StoreResult<bool> {
        if id == DEFAULT_DECK_ID {
            return Err(StoreError::invalid_operation("cannot remove the default deck"));
        }
        let mut decks = self.decks()?;
        let removed = decks.remove(&id).is_some();
        if removed {
            self.execute("UPDATE col SET decks = ?1", [serde_json::to_string(&decks)?])?;
        }
        Ok(removed)
    }

    /// All deck configurations keyed by id.
    pub fn deck_confs(&self) -> StoreResult<BTreeMap<i64, DeckConf>> {
        let json: String = self.scalar("SELECT dconf FROM col", [])?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Looks up a deck configuration.
    pub fn deck_conf(&self, id: i64) -> StoreResult<Option<DeckConf>> {
        Ok(self.deck_confs()?.remove(&id))
    }

    /// Inserts or replaces a deck configuration as given.
    pub fn put_deck_conf(&self, conf: &DeckConf) -> StoreResult<()> {
        let mut confs = self.deck_confs()?;
        confs.insert(conf.id, conf.clone());
        self.execute("UPDATE col SET dconf = ?1", [serde_json::to_string(&confs)?])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_of_nested_name() {
        assert_eq!(parent_names("a::b::c"), vec!["a", "a::b"]);
        assert!(parent_names("top").is_empty());
    }

    #[test]
    fn deck_lookup_is_case_insensitive() {
        let store = RecordStore::open_in_memory().unwrap();
        store.put_deck(&Deck::new(10, "Japanese::Verbs")).unwrap();

        let found = store.deck_by_name("japanese::verbs").unwrap().unwrap();
        assert_eq!(found.id, 10);
        assert_eq!(store.deck_by_name("default").unwrap().unwrap().id, DEFAULT_DECK_ID);
    }

    #[test]
    fn default_deck_is_protected() {
        let store = RecordStore::open_in_memory().unwrap();
        assert!(store.remove_deck(DEFAULT_DECK_ID).is_err());
        store.put_deck(&Deck::new(2, "Other")).unwrap();
        assert!(store.remove_deck(2).unwrap());
        assert!(!store.remove_deck(2).unwrap());
    }

    #[test]
    fn conf_round_trip() {
        let store = RecordStore::open_in_memory().unwrap();
        let mut conf = DeckConf::new(7, "Fast");
        conf.new_order = NewCardOrder::Random;
        store.put_deck_conf(&conf).unwrap();
        assert_eq!(store.deck_conf(7).unwrap(), Some(conf));
        assert_eq!(store.deck_confs().unwrap().len(), 2);
    }
}
