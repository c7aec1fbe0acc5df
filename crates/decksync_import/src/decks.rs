//! Deck name planning and deck reconciliation.
//!
//! Names are decided once, before any note is merged ([`DeckPlan`]);
//! destination decks are then created lazily, parents first, the first time
//! a card needs them ([`DeckMap`]).

use crate::callbacks::{DeckConflict, ImportCallbacks};
use crate::error::MergeResult;
use crate::ids::probe_id;
use decksync_store::time::now_secs;
use decksync_store::{
    name_key, parent_names, Deck, DeckConf, RecordStore, DECK_SEPARATOR, DEFAULT_CONF_ID,
    DEFAULT_DECK_ID,
};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Suffix given to the source's default deck.
pub const IMPORTED_SUFFIX: &str = " (Imported)";

/// Final destination name of every regular source deck.
#[derive(Debug, Clone, Default)]
pub struct DeckPlan {
    names: BTreeMap<i64, String>,
    renamed: Vec<(String, String)>,
}

impl DeckPlan {
    /// Decides the destination name of each regular source deck.
    ///
    /// The prefix, when set, replaces the top-level segment. The source
    /// default deck is always renamed with [`IMPORTED_SUFFIX`] unless a
    /// prefix is set. Any other name already used in `dst` is put to
    /// `callbacks`; renamed decks take the first free ` (N)` and their
    /// descendants follow.
    pub fn build(
        src: &RecordStore,
        dst: &RecordStore,
        prefix: Option<&str>,
        callbacks: &mut dyn ImportCallbacks,
    ) -> MergeResult<Self> {
        let mut decks: Vec<Deck> = src.decks()?.into_values().filter(|d| !d.filtered).collect();
        decks.sort_by(|a, b| a.name.cmp(&b.name));

        let existing: HashSet<String> = dst.decks()?.values().map(|d| name_key(&d.name)).collect();
        let mut taken: HashSet<String> = existing.clone();
        taken.extend(decks.iter().map(|d| name_key(&d.name)));

        let mut plan = Self::default();
        for deck in &decks {
            let name = with_prefix(&deck.name, prefix);

            if let Some(moved) = plan.follow_parent(&name) {
                taken.insert(name_key(&moved));
                plan.names.insert(deck.id, moved);
                continue;
            }

            let planned = if deck.id == DEFAULT_DECK_ID && prefix.is_none() {
                let renamed = first_free(&format!("{name}{IMPORTED_SUFFIX}"), &taken);
                plan.renamed.push((name.clone(), renamed.clone()));
                renamed
            } else if existing.contains(&name_key(&name)) {
                match callbacks.on_duplicate_deck(&name)? {
                    DeckConflict::Merge => name,
                    DeckConflict::Rename => {
                        let renamed = first_free(&name, &taken);
                        plan.renamed.push((name.clone(), renamed.clone()));
                        renamed
                    }
                }
            } else {
                name
            };
            taken.insert(name_key(&planned));
            plan.names.insert(deck.id, planned);
        }

        for (from, to) in &plan.renamed {
            debug!(from = %from, to = %to, "renamed imported deck");
        }
        Ok(plan)
    }

    /// Destination name for source deck `did`.
    pub fn name(&self, did: i64) -> Option<&str> {
        self.names.get(&did).map(String::as_str)
    }

    /// Decks renamed to avoid a collision, as `(original, new)`.
    pub fn renamed(&self) -> &[(String, String)] {
        &self.renamed
    }

    fn follow_parent(&self, name: &str) -> Option<String> {
        self.renamed.iter().rev().find_map(|(from, to)| {
            let rest = name.strip_prefix(from.as_str())?;
            rest.starts_with(DECK_SEPARATOR).then(|| format!("{to}{rest}"))
        })
    }
}

fn with_prefix(name: &str, prefix: Option<&str>) -> String {
    match prefix {
        None => name.to_string(),
        Some(prefix) => match name.split_once(DECK_SEPARATOR) {
            Some((_, rest)) => format!("{prefix}{DECK_SEPARATOR}{rest}"),
            None => prefix.to_string(),
        },
    }
}

fn first_free(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&name_key(base)) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base} ({n})"))
        .find(|candidate| !taken.contains(&name_key(candidate)))
        .unwrap_or_else(|| base.to_string())
}

/// Maps source deck ids onto destination deck ids.
#[derive(Debug)]
pub struct DeckMap {
    plan: DeckPlan,
    source: BTreeMap<i64, Deck>,
    confs: BTreeMap<i64, DeckConf>,
    mapped: BTreeMap<i64, i64>,
    usn: i32,
    max_probes: u32,
}

impl DeckMap {
    /// Creates a map following `plan`. Created decks are written with `usn`.
    pub fn new(src: &RecordStore, plan: DeckPlan, usn: i32, max_probes: u32) -> MergeResult<Self> {
        Ok(Self {
            plan,
            source: src.decks()?,
            confs: src.deck_confs()?,
            mapped: BTreeMap::new(),
            usn,
            max_probes,
        })
    }

    /// Destination id for source deck `src_did`, creating the deck and its
    /// parents on first use. Unknown and filtered decks map to the default
    /// deck.
    pub fn resolve(&mut self, dst: &RecordStore, src_did: i64) -> MergeResult<i64> {
        if let Some(&did) = self.mapped.get(&src_did) {
            return Ok(did);
        }
        let Some(name) = self.plan.name(src_did).map(str::to_string) else {
            return Ok(DEFAULT_DECK_ID);
        };
        for parent in parent_names(&name) {
            let source = self.source_named(&parent);
            self.ensure(dst, &parent, source)?;
        }
        let source = self.source.get(&src_did).cloned();
        let did = self.ensure(dst, &name, source)?;
        self.mapped.insert(src_did, did);
        Ok(did)
    }

    /// Source deck id to destination deck id, for every deck used so far.
    pub fn mapped(&self) -> &BTreeMap<i64, i64> {
        &self.mapped
    }

    /// The name plan.
    pub fn plan(&self) -> &DeckPlan {
        &self.plan
    }

    fn source_named(&self, name: &str) -> Option<Deck> {
        let key = name_key(name);
        self.plan
            .names
            .iter()
            .find(|(_, planned)| name_key(planned) == key)
            .and_then(|(did, _)| self.source.get(did).cloned())
    }

    fn ensure(&self, dst: &RecordStore, name: &str, source: Option<Deck>) -> MergeResult<i64> {
        if let Some(mut existing) = dst.deck_by_name(name)? {
            if let Some(source) = &source {
                if self.adopt(dst, &mut existing, source)? {
                    existing.mtime = now_secs();
                    existing.usn = self.usn;
                    dst.put_deck(&existing)?;
                }
            }
            return Ok(existing.id);
        }

        let decks = dst.decks()?;
        let start = match &source {
            Some(deck) if !decks.contains_key(&deck.id) => deck.id,
            _ => decks.keys().next_back().copied().unwrap_or(DEFAULT_DECK_ID) + 1,
        };
        let id = probe_id("deck", start, 1, self.max_probes, |id| Ok(decks.contains_key(&id)))?;

        let mut deck = Deck::new(id, name);
        if let Some(source) = &source {
            self.adopt(dst, &mut deck, source)?;
        }
        deck.mtime = now_secs();
        deck.usn = self.usn;
        dst.put_deck(&deck)?;
        debug!(id, name, "created deck");
        Ok(id)
    }

    /// Copies description and configuration from a source deck. Returns
    /// true if `deck` changed.
    fn adopt(&self, dst: &RecordStore, deck: &mut Deck, source: &Deck) -> MergeResult<bool> {
        let mut changed = false;
        if deck.desc.is_empty() && !source.desc.is_empty() {
            deck.desc = source.desc.clone();
            changed = true;
        }
        if source.conf != DEFAULT_CONF_ID {
            if let Some(conf) = self.confs.get(&source.conf) {
                let mut conf = conf.clone();
                conf.mtime = now_secs();
                conf.usn = self.usn;
                dst.put_deck_conf(&conf)?;
                if deck.conf != conf.id {
                    deck.conf = conf.id;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::DefaultCallbacks;

    struct Renaming;

    impl ImportCallbacks for Renaming {
        fn on_duplicate_deck(&mut self, _name: &str) -> MergeResult<DeckConflict> {
            Ok(DeckConflict::Rename)
        }
    }

    fn store_with(decks: &[(i64, &str)]) -> RecordStore {
        let store = RecordStore::open_in_memory().unwrap();
        for &(id, name) in decks {
            store.put_deck(&Deck::new(id, name)).unwrap();
        }
        store
    }

    #[test]
    fn prefix_replaces_top_level() {
        assert_eq!(with_prefix("Japanese::Verbs", Some("Shared")), "Shared::Verbs");
        assert_eq!(with_prefix("Japanese", Some("Shared")), "Shared");
        assert_eq!(with_prefix("Japanese", None), "Japanese");
    }

    #[test]
    fn default_deck_is_always_renamed() {
        let src = store_with(&[]);
        let dst = store_with(&[]);
        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        assert_eq!(plan.name(DEFAULT_DECK_ID), Some("Default (Imported)"));

        let dst = store_with(&[(50, "Default (Imported)")]);
        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        assert_eq!(plan.name(DEFAULT_DECK_ID), Some("Default (Imported) (1)"));
    }

    #[test]
    fn collisions_follow_the_callback() {
        let src = store_with(&[(10, "Verbs"), (11, "Verbs::Irregular"), (12, "Nouns")]);
        let dst = store_with(&[(20, "verbs"), (21, "Verbs (1)")]);

        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        assert_eq!(plan.name(10), Some("Verbs"));

        let plan = DeckPlan::build(&src, &dst, None, &mut Renaming).unwrap();
        assert_eq!(plan.name(10), Some("Verbs (2)"));
        assert_eq!(plan.name(11), Some("Verbs (2)::Irregular"));
        assert_eq!(plan.name(12), Some("Nouns"));
        assert!(plan
            .renamed()
            .contains(&("Verbs".to_string(), "Verbs (2)".to_string())));
    }

    #[test]
    fn parents_are_created_first() {
        let src = store_with(&[(10, "Japanese"), (11, "Japanese::Verbs")]);
        let mut japanese = src.deck(10).unwrap().unwrap();
        japanese.desc = "from source".into();
        src.put_deck(&japanese).unwrap();
        let dst = store_with(&[]);

        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        let mut map = DeckMap::new(&src, plan, -1, 100).unwrap();
        let verbs = map.resolve(&dst, 11).unwrap();

        let parent = dst.deck_by_name("Japanese").unwrap().unwrap();
        assert_eq!(parent.desc, "from source");
        assert_eq!(dst.deck(verbs).unwrap().unwrap().name, "Japanese::Verbs");
        assert_eq!(map.mapped().get(&11), Some(&verbs));
        assert_eq!(map.resolve(&dst, 11).unwrap(), verbs);
    }

    #[test]
    fn conf_adopted_unless_placeholder() {
        let src = store_with(&[(10, "Fast"), (11, "Plain")]);
        let mut conf = DeckConf::new(7, "Fast settings");
        conf.new_per_day = 50;
        src.put_deck_conf(&conf).unwrap();
        let mut fast = src.deck(10).unwrap().unwrap();
        fast.conf = 7;
        src.put_deck(&fast).unwrap();
        let dst = store_with(&[]);

        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        let mut map = DeckMap::new(&src, plan, -1, 100).unwrap();
        let fast = map.resolve(&dst, 10).unwrap();
        let plain = map.resolve(&dst, 11).unwrap();

        assert_eq!(dst.deck(fast).unwrap().unwrap().conf, 7);
        assert_eq!(dst.deck_conf(7).unwrap().unwrap().new_per_day, 50);
        assert_eq!(dst.deck(plain).unwrap().unwrap().conf, DEFAULT_CONF_ID);
    }

    #[test]
    fn colliding_id_gets_a_new_one() {
        let src = store_with(&[(10, "Imported")]);
        let dst = store_with(&[(10, "Local")]);
        let plan = DeckPlan::build(&src, &dst, None, &mut DefaultCallbacks).unwrap();
        let mut map = DeckMap::new(&src, plan, -1, 100).unwrap();

        assert_eq!(map.resolve(&dst, 10).unwrap(), 11);
        assert_eq!(dst.deck(10).unwrap().unwrap().name, "Local");
        assert_eq!(map.resolve(&dst, 999).unwrap(), DEFAULT_DECK_ID);
    }
}
