//! Model (note type) reconciliation.

use crate::error::{MergeError, MergeResult};
use decksync_store::time::now_secs;
use decksync_store::{Model, RecordStore, DEFAULT_DECK_ID};
use std::collections::BTreeMap;
use tracing::debug;

/// Maps source model ids onto destination model ids.
///
/// A source model keeps its id unless the destination already holds a
/// model with a different schema there; in that case ids above it are
/// probed until a free slot or a schema-equal model is found.
#[derive(Debug)]
pub struct ModelMap {
    source: BTreeMap<i64, Model>,
    mapped: BTreeMap<i64, i64>,
    usn: i32,
    max_probes: u32,
}

impl ModelMap {
    /// Creates a map over the models of `source`. New or updated models are
    /// written with `usn`.
    pub fn new(source: &RecordStore, usn: i32, max_probes: u32) -> MergeResult<Self> {
        Ok(Self {
            source: source.models()?,
            mapped: BTreeMap::new(),
            usn,
            max_probes,
        })
    }

    /// Destination id for source model `src_mid`, copying the model on
    /// first use.
    pub fn resolve(&mut self, dst: &RecordStore, src_mid: i64) -> MergeResult<i64> {
        if let Some(&mid) = self.mapped.get(&src_mid) {
            return Ok(mid);
        }
        let model = self
            .source
            .get(&src_mid)
            .ok_or(MergeError::MissingModel(src_mid))?;
        let hash = model.schema_hash();

        let mut mid = src_mid;
        for _ in 0..self.max_probes {
            match dst.model(mid)? {
                None => {
                    let mut copy = model.clone();
                    copy.id = mid;
                    copy.mtime = now_secs();
                    copy.usn = self.usn;
                    if dst.deck(copy.did)?.is_none() {
                        copy.did = DEFAULT_DECK_ID;
                    }
                    dst.put_model(&copy)?;
                    debug!(src_mid, mid, name = %copy.name, "added model");
                    self.mapped.insert(src_mid, mid);
                    return Ok(mid);
                }
                Some(mut existing) if existing.schema_hash() == hash => {
                    if model.mtime > existing.mtime && model.css != existing.css {
                        existing.css = model.css.clone();
                        existing.mtime = now_secs();
                        existing.usn = self.usn;
                        dst.put_model(&existing)?;
                        debug!(mid, "updated model styling");
                    }
                    self.mapped.insert(src_mid, mid);
                    return Ok(mid);
                }
                Some(_) => mid += 1,
            }
        }
        Err(MergeError::IdSpaceExhausted {
            kind: "model",
            start: src_mid,
            probes: self.max_probes,
        })
    }

    /// The mappings resolved so far.
    pub fn mapped(&self) -> &BTreeMap<i64, i64> {
        &self.mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: i64, fields: &[&str]) -> Model {
        Model::new(id, "Vocab", fields, &[("Card 1", "{{Word}}", "{{Meaning}}")])
    }

    fn stores() -> (RecordStore, RecordStore) {
        (
            RecordStore::open_in_memory().unwrap(),
            RecordStore::open_in_memory().unwrap(),
        )
    }

    #[test]
    fn absent_model_is_copied() {
        let (src, dst) = stores();
        src.put_model(&model(5, &["Word", "Meaning"])).unwrap();

        let mut map = ModelMap::new(&src, -1, 10).unwrap();
        assert_eq!(map.resolve(&dst, 5).unwrap(), 5);
        let copied = dst.require_model(5).unwrap();
        assert_eq!(copied.usn, -1);
        assert!(copied.mtime > 0);
    }

    #[test]
    fn equal_schema_is_reused() {
        let (src, dst) = stores();
        let mut incoming = model(5, &["Word", "Meaning"]);
        incoming.css = ".card { color: red }".into();
        incoming.mtime = 200;
        src.put_model(&incoming).unwrap();
        let mut existing = model(5, &["Word", "Meaning"]);
        existing.mtime = 100;
        dst.put_model(&existing).unwrap();

        let mut map = ModelMap::new(&src, -1, 10).unwrap();
        assert_eq!(map.resolve(&dst, 5).unwrap(), 5);
        assert_eq!(dst.models().unwrap().len(), 1);
        assert_eq!(dst.require_model(5).unwrap().css, ".card { color: red }");
    }

    #[test]
    fn different_schema_probes_upward() {
        let (src, dst) = stores();
        src.put_model(&model(5, &["Word", "Meaning", "Example"])).unwrap();
        dst.put_model(&model(5, &["Word", "Meaning"])).unwrap();
        dst.put_model(&model(6, &["Other"])).unwrap();

        let mut map = ModelMap::new(&src, -1, 10).unwrap();
        assert_eq!(map.resolve(&dst, 5).unwrap(), 7);
        assert_eq!(map.resolve(&dst, 5).unwrap(), 7);
        assert_eq!(dst.require_model(7).unwrap().flds.len(), 3);
        assert_eq!(dst.require_model(5).unwrap().flds.len(), 2);
        assert_eq!(map.mapped().get(&5), Some(&7));
    }

    #[test]
    fn probing_is_bounded() {
        let (src, dst) = stores();
        src.put_model(&model(5, &["A"])).unwrap();
        dst.put_model(&model(5, &["B"])).unwrap();
        dst.put_model(&model(6, &["C"])).unwrap();

        let mut map = ModelMap::new(&src, -1, 2).unwrap();
        assert!(matches!(
            map.resolve(&dst, 5),
            Err(MergeError::IdSpaceExhausted { kind: "model", .. })
        ));
    }

    #[test]
    fn unknown_source_model() {
        let (src, dst) = stores();
        let mut map = ModelMap::new(&src, -1, 2).unwrap();
        assert!(matches!(map.resolve(&dst, 9), Err(MergeError::MissingModel(9))));
    }
}
