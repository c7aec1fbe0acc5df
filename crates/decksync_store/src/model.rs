//! Note types ("models").

use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A field definition of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Position in the note's field list.
    pub ord: u32,
}

/// A card template of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDef {
    /// Template name.
    pub name: String,
    /// Ordinal; cards generated from this template carry it as `ord`.
    pub ord: u32,
    /// Question format.
    pub qfmt: String,
    /// Answer format.
    pub afmt: String,
}

/// A note type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Modification time (seconds).
    #[serde(rename = "mod")]
    pub mtime: i64,
    /// Update sequence number.
    pub usn: i32,
    /// 0 = standard, 1 = cloze.
    #[serde(rename = "type", default)]
    pub kind: i32,
    /// Index of the sort field.
    #[serde(default)]
    pub sortf: u32,
    /// Default deck for new notes of this type.
    #[serde(default)]
    pub did: i64,
    /// Fields, in order.
    pub flds: Vec<FieldDef>,
    /// Templates, in order.
    pub tmpls: Vec<TemplateDef>,
    /// Shared styling.
    #[serde(default)]
    pub css: String,
}

impl Model {
    /// Creates a standard model with the given fields and templates.
    ///
    /// `templates` are `(name, qfmt, afmt)` triples.
    pub fn new(id: i64, name: impl Into<String>, fields: &[&str], templates: &[(&str, &str, &str)]) -> Self {
        Self {
            id,
            name: name.into(),
            mtime: 0,
            usn: 0,
            kind: 0,
            sortf: 0,
            did: crate::deck::DEFAULT_DECK_ID,
            flds: fields
                .iter()
                .enumerate()
                .map(|(ord, name)| FieldDef {
                    name: (*name).to_string(),
                    ord: ord as u32,
                })
                .collect(),
            tmpls: templates
                .iter()
                .enumerate()
                .map(|(ord, (name, qfmt, afmt))| TemplateDef {
                    name: (*name).to_string(),
                    ord: ord as u32,
                    qfmt: (*qfmt).to_string(),
                    afmt: (*afmt).to_string(),
                })
                .collect(),
            css: String::new(),
        }
    }

    /// Field names, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.flds.iter().map(|f| f.name.as_str()).collect()
    }

    /// Digest over the field-name list and the template list.
    ///
    /// Two models are schema-equivalent iff their hashes are equal. Ids,
    /// names, styling and timestamps do not contribute.
    pub fn schema_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for field in &self.flds {
            hasher.update(field.name.as_bytes());
            hasher.update([0x1fu8]);
        }
        hasher.update([0x1eu8]);
        for tmpl in &self.tmpls {
            for part in [&tmpl.name, &tmpl.qfmt, &tmpl.afmt] {
                hasher.update(part.as_bytes());
                hasher.update([0x1fu8]);
            }
            hasher.update([0x1eu8]);
        }
        hex(&hasher.finalize())
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl RecordStore {
    /// All models keyed by id.
    pub fn models(&self) -> StoreResult<BTreeMap<i64, Model>> {
        let json: String = self.scalar("SELECT models FROM col", [])?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Looks up a model.
    pub fn model(&self, id: i64) -> StoreResult<Option<Model>> {
        Ok(self.models()?.remove(&id))
    }

    /// Looks up a model, failing if it does not exist.
    pub fn require_model(&self, id: i64) -> StoreResult<Model> {
        self.model(id)?.ok_or(StoreError::not_found("model", id))
    }

    /// Inserts or replaces a model as given (mtime and usn untouched).
    pub fn put_model(&self, model: &Model) -> StoreResult<()> {
        let mut models = self.models()?;
        models.insert(model.id, model.clone());
        self.write_models(&models)
    }

    /// Removes a model. Notes of that type are not touched.
    pub fn remove_model(&self, id: i64) -> StoreResult<()> {
        let mut models = self.models()?;
        if models.remove(&id).is_some() {
            self.write_models(&models)?;
        }
        Ok(())
    }

    fn write_models(&self, models: &BTreeMap<i64, Model>) -> StoreResult<()> {
        self.execute("UPDATE col SET models = ?1", [serde_json::to_string(models)?])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(id: i64) -> Model {
        Model::new(id, "Basic", &["Front", "Back"], &[("Card 1", "{{Front}}", "{{Back}}")])
    }

    #[test]
    fn schema_hash_ignores_identity_and_styling() {
        let a = basic(1);
        let mut b = basic(2);
        b.name = "Basic (copy)".into();
        b.css = ".card { color: red }".into();
        b.mtime = 99;
        assert_eq!(a.schema_hash(), b.schema_hash());
    }

    #[test]
    fn schema_hash_sees_fields_and_templates() {
        let a = basic(1);
        let fewer = Model::new(1, "Basic", &["Front"], &[("Card 1", "{{Front}}", "{{Back}}")]);
        assert_ne!(a.schema_hash(), fewer.schema_hash());

        let mut changed = basic(1);
        changed.tmpls[0].afmt = "{{FrontSide}}<hr>{{Back}}".into();
        assert_ne!(a.schema_hash(), changed.schema_hash());

        let split = Model::new(1, "Basic", &["Fr", "ontBack"], &[("Card 1", "{{Front}}", "{{Back}}")]);
        assert_ne!(a.schema_hash(), split.schema_hash());
    }

    #[test]
    fn put_and_load_models() {
        let store = RecordStore::open_in_memory().unwrap();
        store.put_model(&basic(5)).unwrap();
        store.put_model(&basic(6)).unwrap();

        let models = store.models().unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(store.require_model(5).unwrap().field_names(), vec!["Front", "Back"]);

        store.remove_model(6).unwrap();
        assert!(store.model(6).unwrap().is_none());
        assert!(matches!(store.require_model(6), Err(StoreError::NotFound { .. })));
    }
}
