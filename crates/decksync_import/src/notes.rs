//! Note identity reconciliation by guid.

use crate::callbacks::{ImportCallbacks, NoteDecision};
use crate::error::{MergeError, MergeResult};
use crate::ids::{increment_guid, probe_id};
use crate::options::{ImportOptions, UpdatePolicy};
use crate::package::rewrite_media_refs;
use decksync_store::{split_tags, Note, RecordStore, WriteMode};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace};

/// A destination note, as seen by the guid map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingNote {
    /// Note id.
    pub id: i64,
    /// Modification time (seconds).
    pub mtime: i64,
    /// Model id.
    pub mid: i64,
}

/// What happened to one source note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteAction {
    /// Added under this destination id.
    Added(i64),
    /// Replaced the destination note with this id.
    Updated(i64),
    /// Same guid and schema, left alone.
    Duplicate(i64),
    /// Same guid with a different schema, skipped.
    Ignored,
}

enum Identity {
    New(String),
    Same(String, ExistingNote),
    Ignored,
}

/// Merges source notes into the destination one at a time.
pub struct NoteMerger<'a> {
    options: &'a ImportOptions,
    media_renames: &'a BTreeMap<String, String>,
    usn: i32,
    guids: HashMap<String, ExistingNote>,
    changed_guids: HashMap<String, String>,
    ignored: HashSet<String>,
    decision: Option<NoteDecision>,
}

impl<'a> NoteMerger<'a> {
    /// Loads the guid map of `dst`. Written notes get `usn`.
    pub fn new(
        dst: &RecordStore,
        options: &'a ImportOptions,
        media_renames: &'a BTreeMap<String, String>,
        usn: i32,
    ) -> MergeResult<Self> {
        let rows = dst.query("SELECT guid, id, mod, mid FROM notes", [], |r| {
            Ok((
                r.get::<_, String>(0)?,
                ExistingNote {
                    id: r.get(1)?,
                    mtime: r.get(2)?,
                    mid: r.get(3)?,
                },
            ))
        })?;
        Ok(Self {
            options,
            media_renames,
            usn,
            guids: rows.into_iter().collect(),
            changed_guids: HashMap::new(),
            ignored: HashSet::new(),
            decision: None,
        })
    }

    /// Merges `note`, whose model has already been resolved to `dst_mid`.
    pub fn merge(
        &mut self,
        dst: &RecordStore,
        note: &Note,
        dst_mid: i64,
        callbacks: &mut dyn ImportCallbacks,
    ) -> MergeResult<NoteAction> {
        match self.identify(note, dst_mid)? {
            Identity::New(guid) => {
                let id = probe_id(
                    "note",
                    note.id,
                    self.options.id_probe_step,
                    self.options.max_id_probes,
                    |id| Ok(dst.exists::<Note>(id)?),
                )?;
                let written = self.write(dst, note, id, guid.clone(), dst_mid)?;
                self.guids.insert(
                    guid,
                    ExistingNote {
                        id,
                        mtime: written.mtime,
                        mid: dst_mid,
                    },
                );
                trace!(src = note.id, id, "added note");
                Ok(NoteAction::Added(id))
            }
            Identity::Same(guid, existing) => {
                if existing.mtime >= note.mtime || !self.updates_allowed(callbacks)? {
                    return Ok(NoteAction::Duplicate(existing.id));
                }
                let written = self.write(dst, note, existing.id, guid.clone(), dst_mid)?;
                self.guids.insert(
                    guid,
                    ExistingNote {
                        mtime: written.mtime,
                        ..existing
                    },
                );
                trace!(src = note.id, id = existing.id, "updated note");
                Ok(NoteAction::Updated(existing.id))
            }
            Identity::Ignored => {
                self.ignored.insert(note.guid.clone());
                debug!(guid = %note.guid, "note type changed, skipping note");
                Ok(NoteAction::Ignored)
            }
        }
    }

    /// Destination guid and id for the source note with `guid`, if the
    /// note was added, updated or found as a duplicate.
    pub fn target(&self, guid: &str) -> Option<(&str, i64)> {
        let guid = self
            .changed_guids
            .get(guid)
            .map(String::as_str)
            .unwrap_or(guid);
        self.guids.get_key_value(guid).map(|(g, n)| (g.as_str(), n.id))
    }

    /// Whether the source note with `guid` was skipped for a schema change.
    pub fn is_ignored(&self, guid: &str) -> bool {
        self.ignored.contains(guid)
    }

    /// The cached update decision, if the caller was asked.
    pub fn decision(&self) -> Option<NoteDecision> {
        self.decision
    }

    fn identify(&mut self, note: &Note, dst_mid: i64) -> MergeResult<Identity> {
        match self.guids.get(&note.guid) {
            None => return Ok(Identity::New(note.guid.clone())),
            Some(&existing) if existing.mid == dst_mid => {
                return Ok(Identity::Same(note.guid.clone(), existing))
            }
            Some(_) if !self.options.dupe_on_schema_change => return Ok(Identity::Ignored),
            Some(_) => {}
        }

        let mut guid = note.guid.clone();
        for _ in 0..self.options.max_id_probes {
            guid = increment_guid(&guid);
            let identity = match self.guids.get(&guid) {
                None => Identity::New(guid.clone()),
                Some(&existing) if existing.mid == dst_mid => Identity::Same(guid.clone(), existing),
                Some(_) => continue,
            };
            debug!(from = %note.guid, to = %guid, "note type changed, guid perturbed");
            self.changed_guids.insert(note.guid.clone(), guid);
            return Ok(identity);
        }
        Err(MergeError::IdSpaceExhausted {
            kind: "guid",
            start: note.id,
            probes: self.options.max_id_probes,
        })
    }

    fn updates_allowed(&mut self, callbacks: &mut dyn ImportCallbacks) -> MergeResult<bool> {
        match self.options.update_policy {
            UpdatePolicy::Always => Ok(true),
            UpdatePolicy::Never => Ok(false),
            UpdatePolicy::Ask => {
                if let Some(decision) = self.decision {
                    return Ok(decision.allow);
                }
                let decision = callbacks.on_duplicate_note()?;
                debug!(allow = decision.allow, "update decision");
                self.decision = Some(decision);
                Ok(decision.allow)
            }
        }
    }

    fn write(&self, dst: &RecordStore, note: &Note, id: i64, guid: String, mid: i64) -> MergeResult<Note> {
        let mut written = note.clone();
        written.id = id;
        written.guid = guid;
        written.mid = mid;
        written.usn = self.usn;
        if !self.media_renames.is_empty() {
            written.flds = rewrite_media_refs(&written.flds, self.media_renames);
        }
        dst.write(&written, WriteMode::Replace)?;
        dst.register_tags(split_tags(&written.tags), self.usn)?;
        Ok(written)
    }
}
