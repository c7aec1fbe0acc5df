//! The collection merge.

use crate::callbacks::{ImportCallbacks, ImportProgress};
use crate::cards::CardMerger;
use crate::decks::{DeckMap, DeckPlan};
use crate::error::MergeResult;
use crate::models::ModelMap;
use crate::notes::{NoteAction, NoteMerger};
use crate::options::ImportOptions;
use crate::scheduler::{BasicScheduler, Scheduler};
use decksync_store::{card_type, Card, Note, RecordStore, VersionClock};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Savepoint wrapping a whole merge.
const SAVEPOINT: &str = "import";

/// Notes or cards between two progress reports.
const PROGRESS_EVERY: usize = 100;

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Notes added.
    pub added: usize,
    /// Existing notes replaced by newer incoming ones.
    pub updated: usize,
    /// Incoming notes already present and not updated.
    pub duplicates: usize,
    /// Guids of incoming notes skipped because their type changed.
    pub ignored: Vec<String>,
    /// Cards added.
    pub cards_added: usize,
    /// Review log rows added.
    pub revlog_added: usize,
    /// Destination ids of added and updated notes.
    pub imported_note_ids: Vec<i64>,
    /// Source deck id to destination deck id.
    pub deck_ids: BTreeMap<i64, i64>,
    /// Source model id to destination model id.
    pub model_ids: BTreeMap<i64, i64>,
    /// Decks renamed to avoid a collision, as `(original, new)`.
    pub renamed_decks: Vec<(String, String)>,
    /// The update answer the caller asked to remember, if any.
    pub remembered_update_decision: Option<bool>,
}

impl ImportSummary {
    /// True if the merge changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.cards_added == 0
    }
}

/// Merges a source collection into a destination collection.
///
/// The whole merge runs in one destination savepoint: it either applies
/// completely or leaves the destination as it was. The source is only read.
///
/// # Example
///
/// ```
/// use decksync_import::{DefaultCallbacks, MergeEngine};
/// use decksync_store::RecordStore;
///
/// let src = RecordStore::open_in_memory().unwrap();
/// let dst = RecordStore::open_in_memory().unwrap();
/// let summary = MergeEngine::new(&src, &dst).run(&mut DefaultCallbacks).unwrap();
/// assert!(summary.is_empty());
/// ```
pub struct MergeEngine<'a> {
    src: &'a RecordStore,
    dst: &'a RecordStore,
    options: ImportOptions,
    scheduler: Box<dyn Scheduler + 'a>,
    media_renames: BTreeMap<String, String>,
}

impl<'a> MergeEngine<'a> {
    /// Creates an engine with default options and the [`BasicScheduler`].
    pub fn new(src: &'a RecordStore, dst: &'a RecordStore) -> Self {
        Self {
            src,
            dst,
            options: ImportOptions::default(),
            scheduler: Box::new(BasicScheduler::new()),
            media_renames: BTreeMap::new(),
        }
    }

    /// Sets the options.
    pub fn with_options(mut self, options: ImportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the scheduler.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'a) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Media file renames to apply to imported note fields.
    pub fn with_media_renames(mut self, renames: BTreeMap<String, String>) -> Self {
        self.media_renames = renames;
        self
    }

    /// Runs the merge.
    ///
    /// Any error, including one returned by a callback, rolls the
    /// destination back before it is returned.
    pub fn run(&self, callbacks: &mut dyn ImportCallbacks) -> MergeResult<ImportSummary> {
        let result = self
            .dst
            .transaction(SAVEPOINT, |dst| self.merge(dst, callbacks));
        if let Err(err) = self.dst.maintain(false) {
            warn!(error = %err, "post-import maintenance failed");
        }
        if let Ok(summary) = &result {
            info!(
                added = summary.added,
                updated = summary.updated,
                duplicates = summary.duplicates,
                ignored = summary.ignored.len(),
                cards = summary.cards_added,
                "import finished"
            );
        }
        result
    }

    fn merge(&self, dst: &RecordStore, callbacks: &mut dyn ImportCallbacks) -> MergeResult<ImportSummary> {
        let src = self.src;
        let options = &self.options;
        let usn = VersionClock::new(options.role, dst.usn()?).stamp();
        let mut summary = ImportSummary::default();

        callbacks.on_progress(ImportProgress::Decks)?;
        let plan = DeckPlan::build(src, dst, options.deck_prefix.as_deref(), callbacks)?;
        summary.renamed_decks = plan.renamed().to_vec();
        let mut decks = DeckMap::new(src, plan, usn, options.max_id_probes)?;
        let mut models = ModelMap::new(src, usn, options.max_id_probes)?;
        let mut notes = NoteMerger::new(dst, options, &self.media_renames, usn)?;

        let source_notes: Vec<Note> = src.select("1", [])?;
        let mut source_guids: HashMap<i64, String> = HashMap::with_capacity(source_notes.len());
        let total = source_notes.len();
        for (done, note) in source_notes.into_iter().enumerate() {
            let mid = models.resolve(dst, note.mid)?;
            match notes.merge(dst, &note, mid, callbacks)? {
                NoteAction::Added(id) => {
                    summary.added += 1;
                    summary.imported_note_ids.push(id);
                }
                NoteAction::Updated(id) => {
                    summary.updated += 1;
                    summary.imported_note_ids.push(id);
                }
                NoteAction::Duplicate(_) => summary.duplicates += 1,
                NoteAction::Ignored => summary.ignored.push(note.guid.clone()),
            }
            source_guids.insert(note.id, note.guid);
            report(callbacks, done + 1, total, |done, total| ImportProgress::Notes { done, total })?;
        }

        let ahead_by = self.scheduler.today(src)? - self.scheduler.today(dst)?;
        let mut cards = CardMerger::new(dst, options, ahead_by, usn)?;
        let source_cards: Vec<Card> = src.select("1", [])?;
        let total = source_cards.len();
        for (done, card) in source_cards.iter().enumerate() {
            report(callbacks, done, total, |done, total| ImportProgress::Cards { done, total })?;
            let Some(guid) = source_guids.get(&card.nid) else {
                continue;
            };
            if notes.is_ignored(guid) {
                continue;
            }
            let Some((guid, nid)) = notes.target(guid) else {
                continue;
            };
            cards.merge(src, dst, card, guid, nid, &mut decks)?;
        }
        if total > 0 {
            callbacks.on_progress(ImportProgress::Cards { done: total, total })?;
        }

        callbacks.on_progress(ImportProgress::Finishing)?;
        let next_pos: Option<i64> = dst.scalar(
            "SELECT max(due) + 1 FROM cards WHERE type = ?1",
            [card_type::NEW],
        )?;
        if let Some(next_pos) = next_pos {
            dst.set_conf_i64("nextPos", next_pos)?;
        }
        for &did in &cards.decks_with_new_cards {
            self.scheduler.maybe_randomize_deck(dst, did, usn)?;
        }

        summary.cards_added = cards.added;
        summary.revlog_added = cards.revlog_added;
        summary.deck_ids = decks.mapped().clone();
        summary.model_ids = models.mapped().clone();
        summary.remembered_update_decision = notes
            .decision()
            .filter(|d| d.do_not_ask_again)
            .map(|d| d.allow);
        if !summary.is_empty() {
            dst.set_modified()?;
        }
        Ok(summary)
    }
}

fn report<F>(callbacks: &mut dyn ImportCallbacks, done: usize, total: usize, stage: F) -> MergeResult<()>
where
    F: Fn(usize, usize) -> ImportProgress,
{
    if done % PROGRESS_EVERY == 0 || done == total {
        callbacks.on_progress(stage(done, total))?;
    }
    Ok(())
}
