//! # decksync import
//!
//! Merges one collection into another, and reads and writes packages.
//!
//! This crate provides:
//! - `MergeEngine`: reconciles models, decks, notes and cards of a source
//!   collection into a destination collection inside one savepoint
//! - `PackageImporter` / `PackageExporter`: packages with media
//! - `ImportCallbacks`: the caller's say on deck collisions, note updates
//!   and progress
//!
//! ## Key Invariants
//!
//! - A merge applies completely or not at all
//! - The source collection is never written
//! - Notes are matched by guid; a guid whose note type changed is never
//!   merged into the existing note
//! - Every imported card belongs to an imported or existing destination note
//! - Media files are written only after the merge committed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod callbacks;
mod cards;
mod decks;
mod engine;
mod error;
mod ids;
mod models;
mod notes;
mod options;
mod package;
mod scheduler;

pub use callbacks::{DeckConflict, DefaultCallbacks, ImportCallbacks, ImportProgress, NoteDecision};
pub use cards::{rebase_card, CardMerger};
pub use decks::{DeckMap, DeckPlan, IMPORTED_SUFFIX};
pub use engine::{ImportSummary, MergeEngine};
pub use error::{ImportOutcome, MergeError, MergeResult};
pub use ids::{increment_guid, probe_id, BASE91_DIGITS};
pub use models::ModelMap;
pub use notes::{ExistingNote, NoteAction, NoteMerger};
pub use options::{ImportOptions, UpdatePolicy, DEFAULT_ID_PROBE_STEP, DEFAULT_MAX_ID_PROBES};
pub use package::{
    media_refs, rewrite_media_refs, Archive, DirectoryArchive, ExportSummary, PackageExporter,
    PackageImport, PackageImporter, PackageManifest, COLLECTION_ENTRY, MEDIA_ENTRY,
    MEDIA_LOCATIONS_ENTRY,
};
pub use scheduler::{BasicScheduler, Scheduler};
