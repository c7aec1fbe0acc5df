//! # decksync store
//!
//! The transactional collection store used by the sync engine and the
//! importer.
//!
//! A collection is one SQLite file holding notes, cards, the review log,
//! deletion records, and a single `col` row with collection metadata and
//! the small objects (models, decks, deck configurations, tags).
//!
//! ## Key Invariants
//!
//! - Every mutation group runs inside a named savepoint
//! - Every card's note exists; a note without cards is removed
//! - At most one grave per `(oid, kind)`
//! - A file-backed collection is opened by one process at a time

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod card;
mod check;
pub mod clock;
mod deck;
mod error;
mod grave;
mod lock;
mod meta;
mod model;
mod note;
mod record;
mod schema;
mod store;
mod tags;
pub mod time;

pub use card::{card_type, queue, Card, RevlogEntry};
pub use check::SanityDigest;
pub use clock::{Role, UsnWindow, VersionClock, PENDING_USN};
pub use deck::{
    name_key, parent_names, Deck, DeckConf, NewCardOrder, DECK_SEPARATOR, DEFAULT_CONF_ID,
    DEFAULT_DECK_ID, DEFAULT_DECK_NAME,
};
pub use error::{StoreError, StoreResult};
pub use grave::{Grave, GraveKind};
pub use lock::CollectionLock;
pub use meta::CollectionMeta;
pub use model::{FieldDef, Model, TemplateDef};
pub use note::{field_checksum, Note, FIELD_SEPARATOR};
pub use record::{Record, WriteMode};
pub use schema::SCHEMA_VERSION;
pub use store::RecordStore;
pub use tags::{join_tags, split_tags};
