//! # decksync engine
//!
//! Incremental two-way sync of a flashcard collection, with a whole-file
//! fallback and a separate media sync.
//!
//! This crate provides:
//! - The client session state machine ([`SyncSession`])
//! - Role-parameterized merge primitives ([`Syncer`])
//! - The in-process server role ([`LocalPeer`])
//! - HTTP transport abstraction with a loopback client for tests
//! - Whole-collection download and upload ([`full`])
//! - Media sync over a local manifest ([`media`])
//!
//! ## Protocol
//!
//! 1. Compare metadata; stop early on no changes, schema divergence,
//!    refusal or clock skew
//! 2. Exchange deletions
//! 3. Exchange models, decks, deck configurations and tags
//! 4. Stream review log, cards and notes in pages, peer first
//! 5. Compare structural digests
//! 6. Commit on both sides with a shared timestamp
//!
//! ## Key Invariants
//!
//! - Steps 2 to 6 are atomic on both sides
//! - Newer modification time wins; ties keep the local row
//! - A deleted object is never resurrected by a later chunk
//! - After a successful session both sides hold `max_usn + 1`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod full;
mod http;
pub mod media;
mod outcome;
mod peer;
mod session;
mod syncer;
mod transport;

pub use config::{
    MediaSyncConfig, RetryConfig, SyncConfig, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CLOCK_SKEW,
};
pub use error::{describe_status, SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, HttpTransport, LoopbackClient, LoopbackServer};
pub use media::{LocalMediaPeer, MediaManifest, MediaSyncOutcome, MediaSyncSession, MediaTransport};
pub use outcome::SyncOutcome;
pub use peer::LocalPeer;
pub use session::{SyncSession, SyncState, SyncStats};
pub use syncer::{ChunkStats, Syncer, GRAVE_ORDER};
pub use transport::{MockTransport, SyncTransport};
