//! # decksync testkit
//!
//! Test utilities for decksync.
//!
//! This crate provides:
//! - Collection fixtures (in memory or in a temporary directory)
//! - Twin collections sharing one schema, ready for incremental sync
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use decksync_testkit::prelude::*;
//!
//! let (client, server) = twin_collections();
//! add_note(&client, 10, "abc", &["front", "back"]);
//! touch(&client);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
