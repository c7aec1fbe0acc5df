//! # decksync server
//!
//! Reference sync server for decksync collections.
//!
//! This crate provides:
//! - Request routing for every sync and media endpoint
//! - Host-key authentication (HMAC-SHA256 signed keys)
//! - Session exclusivity: one incremental session per collection
//! - Status mapping understood by the client transport
//!
//! # Architecture
//!
//! The server plays the server role of the same engine the clients use
//! (no separate database layer). It keeps:
//! - The served collection, behind [`decksync_engine::LocalPeer`]
//! - The served media, behind [`decksync_engine::LocalMediaPeer`]
//! - The session key of the client holding the open session
//!
//! # Authentication
//!
//! ```rust,ignore
//! use decksync_server::{ServerConfig, SyncServer};
//!
//! let config = ServerConfig::default()
//!     .with_auth(b"my-secure-secret-32-bytes-long!".to_vec())
//!     .with_account("alice", "correct horse");
//! let server = SyncServer::new(config, store);
//! // clients call `hostKey` once and present the key on every request
//! ```
//!
//! ## Key Invariants
//!
//! - A second client starting a session while one is open gets HTTP 409
//! - Session steps are accepted only from the session holder
//! - A failed step rolls the served collection back to its state before
//!   the session

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use server::SyncServer;
