//! # decksync protocol
//!
//! Typed messages for the incremental collection sync, the whole-collection
//! fallback and media sync, plus their CBOR wire encoding.
//!
//! Each protocol step has its own request and response types carrying only
//! the fields that step needs. Messages are turned into bytes only at the
//! transport boundary, through [`WireMessage`].
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod endpoint;
mod error;
mod media;
mod messages;

pub use codec::WireMessage;
pub use endpoint::Endpoint;
pub use error::{ProtocolError, ProtocolResult};
pub use media::{
    MediaBeginResponse, MediaChange, MediaChangesRequest, MediaChangesResponse,
    MediaDownloadRequest, MediaDownloadResponse, MediaFile, MediaSanityRequest,
    MediaSanityResponse, MediaUploadRequest, MediaUploadResponse,
};
pub use messages::{
    Changes, Chunk, ChunkTable, DownloadResponse, Empty, Envelope, FinishResponse, Graves,
    HostKeyRequest, HostKeyResponse, MetaRequest, MetaResponse, SanityRequest, SanityResponse,
    SanityStatus, StartRequest, UploadRequest, PROTOCOL_VERSION,
};
