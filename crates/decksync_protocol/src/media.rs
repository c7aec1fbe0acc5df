//! Media sync messages.

use serde::{Deserialize, Serialize};

/// Reply to `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBeginResponse {
    /// Peer media usn.
    pub usn: i32,
}

/// Request for changes after `last_usn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChangesRequest {
    /// Highest usn the client has seen.
    pub last_usn: i32,
    /// Maximum number of entries to return.
    pub limit: u32,
}

/// One changed file on the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChange {
    /// File name.
    pub fname: String,
    /// Usn at which it changed.
    pub usn: i32,
    /// Content hash, `None` if the file was deleted.
    pub hash: Option<String>,
}

/// Page of peer changes, ordered by usn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaChangesResponse {
    /// Changes.
    pub changes: Vec<MediaChange>,
}

/// Files to fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDownloadRequest {
    /// File names.
    pub files: Vec<String>,
}

/// A file and its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFile {
    /// File name.
    pub fname: String,
    /// Content, `None` for a deletion.
    pub data: Option<Vec<u8>>,
}

/// Fetched files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDownloadResponse {
    /// Files, in request order; missing ones are omitted.
    pub files: Vec<MediaFile>,
}

/// Local additions and deletions to apply on the peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUploadRequest {
    /// Entries, applied in order.
    pub files: Vec<MediaFile>,
}

/// Result of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    /// Number of leading entries the peer applied.
    pub processed: u32,
    /// Peer media usn after applying them.
    pub current_usn: i32,
}

/// Final count comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSanityRequest {
    /// Number of present files on the client.
    pub local_count: u32,
}

/// Result of the count comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSanityResponse {
    /// True if counts agree.
    pub ok: bool,
    /// Number of present files on the peer.
    pub server_count: u32,
}
