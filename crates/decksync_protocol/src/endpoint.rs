//! Request paths.

use crate::error::{ProtocolError, ProtocolResult};

/// Every request a sync peer answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Login.
    HostKey,
    /// Step 1.
    Meta,
    /// Step 2.
    Start,
    /// Step 3.
    ApplyChanges,
    /// Step 4, peer to client.
    Chunk,
    /// Step 4, client to peer.
    ApplyChunk,
    /// Step 5.
    SanityCheck,
    /// Step 6.
    Finish,
    /// Abandon the open session.
    Abort,
    /// Whole-collection download.
    Download,
    /// Whole-collection upload.
    Upload,
    /// Media: open a media session.
    MediaBegin,
    /// Media: list changes.
    MediaChanges,
    /// Media: fetch files.
    MediaDownload,
    /// Media: send files and deletions.
    MediaUpload,
    /// Media: compare file counts.
    MediaSanity,
}

impl Endpoint {
    /// All endpoints.
    pub const ALL: [Endpoint; 16] = [
        Endpoint::HostKey,
        Endpoint::Meta,
        Endpoint::Start,
        Endpoint::ApplyChanges,
        Endpoint::Chunk,
        Endpoint::ApplyChunk,
        Endpoint::SanityCheck,
        Endpoint::Finish,
        Endpoint::Abort,
        Endpoint::Download,
        Endpoint::Upload,
        Endpoint::MediaBegin,
        Endpoint::MediaChanges,
        Endpoint::MediaDownload,
        Endpoint::MediaUpload,
        Endpoint::MediaSanity,
    ];

    /// Request path.
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::HostKey => "/sync/hostKey",
            Endpoint::Meta => "/sync/meta",
            Endpoint::Start => "/sync/start",
            Endpoint::ApplyChanges => "/sync/applyChanges",
            Endpoint::Chunk => "/sync/chunk",
            Endpoint::ApplyChunk => "/sync/applyChunk",
            Endpoint::SanityCheck => "/sync/sanityCheck2",
            Endpoint::Finish => "/sync/finish",
            Endpoint::Abort => "/sync/abort",
            Endpoint::Download => "/sync/download",
            Endpoint::Upload => "/sync/upload",
            Endpoint::MediaBegin => "/msync/begin",
            Endpoint::MediaChanges => "/msync/mediaChanges",
            Endpoint::MediaDownload => "/msync/downloadFiles",
            Endpoint::MediaUpload => "/msync/uploadChanges",
            Endpoint::MediaSanity => "/msync/mediaSanity",
        }
    }

    /// Parses a request path.
    pub fn from_path(path: &str) -> ProtocolResult<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.path() == path)
            .ok_or_else(|| ProtocolError::UnknownEndpoint(path.to_string()))
    }

    /// True for the steps of an incremental session that require an open
    /// session on the peer.
    pub fn requires_session(self) -> bool {
        matches!(
            self,
            Endpoint::ApplyChanges
                | Endpoint::Chunk
                | Endpoint::ApplyChunk
                | Endpoint::SanityCheck
                | Endpoint::Finish
        )
    }
}
