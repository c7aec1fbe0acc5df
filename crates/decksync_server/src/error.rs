//! Error types for the sync server.

use decksync_engine::SyncError;
use decksync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// Every error is answered with the HTTP status from
/// [`ServerError::status`] and an empty body.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown request path.
    #[error("no such endpoint: {0}")]
    UnknownEndpoint(String),

    /// Wrong user name or password.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Missing, forged or expired host key.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Another client holds the open session.
    #[error("another client is syncing this collection")]
    SessionConflict,

    /// A session step arrived without an open session.
    #[error("no sync session is open")]
    NoSession,

    /// Protocol version too old.
    #[error("protocol version {version} is older than {minimum}")]
    ProtocolMismatch {
        /// Version the client speaks.
        version: u32,
        /// Oldest version accepted.
        minimum: u32,
    },

    /// Full upload over the size limit.
    #[error("upload of {size} bytes exceeds the limit of {limit}")]
    PayloadTooLarge {
        /// Upload size.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The collection peer failed the request.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Body could not be decoded or the response encoded.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// HTTP status answered for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::NoSession | ServerError::Codec(_) => 400,
            ServerError::AuthenticationFailed(_) | ServerError::NotAuthorized(_) => 403,
            ServerError::UnknownEndpoint(_) => 404,
            ServerError::SessionConflict => 409,
            ServerError::PayloadTooLarge { .. } => 413,
            ServerError::ProtocolMismatch { .. } => 501,
            ServerError::Sync(err) => match err {
                SyncError::Http { status, .. } => *status,
                SyncError::AuthenticationFailed(_) => 403,
                SyncError::Protocol(_) | SyncError::Codec(_) | SyncError::Integrity(_) => 400,
                _ => 500,
            },
            ServerError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status() >= 500
    }
}
