//! Error types for the sync engine.

use decksync_protocol::ProtocolError;
use decksync_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Expected protocol terminations (no changes, full sync required, ...) are
/// not errors; they are reported as [`crate::SyncOutcome`] values.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The peer answered with a non-success HTTP status.
    #[error("{message} (http {status})")]
    Http {
        /// Status code.
        status: u16,
        /// Human-readable cause.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Protocol error (unexpected message or sequence).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Message encoding error.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// Store error during sync.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A collection failed verification; nothing was replaced or sent.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// The peer's media usn moved while this session was uploading.
    #[error("media usn mismatch: expected {expected}, peer reports {actual}")]
    MediaUsnMismatch {
        /// Usn the client expected after the upload.
        expected: i32,
        /// Usn the peer reported.
        actual: i32,
    },

    /// Invalid state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

/// Human-readable cause of a non-success HTTP status.
pub fn describe_status(status: u16) -> String {
    match status {
        403 => "authentication failed".into(),
        407 => "proxy authentication required".into(),
        408 | 504 => "request timed out".into(),
        409 => "another client is syncing this collection".into(),
        413 => "collection is too large to upload".into(),
        501 => "client upgrade required".into(),
        502 => "server is down for maintenance".into(),
        503 => "server is overloaded".into(),
        code => format!("unknown error code {code}"),
    }
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Maps a non-success HTTP status.
    pub fn from_status(status: u16) -> Self {
        if status == 403 {
            Self::AuthenticationFailed(describe_status(status))
        } else {
            Self::Http {
                status,
                message: describe_status(status),
            }
        }
    }

    /// Creates an integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Http { status, .. } => matches!(status, 408 | 502 | 503 | 504),
            SyncError::Timeout => true,
            SyncError::MediaUsnMismatch { .. } => true,
            _ => false,
        }
    }

    /// True for failures that the meta step reports as bad authentication.
    pub fn is_auth_or_unreachable(&self) -> bool {
        matches!(
            self,
            SyncError::AuthenticationFailed(_) | SyncError::NotConnected
        )
    }
}
