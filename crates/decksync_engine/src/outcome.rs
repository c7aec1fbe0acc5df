//! Terminal results of a sync session.

use decksync_store::SanityDigest;

/// How a sync session ended.
///
/// Every variant except [`SyncOutcome::Success`] leaves the local store as
/// it was before the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Both copies were already identical.
    NoChanges,
    /// The schemas diverged; a whole-collection transfer is required.
    FullSync,
    /// The session completed and was committed.
    Success,
    /// The peer rejected the credentials or could not be reached.
    BadAuth,
    /// The clocks of the two machines are too far apart.
    ClockOff {
        /// Peer clock minus local clock, in seconds.
        difference: i64,
    },
    /// The peer refused to sync.
    ServerAbort {
        /// Message from the peer.
        message: String,
    },
    /// The local collection failed its structural check.
    BasicCheckFailed,
    /// The two copies disagreed after merging.
    SanityCheckError {
        /// Local digest.
        client: SanityDigest,
        /// Peer digest.
        server: SanityDigest,
    },
    /// The peer failed to finalize.
    FinishError,
}

impl SyncOutcome {
    /// Short stable name, as used in logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            SyncOutcome::NoChanges => "noChanges",
            SyncOutcome::FullSync => "fullSync",
            SyncOutcome::Success => "success",
            SyncOutcome::BadAuth => "badAuth",
            SyncOutcome::ClockOff { .. } => "clockOff",
            SyncOutcome::ServerAbort { .. } => "serverAbort",
            SyncOutcome::BasicCheckFailed => "basicCheckFailed",
            SyncOutcome::SanityCheckError { .. } => "sanityCheckError",
            SyncOutcome::FinishError => "finishError",
        }
    }

    /// True if the local store now matches the peer.
    pub fn is_in_sync(&self) -> bool {
        matches!(self, SyncOutcome::NoChanges | SyncOutcome::Success)
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::ClockOff { difference } => {
                write!(f, "clockOff ({difference}s)")
            }
            SyncOutcome::ServerAbort { message } => write!(f, "serverAbort: {message}"),
            other => f.write_str(other.name()),
        }
    }
}
