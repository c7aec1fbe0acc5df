//! Error types for import and merge.

use decksync_store::StoreError;
use thiserror::Error;

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur while merging a collection or importing a package.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Store error in the source or the destination.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error while reading the package or writing media.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Probing for a free id ran past the configured maximum.
    #[error("no free {kind} id after {probes} probes starting at {start}")]
    IdSpaceExhausted {
        /// Object kind (`note`, `card`, `model`, ...).
        kind: &'static str,
        /// First id tried.
        start: i64,
        /// Number of ids tried.
        probes: u32,
    },

    /// A source note references a model the source does not define.
    #[error("source model {0} not found")]
    MissingModel(i64),

    /// The package could not be opened or one of its entries read.
    #[error("unable to open package: {0}")]
    Archive(String),

    /// The package holds no collection.
    #[error("package holds no collection")]
    CollectionNotFound,

    /// The packaged collection is not a valid collection.
    #[error("no valid decks in package: {0}")]
    InvalidCollection(String),

    /// The package holds no media manifest.
    #[error("package holds no media manifest")]
    MediaManifestNotFound,

    /// The media manifest or one of the files it lists is unreadable.
    #[error("media corrupted: {0}")]
    MediaCorrupted(String),

    /// A caller callback refused to continue.
    #[error("import cancelled: {0}")]
    Cancelled(String),
}

impl MergeError {
    /// Creates an archive error.
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    /// Creates a media corruption error.
    pub fn media_corrupted(message: impl Into<String>) -> Self {
        Self::MediaCorrupted(message.into())
    }

    /// Creates a cancellation error, for use by callbacks.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled(message.into())
    }

    /// The outcome reported to the caller for this error.
    pub fn outcome(&self) -> ImportOutcome {
        match self {
            MergeError::Archive(_) => ImportOutcome::UnableToUnzip,
            MergeError::CollectionNotFound => ImportOutcome::NotFoundCollection,
            MergeError::InvalidCollection(_) => ImportOutcome::NotFoundValidDecks,
            MergeError::MediaManifestNotFound => ImportOutcome::NotFoundMediaFile,
            MergeError::MediaCorrupted(_) => ImportOutcome::MediaFileIsCorrupted,
            _ => ImportOutcome::UnknownException,
        }
    }
}

/// Final status of a package import, as presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// Everything was merged.
    Success,
    /// The packaged collection could not be read as a collection.
    NotFoundValidDecks,
    /// The package could not be opened.
    UnableToUnzip,
    /// The package has no media manifest.
    NotFoundMediaFile,
    /// The package has no collection.
    NotFoundCollection,
    /// The media manifest or a media entry is corrupted.
    MediaFileIsCorrupted,
    /// Any other failure; the destination is unchanged.
    UnknownException,
}

impl ImportOutcome {
    /// Maps the result of an import onto an outcome.
    pub fn of<T>(result: &MergeResult<T>) -> Self {
        match result {
            Ok(_) => ImportOutcome::Success,
            Err(err) => err.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes() {
        assert_eq!(
            MergeError::archive("bad").outcome(),
            ImportOutcome::UnableToUnzip
        );
        assert_eq!(
            MergeError::CollectionNotFound.outcome(),
            ImportOutcome::NotFoundCollection
        );
        assert_eq!(
            MergeError::MediaManifestNotFound.outcome(),
            ImportOutcome::NotFoundMediaFile
        );
        assert_eq!(
            MergeError::media_corrupted("7").outcome(),
            ImportOutcome::MediaFileIsCorrupted
        );
        assert_eq!(
            MergeError::InvalidCollection("x".into()).outcome(),
            ImportOutcome::NotFoundValidDecks
        );
        let exhausted = MergeError::IdSpaceExhausted {
            kind: "note",
            start: 1,
            probes: 3,
        };
        assert_eq!(exhausted.outcome(), ImportOutcome::UnknownException);
        assert_eq!(
            exhausted.to_string(),
            "no free note id after 3 probes starting at 1"
        );
    }

    #[test]
    fn outcome_of_result() {
        assert_eq!(ImportOutcome::of(&Ok::<_, MergeError>(())), ImportOutcome::Success);
        let err: MergeResult<()> = Err(MergeError::cancelled("user"));
        assert_eq!(ImportOutcome::of(&err), ImportOutcome::UnknownException);
    }
}
