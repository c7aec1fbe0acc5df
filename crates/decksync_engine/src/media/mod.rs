//! Media file sync.
//!
//! Media are synced separately from the collection, with their own usn
//! counter. The client keeps a [`MediaManifest`] of the files in its media
//! folder; a [`MediaSyncSession`] pulls the peer's changes since the last
//! seen usn, then pushes locally dirty entries.

mod manifest;
mod session;
mod transport;

pub use manifest::{file_hash, MediaEntry, MediaManifest, ScanSummary};
pub use session::{MediaSyncOutcome, MediaSyncSession};
pub use transport::{LocalMediaPeer, MediaTransport};

use crate::error::{SyncError, SyncResult};

/// Rejects file names that would escape the media folder.
pub fn check_media_name(fname: &str) -> SyncResult<()> {
    let bad = fname.is_empty()
        || fname == "."
        || fname == ".."
        || fname.contains(['/', '\\', '\0']);
    if bad {
        Err(SyncError::Protocol(format!("invalid media file name: {fname:?}")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_names() {
        assert!(check_media_name("cat.jpg").is_ok());
        assert!(check_media_name("日本.mp3").is_ok());
        assert!(check_media_name("../etc/passwd").is_err());
        assert!(check_media_name("a\\b").is_err());
        assert!(check_media_name("").is_err());
    }
}
