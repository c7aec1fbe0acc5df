//! Client side of media sync.

use super::manifest::{file_hash, MediaManifest};
use super::transport::MediaTransport;
use super::check_media_name;
use crate::config::MediaSyncConfig;
use crate::error::{SyncError, SyncResult};
use decksync_protocol::{
    MediaChangesRequest, MediaDownloadRequest, MediaFile, MediaSanityRequest, MediaUploadRequest,
};
use decksync_store::time::now_secs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a media sync ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSyncOutcome {
    /// Nothing changed on either side.
    NoChanges,
    /// Changes were exchanged and the file counts agree.
    Synced {
        /// Files fetched from the peer.
        downloaded: usize,
        /// Local files removed because the peer deleted them.
        removed: usize,
        /// Local changes accepted by the peer.
        uploaded: usize,
    },
    /// Changes were exchanged but the file counts disagree.
    SanityCheckFailed {
        /// Present files on this side.
        local: u32,
        /// Present files on the peer.
        server: u32,
    },
}

#[derive(Debug, Default)]
struct Counts {
    downloaded: usize,
    removed: usize,
    uploaded: usize,
}

/// Drives media sync against a [`MediaTransport`].
pub struct MediaSyncSession<T: MediaTransport> {
    config: MediaSyncConfig,
    transport: Arc<T>,
}

impl<T: MediaTransport> MediaSyncSession<T> {
    /// Creates a media session driver.
    pub fn new(config: MediaSyncConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    /// Syncs `folder` with the peer.
    ///
    /// If the peer's usn moves underneath an upload, the whole session is
    /// run again, up to [`MediaSyncConfig::max_attempts`] times.
    pub fn sync(&self, manifest: &MediaManifest, folder: &Path) -> SyncResult<MediaSyncOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.run(manifest, folder) {
                Err(err @ SyncError::MediaUsnMismatch { .. }) if attempt < self.config.max_attempts => {
                    warn!(error = %err, attempt, "media usn moved during upload, restarting");
                }
                other => return other,
            }
        }
    }

    fn run(&self, manifest: &MediaManifest, folder: &Path) -> SyncResult<MediaSyncOutcome> {
        std::fs::create_dir_all(folder)?;
        manifest.rescan(folder)?;

        let begin = self.transport.begin()?;
        if begin.usn == manifest.last_usn()? && !manifest.has_dirty()? {
            return Ok(MediaSyncOutcome::NoChanges);
        }

        let mut counts = Counts::default();
        self.download(manifest, folder, &mut counts)?;
        self.upload(manifest, folder, &mut counts)?;

        let local = manifest.count()?;
        let sanity = self
            .transport
            .media_sanity(&MediaSanityRequest { local_count: local })?;
        if !sanity.ok {
            warn!(local, server = sanity.server_count, "media counts differ");
            return Ok(MediaSyncOutcome::SanityCheckFailed {
                local,
                server: sanity.server_count,
            });
        }

        info!(
            downloaded = counts.downloaded,
            removed = counts.removed,
            uploaded = counts.uploaded,
            "media synced"
        );
        Ok(MediaSyncOutcome::Synced {
            downloaded: counts.downloaded,
            removed: counts.removed,
            uploaded: counts.uploaded,
        })
    }

    fn download(&self, manifest: &MediaManifest, folder: &Path, counts: &mut Counts) -> SyncResult<()> {
        loop {
            let last_usn = manifest.last_usn()?;
            let page = self.transport.changes(&MediaChangesRequest {
                last_usn,
                limit: self.config.changes_page,
            })?;
            let Some(page_usn) = page.changes.iter().map(|c| c.usn).max() else {
                return Ok(());
            };

            let mut wanted = Vec::new();
            for change in &page.changes {
                check_media_name(&change.fname)?;
                let local = manifest.entry(&change.fname)?;
                match &change.hash {
                    Some(hash) => {
                        if local.as_ref().and_then(|e| e.hash.as_ref()) != Some(hash) {
                            wanted.push(change.fname.clone());
                        } else if let Some(entry) = local.filter(|e| e.dirty) {
                            // same content on both sides
                            manifest.set_entry(&entry.fname, entry.hash.as_deref(), entry.mtime, false)?;
                        }
                    }
                    None => match local {
                        Some(entry) if entry.dirty => {
                            debug!(fname = %change.fname, "keeping locally changed file");
                        }
                        Some(_) => {
                            remove_file(folder, &change.fname)?;
                            manifest.remove_entry(&change.fname)?;
                            counts.removed += 1;
                        }
                        None => {}
                    },
                }
            }

            for batch in wanted.chunks(self.config.download_batch) {
                let response = self.transport.download_files(&MediaDownloadRequest {
                    files: batch.to_vec(),
                })?;
                for file in response.files {
                    check_media_name(&file.fname)?;
                    let Some(data) = file.data else {
                        continue;
                    };
                    std::fs::write(folder.join(&file.fname), &data)?;
                    manifest.set_entry(&file.fname, Some(&file_hash(&data)), now_secs(), false)?;
                    counts.downloaded += 1;
                }
            }

            manifest.set_last_usn(page_usn)?;
            debug!(page_usn, "media changes applied");
        }
    }

    fn upload(&self, manifest: &MediaManifest, folder: &Path, counts: &mut Counts) -> SyncResult<()> {
        loop {
            let dirty = manifest.dirty_entries(self.config.upload_batch)?;
            if dirty.is_empty() {
                return Ok(());
            }

            let mut files = Vec::with_capacity(dirty.len());
            for entry in &dirty {
                let data = match entry.hash {
                    Some(_) => Some(std::fs::read(folder.join(&entry.fname))?),
                    None => None,
                };
                files.push(MediaFile {
                    fname: entry.fname.clone(),
                    data,
                });
            }

            let last_usn = manifest.last_usn()?;
            let response = self
                .transport
                .upload_changes(&MediaUploadRequest { files })?;
            let processed = (response.processed as usize).min(dirty.len());
            manifest.mark_clean(dirty[..processed].iter().map(|e| e.fname.as_str()))?;
            counts.uploaded += processed;

            let expected = last_usn + processed as i32;
            if response.current_usn != expected {
                return Err(SyncError::MediaUsnMismatch {
                    expected,
                    actual: response.current_usn,
                });
            }
            manifest.set_last_usn(response.current_usn)?;

            if processed == 0 {
                return Err(SyncError::Protocol("peer accepted no media changes".into()));
            }
        }
    }
}

fn remove_file(folder: &Path, fname: &str) -> SyncResult<()> {
    match std::fs::remove_file(folder.join(fname)) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::LocalMediaPeer;
    use tempfile::tempdir;

    fn session(peer: Arc<LocalMediaPeer>) -> MediaSyncSession<LocalMediaPeer> {
        MediaSyncSession::new(MediaSyncConfig::new().with_upload_batch(2), peer)
    }

    #[test]
    fn nothing_to_do() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new());
        let outcome = session(peer).sync(&manifest, dir.path()).unwrap();
        assert_eq!(outcome, MediaSyncOutcome::NoChanges);
    }

    #[test]
    fn downloads_then_uploads() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new());
        peer.put_file("remote.png", b"remote".to_vec());
        std::fs::write(dir.path().join("local.png"), b"local").unwrap();

        let outcome = session(peer.clone()).sync(&manifest, dir.path()).unwrap();
        assert_eq!(
            outcome,
            MediaSyncOutcome::Synced { downloaded: 1, removed: 0, uploaded: 1 }
        );
        assert_eq!(std::fs::read(dir.path().join("remote.png")).unwrap(), b"remote");
        assert_eq!(peer.file("local.png").unwrap(), b"local");
        assert_eq!(manifest.last_usn().unwrap(), peer.usn());

        let again = session(peer).sync(&manifest, dir.path()).unwrap();
        assert_eq!(again, MediaSyncOutcome::NoChanges);
    }

    #[test]
    fn remote_deletion_spares_dirty_files() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new());
        peer.put_file("a.png", b"a".to_vec());
        peer.put_file("b.png", b"b".to_vec());
        session(peer.clone()).sync(&manifest, dir.path()).unwrap();

        peer.delete_file("a.png");
        peer.delete_file("b.png");
        std::fs::write(dir.path().join("b.png"), b"edited").unwrap();

        let outcome = session(peer.clone()).sync(&manifest, dir.path()).unwrap();
        assert_eq!(
            outcome,
            MediaSyncOutcome::Synced { downloaded: 0, removed: 1, uploaded: 1 }
        );
        assert!(!dir.path().join("a.png").exists());
        assert_eq!(peer.file("b.png").unwrap(), b"edited");
    }

    #[test]
    fn partial_acknowledgement_marks_only_the_prefix() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new().with_accept_limit(1));
        for name in ["1.ogg", "2.ogg", "3.ogg"] {
            std::fs::write(dir.path().join(name), name.as_bytes()).unwrap();
        }

        let outcome = session(peer.clone()).sync(&manifest, dir.path()).unwrap();
        assert_eq!(
            outcome,
            MediaSyncOutcome::Synced { downloaded: 0, removed: 0, uploaded: 3 }
        );
        assert_eq!(peer.usn(), 3);
        assert!(!manifest.has_dirty().unwrap());
    }

    #[test]
    fn usn_race_restarts_the_session() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new());
        peer.race_next_upload("other.png", b"other".to_vec());
        std::fs::write(dir.path().join("mine.png"), b"mine").unwrap();

        let outcome = session(peer.clone()).sync(&manifest, dir.path()).unwrap();
        assert!(matches!(outcome, MediaSyncOutcome::Synced { downloaded: 1, .. }));
        assert_eq!(std::fs::read(dir.path().join("other.png")).unwrap(), b"other");
        assert_eq!(manifest.last_usn().unwrap(), peer.usn());
    }

    #[test]
    fn persistent_races_give_up() {
        let dir = tempdir().unwrap();
        let manifest = MediaManifest::open_in_memory().unwrap();
        let peer = Arc::new(LocalMediaPeer::new());
        std::fs::write(dir.path().join("mine.png"), b"mine").unwrap();
        std::fs::write(dir.path().join("more.png"), b"more").unwrap();
        std::fs::write(dir.path().join("most.png"), b"most").unwrap();
        let session = MediaSyncSession::new(
            MediaSyncConfig::new().with_upload_batch(1).with_max_attempts(1),
            peer.clone(),
        );
        peer.race_next_upload("other.png", b"other".to_vec());

        let err = session.sync(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, SyncError::MediaUsnMismatch { expected: 1, actual: 2 }));
    }
}
