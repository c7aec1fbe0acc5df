//! Media transport trait and the in-process media peer.

use super::manifest::file_hash;
use crate::error::SyncResult;
use decksync_protocol::{
    MediaBeginResponse, MediaChange, MediaChangesRequest, MediaChangesResponse,
    MediaDownloadRequest, MediaDownloadResponse, MediaFile, MediaSanityRequest,
    MediaSanityResponse, MediaUploadRequest, MediaUploadResponse,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// The peer side of media sync.
pub trait MediaTransport: Send + Sync {
    /// Starts a media session and returns the peer's media usn.
    fn begin(&self) -> SyncResult<MediaBeginResponse>;

    /// Peer changes after `last_usn`, ordered by usn.
    fn changes(&self, request: &MediaChangesRequest) -> SyncResult<MediaChangesResponse>;

    /// Fetches file contents.
    fn download_files(&self, request: &MediaDownloadRequest) -> SyncResult<MediaDownloadResponse>;

    /// Applies local additions and deletions; the peer may apply only a
    /// prefix.
    fn upload_changes(&self, request: &MediaUploadRequest) -> SyncResult<MediaUploadResponse>;

    /// Compares file counts.
    fn media_sanity(&self, request: &MediaSanityRequest) -> SyncResult<MediaSanityResponse>;
}

#[derive(Debug, Default)]
struct MediaState {
    usn: i32,
    files: BTreeMap<String, Vec<u8>>,
    log: BTreeMap<String, MediaChange>,
}

impl MediaState {
    fn record(&mut self, fname: &str, data: Option<Vec<u8>>) {
        self.usn += 1;
        let hash = data.as_deref().map(file_hash);
        match data {
            Some(bytes) => {
                self.files.insert(fname.to_string(), bytes);
            }
            None => {
                self.files.remove(fname);
            }
        }
        self.log.insert(
            fname.to_string(),
            MediaChange {
                fname: fname.to_string(),
                usn: self.usn,
                hash,
            },
        );
    }
}

/// In-process media server keeping files in memory.
#[derive(Debug, Default)]
pub struct LocalMediaPeer {
    state: Mutex<MediaState>,
    accept_limit: Option<usize>,
    pending_foreign: Mutex<Vec<(String, Vec<u8>)>>,
}

impl LocalMediaPeer {
    /// Creates an empty media peer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies at most `limit` entries per upload request.
    pub fn with_accept_limit(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit.max(1));
        self
    }

    /// Current media usn.
    pub fn usn(&self) -> i32 {
        self.state.lock().usn
    }

    /// Adds or replaces a file as if another client had uploaded it.
    pub fn put_file(&self, fname: &str, data: Vec<u8>) {
        self.state.lock().record(fname, Some(data));
    }

    /// Deletes a file as if another client had deleted it.
    pub fn delete_file(&self, fname: &str) {
        self.state.lock().record(fname, None);
    }

    /// Content of a stored file.
    pub fn file(&self, fname: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(fname).cloned()
    }

    /// Queues a file that another client uploads right before the next
    /// upload request is applied.
    pub fn race_next_upload(&self, fname: &str, data: Vec<u8>) {
        self.pending_foreign.lock().push((fname.to_string(), data));
    }
}

impl MediaTransport for LocalMediaPeer {
    fn begin(&self) -> SyncResult<MediaBeginResponse> {
        Ok(MediaBeginResponse { usn: self.usn() })
    }

    fn changes(&self, request: &MediaChangesRequest) -> SyncResult<MediaChangesResponse> {
        let state = self.state.lock();
        let mut changes: Vec<MediaChange> = state
            .log
            .values()
            .filter(|c| c.usn > request.last_usn)
            .cloned()
            .collect();
        changes.sort_by_key(|c| c.usn);
        changes.truncate(request.limit as usize);
        Ok(MediaChangesResponse { changes })
    }

    fn download_files(&self, request: &MediaDownloadRequest) -> SyncResult<MediaDownloadResponse> {
        let state = self.state.lock();
        let files = request
            .files
            .iter()
            .filter_map(|fname| {
                state.files.get(fname).map(|data| MediaFile {
                    fname: fname.clone(),
                    data: Some(data.clone()),
                })
            })
            .collect();
        Ok(MediaDownloadResponse { files })
    }

    fn upload_changes(&self, request: &MediaUploadRequest) -> SyncResult<MediaUploadResponse> {
        let mut state = self.state.lock();
        for (fname, data) in self.pending_foreign.lock().drain(..) {
            state.record(&fname, Some(data));
        }
        let limit = self.accept_limit.unwrap_or(usize::MAX);
        let mut processed = 0u32;
        for file in request.files.iter().take(limit) {
            state.record(&file.fname, file.data.clone());
            processed += 1;
        }
        Ok(MediaUploadResponse {
            processed,
            current_usn: state.usn,
        })
    }

    fn media_sanity(&self, request: &MediaSanityRequest) -> SyncResult<MediaSanityResponse> {
        let server_count = self.state.lock().files.len() as u32;
        Ok(MediaSanityResponse {
            ok: server_count == request.local_count,
            server_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_are_paged_by_usn() {
        let peer = LocalMediaPeer::new();
        peer.put_file("a", b"1".to_vec());
        peer.put_file("b", b"2".to_vec());
        peer.delete_file("a");

        let page = peer
            .changes(&MediaChangesRequest { last_usn: 0, limit: 10 })
            .unwrap();
        let usns: Vec<i32> = page.changes.iter().map(|c| c.usn).collect();
        assert_eq!(usns, vec![2, 3]);
        assert_eq!(page.changes[1].hash, None);

        let page = peer
            .changes(&MediaChangesRequest { last_usn: 2, limit: 10 })
            .unwrap();
        assert_eq!(page.changes.len(), 1);
    }

    #[test]
    fn upload_applies_a_prefix() {
        let peer = LocalMediaPeer::new().with_accept_limit(1);
        let request = MediaUploadRequest {
            files: vec![
                MediaFile { fname: "a".into(), data: Some(b"1".to_vec()) },
                MediaFile { fname: "b".into(), data: Some(b"2".to_vec()) },
            ],
        };
        let response = peer.upload_changes(&request).unwrap();
        assert_eq!(response.processed, 1);
        assert_eq!(response.current_usn, 1);
        assert!(peer.file("b").is_none());
    }
}
