//! Transport layer abstraction for sync operations.

use crate::error::{SyncError, SyncResult};
use decksync_protocol::{
    Changes, Chunk, FinishResponse, Graves, MetaRequest, MetaResponse, SanityRequest,
    SanityResponse, StartRequest,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// The peer side of a sync session.
///
/// One method per protocol step. Implementations exist for a remote peer
/// over HTTP ([`crate::HttpTransport`]), an in-process peer
/// ([`crate::LocalPeer`]) and tests ([`MockTransport`]).
pub trait SyncTransport: Send + Sync {
    /// Step 1: the peer's metadata.
    fn meta(&self, request: &MetaRequest) -> SyncResult<MetaResponse>;

    /// Step 2: opens the session, sends local deletions, returns the peer's.
    fn start(&self, request: &StartRequest) -> SyncResult<Graves>;

    /// Step 3: exchanges small objects.
    fn apply_changes(&self, changes: &Changes) -> SyncResult<Changes>;

    /// Step 4: next page of the peer's rows.
    fn chunk(&self) -> SyncResult<Chunk>;

    /// Step 4: one page of local rows.
    fn apply_chunk(&self, chunk: &Chunk) -> SyncResult<()>;

    /// Step 5: compares digests.
    fn sanity_check(&self, request: &SanityRequest) -> SyncResult<SanityResponse>;

    /// Step 6: commits on the peer and returns the shared timestamp.
    fn finish(&self) -> SyncResult<FinishResponse>;

    /// Abandons the open session; the peer rolls back.
    fn abort(&self) -> SyncResult<()>;

    /// Whole-collection download.
    fn download(&self) -> SyncResult<Vec<u8>>;

    /// Whole-collection upload.
    fn upload(&self, data: &[u8]) -> SyncResult<()>;
}

/// A scripted transport for testing.
#[derive(Debug, Default)]
pub struct MockTransport {
    connected: AtomicBool,
    meta: Mutex<Option<MetaResponse>>,
    graves: Mutex<Graves>,
    changes: Mutex<Changes>,
    chunks: Mutex<VecDeque<Chunk>>,
    sanity: Mutex<Option<SanityResponse>>,
    finish: Mutex<Option<FinishResponse>>,
    download: Mutex<Vec<u8>>,
    received_chunks: Mutex<Vec<Chunk>>,
    received_start: Mutex<Option<StartRequest>>,
    uploaded: Mutex<Option<Vec<u8>>>,
    aborted: AtomicBool,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Sets the meta response.
    pub fn set_meta(&self, response: MetaResponse) {
        *self.meta.lock() = Some(response);
    }

    /// Sets the graves returned by `start`.
    pub fn set_graves(&self, graves: Graves) {
        *self.graves.lock() = graves;
    }

    /// Sets the changes returned by `apply_changes`.
    pub fn set_changes(&self, changes: Changes) {
        *self.changes.lock() = changes;
    }

    /// Queues a chunk; when the queue is empty `chunk` returns a final,
    /// empty page.
    pub fn push_chunk(&self, chunk: Chunk) {
        self.chunks.lock().push_back(chunk);
    }

    /// Sets the sanity response.
    pub fn set_sanity(&self, response: SanityResponse) {
        *self.sanity.lock() = Some(response);
    }

    /// Sets the finish response.
    pub fn set_finish(&self, response: FinishResponse) {
        *self.finish.lock() = Some(response);
    }

    /// Sets the bytes returned by `download`.
    pub fn set_download(&self, data: Vec<u8>) {
        *self.download.lock() = data;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Chunks received through `apply_chunk`.
    pub fn received_chunks(&self) -> Vec<Chunk> {
        self.received_chunks.lock().clone()
    }

    /// The last `start` request.
    pub fn received_start(&self) -> Option<StartRequest> {
        self.received_start.lock().clone()
    }

    /// Bytes received through `upload`.
    pub fn uploaded(&self) -> Option<Vec<u8>> {
        self.uploaded.lock().clone()
    }

    /// True once `abort` was called.
    pub fn was_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::NotConnected)
        }
    }
}

impl SyncTransport for MockTransport {
    fn meta(&self, _request: &MetaRequest) -> SyncResult<MetaResponse> {
        self.check_connected()?;
        self.meta
            .lock()
            .clone()
            .ok_or_else(|| SyncError::Protocol("no mock meta response set".into()))
    }

    fn start(&self, request: &StartRequest) -> SyncResult<Graves> {
        self.check_connected()?;
        *self.received_start.lock() = Some(request.clone());
        Ok(self.graves.lock().clone())
    }

    fn apply_changes(&self, _changes: &Changes) -> SyncResult<Changes> {
        self.check_connected()?;
        Ok(self.changes.lock().clone())
    }

    fn chunk(&self) -> SyncResult<Chunk> {
        self.check_connected()?;
        Ok(self.chunks.lock().pop_front().unwrap_or(Chunk {
            done: true,
            ..Chunk::default()
        }))
    }

    fn apply_chunk(&self, chunk: &Chunk) -> SyncResult<()> {
        self.check_connected()?;
        self.received_chunks.lock().push(chunk.clone());
        Ok(())
    }

    fn sanity_check(&self, request: &SanityRequest) -> SyncResult<SanityResponse> {
        self.check_connected()?;
        Ok(self
            .sanity
            .lock()
            .unwrap_or_else(|| SanityResponse::judge(request.client, request.client)))
    }

    fn finish(&self) -> SyncResult<FinishResponse> {
        self.check_connected()?;
        self.finish
            .lock()
            .ok_or_else(|| SyncError::Protocol("no mock finish response set".into()))
    }

    fn abort(&self) -> SyncResult<()> {
        self.aborted.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn download(&self) -> SyncResult<Vec<u8>> {
        self.check_connected()?;
        Ok(self.download.lock().clone())
    }

    fn upload(&self, data: &[u8]) -> SyncResult<()> {
        self.check_connected()?;
        *self.uploaded.lock() = Some(data.to_vec());
        Ok(())
    }
}
