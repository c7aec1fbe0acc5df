//! In-process server role.

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{SyncError, SyncResult};
use crate::full::{export_bytes, replace_with_bytes};
use crate::syncer::Syncer;
use crate::transport::SyncTransport;
use decksync_protocol::{
    Changes, Chunk, FinishResponse, Graves, MetaRequest, MetaResponse, SanityRequest,
    SanityResponse, StartRequest, PROTOCOL_VERSION,
};
use decksync_store::time::{now_millis, now_secs};
use decksync_store::{RecordStore, Role, UsnWindow};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, info, warn};

const SAVEPOINT: &str = "sync";

struct PeerState {
    store: RecordStore,
    session: Option<Syncer>,
}

/// The server side of the protocol over a local store.
///
/// Holds at most one open session; a second `start` while one is open is
/// refused with HTTP 409. Everything a session changes is kept in a
/// savepoint until `finish` (committed) or `abort` (rolled back).
pub struct LocalPeer {
    state: Mutex<PeerState>,
    chunk_size: usize,
    clock_offset: i64,
    message: String,
    refuse: bool,
    media_usn: AtomicI32,
}

impl LocalPeer {
    /// Wraps a store.
    pub fn new(store: RecordStore) -> Self {
        Self {
            state: Mutex::new(PeerState {
                store,
                session: None,
            }),
            chunk_size: DEFAULT_CHUNK_SIZE,
            clock_offset: 0,
            message: String::new(),
            refuse: false,
            media_usn: AtomicI32::new(0),
        }
    }

    /// Sets the rows per chunk page.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Shifts the reported clock by `secs`.
    pub fn with_clock_offset(mut self, secs: i64) -> Self {
        self.clock_offset = secs;
        self
    }

    /// Sets the message shown to clients.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Makes `meta` refuse to sync.
    pub fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Sets the media usn reported by `meta`.
    pub fn set_media_usn(&self, usn: i32) {
        self.media_usn.store(usn, Ordering::SeqCst);
    }

    /// True while a session is open.
    pub fn in_session(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Runs `f` against the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&RecordStore) -> R) -> R {
        f(&self.state.lock().store)
    }

    /// Returns the store, rolling back any open session.
    pub fn into_store(self) -> RecordStore {
        let mut state = self.state.into_inner();
        if state.session.take().is_some() {
            if let Err(err) = state.store.rollback_to(SAVEPOINT) {
                warn!(error = %err, "rollback of abandoned session failed");
            }
        }
        state.store
    }

    fn session_conflict() -> SyncError {
        SyncError::from_status(409)
    }

    fn no_session() -> SyncError {
        SyncError::Protocol("no sync session is open".into())
    }
}

impl PeerState {
    fn session(&mut self) -> SyncResult<(&RecordStore, &mut Syncer)> {
        match self.session.as_mut() {
            Some(syncer) => Ok((&self.store, syncer)),
            None => Err(LocalPeer::no_session()),
        }
    }

    /// Rolls back the open session after a failed step.
    fn fail(&mut self, err: SyncError) -> SyncError {
        if self.session.take().is_some() {
            if let Err(rollback_err) = self.store.rollback_to(SAVEPOINT) {
                warn!(error = %rollback_err, "rollback failed");
            }
        }
        err
    }
}

impl SyncTransport for LocalPeer {
    fn meta(&self, request: &MetaRequest) -> SyncResult<MetaResponse> {
        let state = self.state.lock();
        let meta = state.store.meta()?;
        let (cont, msg) = if self.refuse {
            (false, self.message.clone())
        } else if request.version != PROTOCOL_VERSION {
            (
                false,
                format!("unsupported protocol version {}", request.version),
            )
        } else {
            (true, self.message.clone())
        };
        Ok(MetaResponse {
            mtime: meta.mtime,
            scm: meta.scm,
            usn: meta.usn,
            ts: now_secs() + self.clock_offset,
            media_usn: self.media_usn.load(Ordering::SeqCst),
            msg,
            cont,
        })
    }

    fn start(&self, request: &StartRequest) -> SyncResult<Graves> {
        let mut state = self.state.lock();
        if state.session.is_some() {
            return Err(Self::session_conflict());
        }
        let usn = state.store.usn()?;
        let window = UsnWindow {
            min_usn: request.min_usn,
            max_usn: usn,
        };
        let syncer = Syncer::new(
            Role::Server,
            usn,
            window,
            !request.local_newer,
            self.chunk_size,
        );

        state.store.savepoint(SAVEPOINT)?;
        state.session = Some(syncer.clone());
        let result = syncer
            .pending_graves(&state.store)
            .and_then(|own| {
                syncer.apply_graves(&state.store, &request.graves)?;
                Ok(own)
            });
        match result {
            Ok(own) => {
                debug!(min_usn = request.min_usn, max_usn = usn, "session started");
                Ok(own)
            }
            Err(err) => Err(state.fail(err)),
        }
    }

    fn apply_changes(&self, changes: &Changes) -> SyncResult<Changes> {
        let mut state = self.state.lock();
        let result = state.session().and_then(|(store, syncer)| {
            let local = syncer.local_changes(store)?;
            syncer.merge_changes(store, changes)?;
            Ok(local)
        });
        result.map_err(|err| state.fail(err))
    }

    fn chunk(&self) -> SyncResult<Chunk> {
        let mut state = self.state.lock();
        let result = state
            .session()
            .and_then(|(store, syncer)| syncer.chunk(store));
        result.map_err(|err| state.fail(err))
    }

    fn apply_chunk(&self, chunk: &Chunk) -> SyncResult<()> {
        let mut state = self.state.lock();
        let result = state
            .session()
            .and_then(|(store, syncer)| syncer.apply_chunk(store, chunk));
        result.map(|_| ()).map_err(|err| state.fail(err))
    }

    fn sanity_check(&self, request: &SanityRequest) -> SyncResult<SanityResponse> {
        let mut state = self.state.lock();
        let result = state
            .session()
            .and_then(|(store, _)| Ok(store.sanity_digest()?));
        let digest = result.map_err(|err| state.fail(err))?;
        Ok(SanityResponse::judge(request.client, digest))
    }

    fn finish(&self) -> SyncResult<FinishResponse> {
        let mut state = self.state.lock();
        let window = state.session()?.1.window();
        let mtime = now_millis();
        let result = state
            .store
            .finish_sync(mtime, window.next_usn())
            .and_then(|()| state.store.release(SAVEPOINT));
        match result {
            Ok(()) => {
                state.session = None;
                info!(usn = window.next_usn(), "session committed");
                Ok(FinishResponse { mtime })
            }
            Err(err) => Err(state.fail(err.into())),
        }
    }

    fn abort(&self) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.session.take().is_some() {
            state.store.rollback_to(SAVEPOINT)?;
            info!("session aborted");
        }
        Ok(())
    }

    fn download(&self) -> SyncResult<Vec<u8>> {
        let state = self.state.lock();
        if state.session.is_some() {
            return Err(Self::session_conflict());
        }
        export_bytes(&state.store)
    }

    fn upload(&self, data: &[u8]) -> SyncResult<()> {
        let mut state = self.state.lock();
        if state.session.is_some() {
            return Err(Self::session_conflict());
        }
        replace_with_bytes(&mut state.store, data)?;
        info!(bytes = data.len(), "collection replaced by upload");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_request() -> StartRequest {
        StartRequest {
            min_usn: 0,
            local_newer: false,
            graves: Graves::default(),
        }
    }

    #[test]
    fn second_session_is_refused() {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        peer.start(&start_request()).unwrap();
        let err = peer.start(&start_request()).unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 409, .. }));
        assert!(matches!(peer.download(), Err(SyncError::Http { status: 409, .. })));

        peer.abort().unwrap();
        assert!(!peer.in_session());
        peer.start(&start_request()).unwrap();
    }

    #[test]
    fn steps_need_an_open_session() {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        assert!(matches!(peer.chunk(), Err(SyncError::Protocol(_))));
        assert!(matches!(peer.finish(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn finish_advances_usn() {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        peer.start(&start_request()).unwrap();
        let finish = peer.finish().unwrap();
        assert!(finish.mtime > 0);

        let meta = peer.with_store(|s| s.meta().unwrap());
        assert_eq!(meta.usn, 1);
        assert_eq!(meta.mtime, finish.mtime);
        assert!(peer.with_store(|s| s.is_autocommit()));
    }

    #[test]
    fn abort_rolls_back() {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        peer.start(&start_request()).unwrap();
        peer.apply_changes(&Changes {
            tags: vec!["late".into()],
            ..Changes::default()
        })
        .unwrap();
        peer.abort().unwrap();
        assert!(peer.with_store(|s| s.tags().unwrap()).is_empty());
    }

    #[test]
    fn meta_reports_refusal_and_version() {
        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap())
            .refusing()
            .with_message("closed for today");
        let meta = peer.meta(&MetaRequest::new("test")).unwrap();
        assert!(!meta.cont);
        assert_eq!(meta.msg, "closed for today");

        let peer = LocalPeer::new(RecordStore::open_in_memory().unwrap());
        let mut old = MetaRequest::new("test");
        old.version = 1;
        assert!(!peer.meta(&old).unwrap().cont);
        assert!(peer.meta(&MetaRequest::new("test")).unwrap().cont);
    }
}
