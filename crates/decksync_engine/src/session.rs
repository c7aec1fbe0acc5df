//! Client side of the incremental sync protocol.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::outcome::SyncOutcome;
use crate::syncer::Syncer;
use crate::transport::SyncTransport;
use decksync_protocol::{MetaRequest, MetaResponse, SanityRequest, SanityStatus, StartRequest};
use decksync_store::time::now_secs;
use decksync_store::{CollectionMeta, RecordStore, Role, UsnWindow};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

const SAVEPOINT: &str = "sync";

/// The current state of a sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No session running.
    Idle,
    /// Comparing metadata with the peer.
    Negotiating,
    /// Exchanging deletions and small objects.
    Exchanging,
    /// Streaming the large tables.
    Streaming,
    /// Comparing digests.
    Verifying,
    /// Committing on both sides.
    Finalizing,
    /// The last session ended normally.
    Synced,
    /// The last session failed.
    Error,
}

impl SyncState {
    /// Returns true while a session is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Negotiating
                | SyncState::Exchanging
                | SyncState::Streaming
                | SyncState::Verifying
                | SyncState::Finalizing
        )
    }

    /// Returns true if a new session may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncState::Idle | SyncState::Synced | SyncState::Error)
    }
}

/// Cumulative statistics across sessions.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Sessions that ended with [`SyncOutcome::Success`].
    pub sessions_completed: u64,
    /// Rows received from the peer.
    pub rows_received: u64,
    /// Rows sent to the peer.
    pub rows_sent: u64,
    /// Small objects sent to the peer.
    pub objects_sent: u64,
    /// Deletions received from the peer.
    pub graves_received: u64,
    /// Deletions sent to the peer.
    pub graves_sent: u64,
    /// Retries performed by [`SyncSession::sync_with_retry`].
    pub retries: u64,
    /// Outcome of the last session.
    pub last_outcome: Option<SyncOutcome>,
    /// Last error message.
    pub last_error: Option<String>,
    /// End of the last session.
    pub last_sync_time: Option<Instant>,
}

/// Drives the client role of the protocol against a [`SyncTransport`].
pub struct SyncSession<T: SyncTransport> {
    config: SyncConfig,
    transport: Arc<T>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<T: SyncTransport> SyncSession<T> {
    /// Creates a session driver.
    pub fn new(config: SyncConfig, transport: T) -> Self {
        Self::with_shared(config, Arc::new(transport))
    }

    /// Creates a session driver over a shared transport.
    pub fn with_shared(config: SyncConfig, transport: Arc<T>) -> Self {
        Self {
            config,
            transport,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        debug!(?state, "sync state");
        *self.state.write() = state;
    }

    /// Runs one sync session against the peer.
    ///
    /// Protocol terminations are returned as [`SyncOutcome`]s; errors are
    /// reserved for failures, after which the local store is rolled back
    /// and the peer asked to abort.
    pub fn sync(&self, store: &RecordStore) -> SyncResult<SyncOutcome> {
        let current = self.state();
        if !current.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{current:?}"),
                to: "Negotiating".into(),
            });
        }

        self.set_state(SyncState::Negotiating);
        let result = self.run(store);
        let state = match &result {
            Ok(outcome) if outcome.is_in_sync() => SyncState::Synced,
            Ok(SyncOutcome::FullSync) => SyncState::Synced,
            _ => SyncState::Error,
        };
        self.set_state(state);

        let mut stats = self.stats.write();
        match &result {
            Ok(outcome) => {
                if *outcome == SyncOutcome::Success {
                    stats.sessions_completed += 1;
                }
                stats.last_outcome = Some(outcome.clone());
                stats.last_error = None;
                info!(outcome = %outcome, "sync finished");
            }
            Err(err) => {
                stats.last_outcome = None;
                stats.last_error = Some(err.to_string());
                warn!(error = %err, "sync failed");
            }
        }
        stats.last_sync_time = Some(Instant::now());
        result
    }

    /// Runs [`SyncSession::sync`], retrying retryable errors with backoff.
    pub fn sync_with_retry(&self, store: &RecordStore) -> SyncResult<SyncOutcome> {
        let retry = &self.config.retry;
        let mut last_error = None;

        for attempt in 0..retry.max_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                info!(attempt, ?delay, "retrying sync");
                std::thread::sleep(delay);
                self.stats.write().retries += 1;
            }

            match self.sync(store) {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_retryable() && attempt + 1 < retry.max_attempts => {
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    fn run(&self, store: &RecordStore) -> SyncResult<SyncOutcome> {
        let remote = match self.transport.meta(&MetaRequest::new(&self.config.client_version)) {
            Ok(meta) => meta,
            Err(err) if err.is_auth_or_unreachable() => {
                warn!(error = %err, "meta failed");
                return Ok(SyncOutcome::BadAuth);
            }
            Err(err) => return Err(err),
        };
        let local = store.meta()?;

        if let Some(outcome) = self.negotiate(store, &local, &remote)? {
            return Ok(outcome);
        }
        let local_newer = local.mtime > remote.mtime;
        let window = UsnWindow {
            min_usn: local.usn,
            max_usn: remote.usn,
        };
        debug!(?window, local_newer, "negotiated");

        store.savepoint(SAVEPOINT)?;
        let outcome = match self.exchange(store, window, local_newer) {
            Ok(SyncOutcome::Success) => {
                store.release(SAVEPOINT)?;
                SyncOutcome::Success
            }
            Ok(outcome) => {
                self.rollback(store);
                if let SyncOutcome::SanityCheckError { client, server } = &outcome {
                    warn!(?client, ?server, "sanity check failed, next sync will be a full sync");
                    store.bump_schema()?;
                }
                outcome
            }
            Err(err) => {
                self.rollback(store);
                self.maintain(store);
                return Err(err);
            }
        };
        self.maintain(store);
        Ok(outcome)
    }

    /// Step 1 checks. `Some` ends the session before anything is changed.
    fn negotiate(
        &self,
        store: &RecordStore,
        local: &CollectionMeta,
        remote: &MetaResponse,
    ) -> SyncResult<Option<SyncOutcome>> {
        if !remote.cont {
            return Ok(Some(SyncOutcome::ServerAbort {
                message: remote.msg.clone(),
            }));
        }
        if !remote.msg.is_empty() {
            info!(message = %remote.msg, "message from peer");
        }
        let difference = remote.ts - now_secs();
        if difference.unsigned_abs() > self.config.max_clock_skew.as_secs() {
            return Ok(Some(SyncOutcome::ClockOff { difference }));
        }
        if local.mtime == remote.mtime {
            return Ok(Some(SyncOutcome::NoChanges));
        }
        if local.scm != remote.scm {
            return Ok(Some(SyncOutcome::FullSync));
        }
        let problems = store.structural_problems()?;
        if !problems.is_empty() {
            warn!(?problems, "local collection failed the basic check");
            return Ok(Some(SyncOutcome::BasicCheckFailed));
        }
        Ok(None)
    }

    /// Steps 2 to 6, inside the session savepoint.
    fn exchange(
        &self,
        store: &RecordStore,
        window: UsnWindow,
        local_newer: bool,
    ) -> SyncResult<SyncOutcome> {
        let mut syncer = Syncer::new(
            Role::Client,
            window.min_usn,
            window,
            local_newer,
            self.config.chunk_size,
        );

        self.set_state(SyncState::Exchanging);
        let graves = syncer.pending_graves(store)?;
        let sent_graves = graves.len() as u64;
        let remote_graves = self.transport.start(&StartRequest {
            min_usn: window.min_usn,
            local_newer,
            graves,
        })?;
        syncer.apply_graves(store, &remote_graves)?;

        let changes = syncer.local_changes(store)?;
        let remote_changes = self.transport.apply_changes(&changes)?;
        syncer.merge_changes(store, &remote_changes)?;

        self.set_state(SyncState::Streaming);
        let mut received = 0u64;
        loop {
            let chunk = self.transport.chunk()?;
            received += chunk.row_count() as u64;
            syncer.apply_chunk(store, &chunk)?;
            if chunk.done {
                break;
            }
        }
        let mut sent = 0u64;
        loop {
            let chunk = syncer.chunk(store)?;
            sent += chunk.row_count() as u64;
            self.transport.apply_chunk(&chunk)?;
            if chunk.done {
                break;
            }
        }
        debug!(received, sent, "streamed rows");

        {
            let mut stats = self.stats.write();
            stats.graves_sent += sent_graves;
            stats.graves_received += remote_graves.len() as u64;
            stats.objects_sent += changes.object_count() as u64;
            stats.rows_received += received;
            stats.rows_sent += sent;
        }

        self.set_state(SyncState::Verifying);
        let digest = store.sanity_digest()?;
        let verdict = self
            .transport
            .sanity_check(&SanityRequest { client: digest })?;
        if verdict.status != SanityStatus::Ok {
            return Ok(SyncOutcome::SanityCheckError {
                client: verdict.client,
                server: verdict.server,
            });
        }

        self.set_state(SyncState::Finalizing);
        let finish = self.transport.finish()?;
        if finish.mtime == 0 {
            return Ok(SyncOutcome::FinishError);
        }
        store.finish_sync(finish.mtime, window.next_usn())?;
        Ok(SyncOutcome::Success)
    }

    fn rollback(&self, store: &RecordStore) {
        if let Err(err) = store.rollback_to(SAVEPOINT) {
            warn!(error = %err, "local rollback failed");
        }
        if let Err(err) = self.transport.abort() {
            warn!(error = %err, "peer abort failed");
        }
    }

    fn maintain(&self, store: &RecordStore) {
        if !self.config.maintenance {
            return;
        }
        if let Err(err) = store.maintain(self.config.vacuum) {
            warn!(error = %err, "maintenance failed");
        }
    }
}
