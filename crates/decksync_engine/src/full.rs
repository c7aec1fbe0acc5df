//! Whole-collection transfer, used when the schemas of the two copies
//! have diverged.
//!
//! Received bytes are never applied blindly: they land in a temporary file
//! that must pass `PRAGMA integrity_check` and the structural check before
//! the local store is overwritten.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use decksync_store::RecordStore;
use std::path::Path;
use tracing::{info, warn};

const TEMP_NAME: &str = "collection.anki2";

/// Checks a collection file without taking its lock.
pub fn verify_collection(path: &Path) -> SyncResult<()> {
    let store = RecordStore::open_read_only(path)
        .map_err(|e| SyncError::integrity(format!("cannot open collection: {e}")))?;
    store
        .integrity_check()
        .map_err(|e| SyncError::integrity(e.to_string()))?;
    let problems = store.structural_problems()?;
    if !problems.is_empty() {
        return Err(SyncError::integrity(problems.join("; ")));
    }
    Ok(())
}

/// Serializes the whole store to collection file bytes.
pub fn export_bytes(store: &RecordStore) -> SyncResult<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(TEMP_NAME);
    store.export_to(&path)?;
    Ok(std::fs::read(&path)?)
}

/// Verifies `data` as a collection file and, only if it passes, replaces
/// the content of `store` with it.
pub fn replace_with_bytes(store: &mut RecordStore, data: &[u8]) -> SyncResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(TEMP_NAME);
    std::fs::write(&path, data)?;
    verify_collection(&path)?;
    store.replace_from(&path)?;
    Ok(())
}

/// Replaces the local collection with the peer's.
///
/// On any verification failure the local store is left untouched.
pub fn full_download<T: SyncTransport + ?Sized>(
    transport: &T,
    store: &mut RecordStore,
) -> SyncResult<()> {
    let data = transport.download()?;
    if let Err(err) = replace_with_bytes(store, &data) {
        warn!(error = %err, bytes = data.len(), "rejected downloaded collection");
        return Err(err);
    }
    info!(bytes = data.len(), "full download complete");
    Ok(())
}

/// Replaces the peer's collection with the local one.
///
/// The local store is checked first; nothing is sent if it fails. The
/// uploaded copy has every pending change marked as synced, and so does
/// the local store once the peer accepted it.
pub fn full_upload<T: SyncTransport + ?Sized>(transport: &T, store: &RecordStore) -> SyncResult<()> {
    store
        .integrity_check()
        .map_err(|e| SyncError::integrity(e.to_string()))?;
    let problems = store.structural_problems()?;
    if !problems.is_empty() {
        return Err(SyncError::integrity(problems.join("; ")));
    }

    let dir = tempfile::tempdir()?;
    let path = dir.path().join(TEMP_NAME);
    store.export_to(&path)?;
    {
        let copy = RecordStore::open(&path)?;
        mark_synced(&copy)?;
    }
    let data = std::fs::read(&path)?;

    transport.upload(&data)?;
    store.transaction("full_upload", mark_synced)?;
    info!(bytes = data.len(), "full upload complete");
    Ok(())
}

/// Clears every pending usn and records the schema as synced.
fn mark_synced(store: &RecordStore) -> SyncResult<()> {
    store.clear_pending(0)?;
    store.execute("UPDATE col SET ls = scm", [])?;
    Ok(())
}
