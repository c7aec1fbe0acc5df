//! Advisory lock file for file-backed collections.
//!
//! A collection at `<path>` is guarded by `<path>.lock`. The lock is held for
//! the lifetime of the [`CollectionLock`] and released when it is dropped.

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock on a collection file.
#[derive(Debug)]
pub struct CollectionLock {
    path: PathBuf,
    _file: File,
}

impl CollectionLock {
    /// Acquires the lock for the collection at `collection_path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::CollectionLocked`] if another handle holds it.
    pub fn acquire(collection_path: &Path) -> StoreResult<Self> {
        let path = lock_path(collection_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::CollectionLocked);
        }

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock_path(collection_path: &Path) -> PathBuf {
    let mut name = collection_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
