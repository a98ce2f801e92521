//! Cross-process locking for `<data_dir>/engine.lock`, adapted from the
//! teacher's `WorkspaceLock` (advisory `fd-lock` read/write guards). Guards
//! against two BeTrace processes pointed at the same `data_dir`
//! concurrently running structural mutations against the Rule Store.
//! In-process structural mutation serialization (§5) is a plain
//! `parking_lot::RwLock` owned by each store, not this type.

use std::fs::File;
use std::path::{Path, PathBuf};

use fd_lock::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("{operation}: another BeTrace process holds the engine lock")]
    Locked { operation: &'static str },

    #[error("io error opening lock file: {0}")]
    Io(#[from] std::io::Error),
}

pub struct EngineLock {
    lock_file: RwLock<File>,
    lock_path: PathBuf,
}

impl EngineLock {
    /// Opens (creating if absent) `<data_dir>/engine.lock`.
    pub fn new(data_dir: &Path) -> Result<Self, LockError> {
        let lock_path = data_dir.join("engine.lock");
        let file = File::create(&lock_path)?;
        Ok(Self {
            lock_file: RwLock::new(file),
            lock_path,
        })
    }

    /// Shared read lock (non-blocking): used by `list`/`get`/`query`.
    pub fn read(&mut self) -> Result<fd_lock::RwLockReadGuard<'_, File>, LockError> {
        self.lock_file
            .try_read()
            .map_err(|_| LockError::Locked { operation: "read" })
    }

    /// Exclusive write lock (non-blocking): used by `create`/`update`/
    /// `delete`/`enable`/`disable`.
    pub fn write(&mut self) -> Result<fd_lock::RwLockWriteGuard<'_, File>, LockError> {
        self.lock_file
            .try_write()
            .map_err(|_| LockError::Locked { operation: "write" })
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}
