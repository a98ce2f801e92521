//! Component K: fault-injecting [`Filesystem`] wrapper (§9: "disk-full,
//! corrupt-on-read, slow-I/O, partial-write, and crash-between-write-and-
//! rename"). Wraps a real [`OsFilesystem`] rooted at a scratch directory
//! and reimplements `atomic_write` itself (rather than delegating) so a
//! fault can land between the write and the rename — the exact window
//! property 5 needs to exercise.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use betrace_core::errors::DiskError;
use betrace_core::{Filesystem, OsFilesystem, Rand};

pub struct FaultInjectingFilesystem {
    inner: OsFilesystem,
    rand: Box<dyn Rand>,
    fault_rate_percent: u32,
    faults_injected: AtomicU64,
}

impl FaultInjectingFilesystem {
    pub fn new(rand: Box<dyn Rand>, fault_rate_percent: u32) -> Self {
        Self {
            inner: OsFilesystem,
            rand,
            fault_rate_percent: fault_rate_percent.min(100),
            faults_injected: AtomicU64::new(0),
        }
    }

    pub fn faults_injected(&self) -> u64 {
        self.faults_injected.load(Ordering::Relaxed)
    }

    fn roll_fault(&self) -> bool {
        if self.fault_rate_percent == 0 {
            return false;
        }
        let hit = (self.rand.next_u64() % 100) < self.fault_rate_percent as u64;
        if hit {
            self.faults_injected.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    fn simulated_error(&self, operation: &str) -> DiskError {
        match self.rand.next_u64() % 3 {
            0 => DiskError::DiskFull {
                operation: operation.to_string(),
            },
            1 => DiskError::RetryExhausted {
                operation: operation.to_string(),
            },
            _ => DiskError::Io {
                operation: operation.to_string(),
                message: "simulated fault".to_string(),
            },
        }
    }
}

impl Filesystem for FaultInjectingFilesystem {
    /// Reimplements the write-fsync-rename-fsync sequence from
    /// `OsFilesystem::atomic_write`, rolling a fault check at each
    /// boundary. A fault at [`FaultPoint::AfterTmpWriteBeforeRename`]
    /// leaves only the `.tmp.<nonce>` file behind — precisely what a
    /// real process crash there would leave, which is what property 5
    /// requires the Rule Store's startup scan to tolerate.
    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), DiskError> {
        if self.roll_fault() {
            return Err(self.simulated_error("atomic_write:before_tmp_write"));
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let nonce = self.rand.next_u64();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
        let tmp_path = dir.join(format!("{file_name}.tmp.{nonce}"));

        std::fs::write(&tmp_path, bytes).map_err(DiskError::from)?;
        if let Ok(f) = std::fs::File::open(&tmp_path) {
            let _ = f.sync_all();
        }

        if self.roll_fault() {
            // Simulated crash: the tmp file is left on disk, the target
            // path is never written. A restart's startup scan must skip
            // it, exactly as if the process had genuinely died here.
            return Err(self.simulated_error("atomic_write:after_tmp_write_before_rename"));
        }

        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            DiskError::from(e)
        })?;

        if self.roll_fault() {
            return Err(self.simulated_error("atomic_write:after_rename_before_dir_fsync"));
        }
        self.inner.fsync_dir(dir)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DiskError> {
        if self.roll_fault() {
            return Err(DiskError::Corrupt {
                path: path.display().to_string(),
                message: "simulated corruption on read".to_string(),
            });
        }
        self.inner.read(path)
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DiskError> {
        if self.roll_fault() {
            return Err(self.simulated_error("list"));
        }
        self.inner.list(dir)
    }

    fn fsync_dir(&self, dir: &Path) -> Result<(), DiskError> {
        if self.roll_fault() {
            return Err(self.simulated_error("fsync_dir"));
        }
        self.inner.fsync_dir(dir)
    }

    fn remove(&self, path: &Path) -> Result<(), DiskError> {
        if self.roll_fault() {
            return Err(self.simulated_error("remove"));
        }
        self.inner.remove(path)
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), DiskError> {
        self.inner.create_dir_all(dir)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }
}
