//! Component J: the filesystem capability seam. The Rule Store and
//! Violation Store never touch `std::fs` directly — everything goes
//! through `Filesystem`, so `betrace-sim` can substitute a fault-injecting
//! implementation (disk-full, corrupt-on-read, slow-I/O, partial-write,
//! crash-between-write-and-rename) to drive §8 property 5.

use std::path::{Path, PathBuf};

use crate::errors::DiskError;

pub trait Filesystem: Send + Sync {
    /// Atomic write-rename (§4.E, §9): write to a nonce-suffixed temp path
    /// in the same directory, fsync the file, rename over `path`, fsync
    /// the containing directory. A reader can never observe a partially
    /// written file.
    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), DiskError>;

    fn read(&self, path: &Path) -> Result<Vec<u8>, DiskError>;

    /// Lists entries directly under `dir` whose file name starts with
    /// `prefix` (empty prefix lists everything). Implementations skip
    /// `.tmp.*` aborted-write artifacts themselves is the *caller's*
    /// responsibility (§4.E startup scan) — `list` is a plain directory
    /// listing.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DiskError>;

    fn fsync_dir(&self, dir: &Path) -> Result<(), DiskError>;

    fn remove(&self, path: &Path) -> Result<(), DiskError>;

    fn create_dir_all(&self, dir: &Path) -> Result<(), DiskError>;

    /// Whether `path` is a directory, through the same seam as every
    /// other filesystem query — so a simulated view never has to fall
    /// back to asking the real OS (§9).
    fn is_dir(&self, path: &Path) -> bool;
}

/// Wires directly to the OS filesystem. The only production
/// implementation; `betrace-sim::FaultInjectingFilesystem` wraps it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFilesystem;

impl Filesystem for OsFilesystem {
    fn atomic_write(&self, path: &Path, bytes: &[u8]) -> Result<(), DiskError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let nonce = nonce();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let tmp_path = dir.join(format!("{file_name}.tmp.{nonce}"));

        let mut file = std::fs::File::create(&tmp_path).map_err(DiskError::from)?;
        use std::io::Write;
        file.write_all(bytes).map_err(DiskError::from)?;
        file.sync_all().map_err(DiskError::from)?;
        drop(file);

        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            DiskError::from(e)
        })?;
        self.fsync_dir(dir)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DiskError> {
        std::fs::read(path).map_err(DiskError::from)
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DiskError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(DiskError::from)? {
            let entry = entry.map_err(DiskError::from)?;
            out.push(entry.path());
        }
        out.sort();
        Ok(out)
    }

    fn fsync_dir(&self, dir: &Path) -> Result<(), DiskError> {
        // Not all platforms support opening a directory for fsync
        // (notably Windows); best-effort, matching the teacher's
        // tolerance for fsync being advisory on such platforms.
        if let Ok(dir_file) = std::fs::File::open(dir) {
            let _ = dir_file.sync_all();
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), DiskError> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DiskError::from(e)),
        }
    }

    fn create_dir_all(&self, dir: &Path) -> Result<(), DiskError> {
        std::fs::create_dir_all(dir).map_err(DiskError::from)
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

fn nonce() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let t = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    t ^ COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFilesystem;
        let path = dir.path().join("rule.json");
        fs.atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs.read(&path).unwrap(), b"hello");
    }

    #[test]
    fn atomic_write_leaves_no_tmp_file_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFilesystem;
        let path = dir.path().join("rule.json");
        fs.atomic_write(&path, b"hello").unwrap();
        let entries = fs.list(dir.path()).unwrap();
        assert_eq!(entries, vec![path]);
    }

    #[test]
    fn list_skips_nonexistent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fs = OsFilesystem;
        let missing = dir.path().join("missing");
        assert!(fs.list(&missing).unwrap().is_empty());
    }
}
