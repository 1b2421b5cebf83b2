//! File-based locking for the embedded store directory.
//!
//! Cross-platform (fs2) advisory locks on <root>/LOCK:
//! - Exclusive: the single ingest writer.
//! - Shared: serving readers; any number may coexist, none while a writer holds the lock.
//!
//! Both are non-blocking: a held lock is reported as `LockBusy`, never waited on.
//! Lock is released on Drop.

use fs2::FileExt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::LOCK_FILE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub enum LockFailure {
    /// Someone else holds a conflicting lock.
    LockBusy(PathBuf),
    Io(io::Error),
}

#[derive(Debug)]
pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn lock_file_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

/// Try to take the store lock in `mode`.
pub fn try_acquire_lock(root: &Path, mode: LockMode) -> Result<LockGuard, LockFailure> {
    let path = lock_file_path(root);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(LockFailure::Io)?;
    let res = match mode {
        // fs2 trait calls; File has same-named inherent methods with another error type
        LockMode::Shared => FileExt::try_lock_shared(&file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
    };
    match res {
        Ok(()) => Ok(LockGuard { file, path, mode }),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(LockFailure::LockBusy(path)),
        Err(e) => Err(LockFailure::Io(e)),
    }
}
