//! File-based locking for the native store directory.
//!
//! Cross-platform (fs2) advisory locks:
//! - Exclusive: writer (KV sink, import, serve).
//! - Shared: read-only dump source; несколько читателей могут держать lock одновременно.
//!
//! Lock file path: <root>/LOCK
//! Lock is released on Drop. Занятый lock не ждём: try-lock и Storage-ошибка.

use fs2::FileExt;
use log::debug;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
    mode: LockMode,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // ошибки unlock на drop игнорируем
        let _ = FileExt::unlock(&self.file);
        debug!("lock released: {} ({:?})", self.path.display(), self.mode);
    }
}

pub fn lock_file_path(root: &Path) -> PathBuf {
    root.join("LOCK")
}

/// Try to acquire a lock in the requested mode. Returns Err if already locked.
pub fn try_acquire_lock(root: &Path, mode: LockMode) -> Result<LockGuard> {
    let path = lock_file_path(root);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .io_context(|| format!("open lock file {}", path.display()))?;

    match mode {
        LockMode::Shared => FileExt::try_lock_shared(&file)
            .io_context(|| format!("store is busy (shared lock): {}", path.display()))?,
        LockMode::Exclusive => FileExt::try_lock_exclusive(&file)
            .io_context(|| format!("store is busy (exclusive lock): {}", path.display()))?,
    }
    Ok(LockGuard { file, path, mode })
}
