//! Advisory lock around source rewriting.
//!
//! Two test binaries of one crate may finish at the same time and both rewrite sources;
//! the exclusive fs2 lock on `<root>/.selfie.lock` serialises them.
//! Lock is released on Drop.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = ".selfie.lock";

pub struct LockGuard {
    file: std::fs::File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open_lock_file(root: &Path) -> Result<(std::fs::File, PathBuf)> {
    std::fs::create_dir_all(root).with_context(|| format!("create_dir_all {}", root.display()))?;
    let path = root.join(LOCK_FILE);
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&path)
        .with_context(|| format!("open lock file {}", path.display()))?;
    Ok((f, path))
}

/// Blocks until the lock is held.
pub fn acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(root)?;
    file.lock_exclusive()
        .with_context(|| format!("lock_exclusive {}", path.display()))?;
    Ok(LockGuard { file, path })
}

/// Returns Err if someone else holds the lock.
pub fn try_acquire_exclusive_lock(root: &Path) -> Result<LockGuard> {
    let (file, path) = open_lock_file(root)?;
    file.try_lock_exclusive()
        .with_context(|| format!("try_lock_exclusive failed: {}", path.display()))?;
    Ok(LockGuard { file, path })
}
