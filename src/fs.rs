//! Filesystem seam.
//!
//! Everything the engine reads or writes goes through `Fs`, so tests can point the whole
//! system at a scratch directory. `DiskFs` writes atomically via tmp+rename.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use walkdir::WalkDir;

pub trait Fs: Send + Sync {
    fn file_exists(&self, path: &Path) -> bool;

    fn file_read(&self, path: &Path) -> Result<String>;

    fn file_read_binary(&self, path: &Path) -> Result<Vec<u8>>;

    fn file_write(&self, path: &Path, content: &str) -> Result<()> {
        self.file_write_binary(path, content.as_bytes())
    }

    fn file_write_binary(&self, path: &Path, content: &[u8]) -> Result<()>;

    /// Deletes a file; a missing file is not an error.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Every regular file under `root`, sorted.
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DiskFs;

impl Fs for DiskFs {
    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
    }

    fn file_read_binary(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("read {}", path.display()))
    }

    fn file_write_binary(&self, path: &Path, content: &[u8]) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).with_context(|| format!("create_dir_all {}", dir.display()))?;
            }
        }
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)
                .with_context(|| format!("open {}", tmp.display()))?;
            f.write_all(content)
                .with_context(|| format!("write {}", tmp.display()))?;
            f.sync_all()
                .with_context(|| format!("fsync {}", tmp.display()))?;
        }
        fs::rename(&tmp, path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_entry(|e| !skipped_dir(e)) {
            let entry = entry.with_context(|| format!("walk {}", root.display()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Removes `dir` if it exists and is empty. Returns true when it was removed.
pub fn remove_dir_if_empty(dir: &Path) -> Result<bool> {
    let mut entries = match fs::read_dir(dir) {
        Ok(it) => it,
        Err(_) => return Ok(false),
    };
    if entries.next().is_some() {
        return Ok(false);
    }
    fs::remove_dir(dir).with_context(|| format!("remove_dir {}", dir.display()))?;
    Ok(true)
}

fn skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "target" || name == "node_modules"
}

/// Newline convention of the project: the first text file under `root` containing a
/// newline decides. Defaults to unix when nothing conclusive is found.
pub fn infer_unix_newlines(root: &Path) -> bool {
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !skipped_dir(e));
    for entry in walker.flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let content = match fs::read_to_string(entry.path()) {
            Ok(s) => s,
            Err(_) => continue,
        };
        if let Some(idx) = content.find('\n') {
            let unix = idx == 0 || content.as_bytes()[idx - 1] != b'\r';
            debug!(
                "newlines inferred from {}: {}",
                entry.path().display(),
                if unix { "unix" } else { "windows" }
            );
            return unix;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("selfie-fs-{}-{}-{}", name, std::process::id(), nanos))
    }

    #[test]
    fn write_creates_parents_and_leaves_no_tmp() -> Result<()> {
        let root = scratch("write");
        let path = root.join("a/b/c.ss");
        DiskFs.file_write(&path, "hello\n")?;
        assert_eq!(DiskFs.file_read(&path)?, "hello\n");
        assert!(!root.join("a/b/c.ss.tmp").exists());
        DiskFs.delete(&path)?;
        DiskFs.delete(&path)?;
        assert!(remove_dir_if_empty(&root.join("a/b"))?);
        let _ = fs::remove_dir_all(&root);
        Ok(())
    }

    #[test]
    fn binary_overwrite_is_synced_and_failures_carry_context() -> Result<()> {
        let root = scratch("sync");
        let path = root.join("blob.bin");
        DiskFs.file_write_binary(&path, &[1, 2, 3])?;
        DiskFs.file_write_binary(&path, &[9])?;
        assert_eq!(DiskFs.file_read_binary(&path)?, vec![9]);
        assert!(!root.join("blob.bin.tmp").exists());

        // родитель - обычный файл: ошибка должна дойти до вызывающего
        let err = DiskFs
            .file_write_binary(&path.join("child.bin"), b"x")
            .unwrap_err();
        assert!(format!("{:#}", err).contains("blob.bin"), "{:#}", err);
        let _ = fs::remove_dir_all(&root);
        Ok(())
    }

    #[test]
    fn infers_windows_newlines_and_skips_hidden() -> Result<()> {
        let root = scratch("infer");
        DiskFs.file_write(&root.join(".git/HEAD"), "ref\n")?;
        DiskFs.file_write(&root.join("src/lib.rs"), "fn a() {}\r\n")?;
        assert!(!infer_unix_newlines(&root));
        assert!(infer_unix_newlines(&root.join("missing")));
        let walked = DiskFs.walk(&root)?;
        assert_eq!(walked, vec![root.join("src/lib.rs")]);
        let _ = fs::remove_dir_all(&root);
        Ok(())
    }
}
