//! Where snapshot files live relative to the test sources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::call::CallLocation;
use crate::config::SelfieConfig;
use crate::fs::Fs;

pub const SNAPSHOT_EXT: &str = "ss";

pub struct SnapshotFileLayout {
    root_folder: PathBuf,
    snapshot_folder_name: Option<String>,
    allow_multiple_equivalent_writes: bool,
    unix_newlines: bool,
    fs: Arc<dyn Fs>,
}

impl SnapshotFileLayout {
    /// `config` should already be built (newline convention resolved); an unresolved
    /// convention falls back to unix.
    pub fn new(config: &SelfieConfig, fs: Arc<dyn Fs>) -> Self {
        Self {
            root_folder: config.root_folder.clone(),
            snapshot_folder_name: config.snapshot_folder_name.clone(),
            allow_multiple_equivalent_writes: config.allow_multiple_equivalent_writes,
            unix_newlines: config.unix_newlines.unwrap_or(true),
            fs,
        }
    }

    pub fn fs(&self) -> &dyn Fs {
        self.fs.as_ref()
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn unix_newlines(&self) -> bool {
        self.unix_newlines
    }

    pub fn allow_multiple_equivalent_writes(&self) -> bool {
        self.allow_multiple_equivalent_writes
    }

    /// Absolute paths are kept, relative ones (what `file!()` reports) are joined to the root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_folder.join(path)
        }
    }

    pub fn source_path_for_call(&self, call: &CallLocation) -> PathBuf {
        self.resolve(call.path())
    }

    /// `<dir>/[folder/]<stem>.ss` for the test source `source`.
    pub fn snapshot_path_for(&self, source: &Path) -> PathBuf {
        let source = self.resolve(source);
        let dir = source.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = match &self.snapshot_folder_name {
            Some(folder) => dir.join(folder),
            None => dir,
        };
        dir.join(format!("{}.{}", stem, SNAPSHOT_EXT))
    }

    /// The folder holding snapshot files, when it is a dedicated one.
    pub fn dedicated_snapshot_folder(&self, snapshot_path: &Path) -> Option<PathBuf> {
        self.snapshot_folder_name
            .as_ref()
            .and_then(|_| snapshot_path.parent().map(Path::to_path_buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::DiskFs;

    #[test]
    fn snapshot_path_sits_next_to_source_or_in_folder() {
        let cfg = SelfieConfig::default()
            .with_root_folder("/proj")
            .with_unix_newlines(Some(true));
        let layout = SnapshotFileLayout::new(&cfg, Arc::new(DiskFs));
        assert_eq!(
            layout.snapshot_path_for(Path::new("tests/api.rs")),
            PathBuf::from("/proj/tests/api.ss")
        );
        let cfg = cfg.with_snapshot_folder_name(Some("__snapshots__"));
        let layout = SnapshotFileLayout::new(&cfg, Arc::new(DiskFs));
        let path = layout.snapshot_path_for(Path::new("tests/api.rs"));
        assert_eq!(path, PathBuf::from("/proj/tests/__snapshots__/api.ss"));
        assert_eq!(
            layout.dedicated_snapshot_folder(&path),
            Some(PathBuf::from("/proj/tests/__snapshots__"))
        );
    }
}
