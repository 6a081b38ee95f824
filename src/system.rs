//! SnapshotSystem — the explicit engine context.
//!
//! One system per project root and run:
//! - `open(config)` -> tests (`test_start` / `test_finish` / `test_failed`) -> `finished_all_tests()` -> `close()`
//! - opening a root that is already open, or using a closed system, is a lifecycle error
//! - per test-file progress contexts are created on first use
//!
//! Source rewriting (inline literals, `_TODO` stubs, `selfieonce` removal) happens only in
//! `finished_all_tests`, under the `.selfie.lock` file lock.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, info};

use crate::call::CallStack;
use crate::comment_tracker::CommentTracker;
use crate::config::SelfieConfig;
use crate::error::SelfieError;
use crate::fs::{DiskFs, Fs};
use crate::layout::SnapshotFileLayout;
use crate::literals::LiteralValue;
use crate::lock::acquire_exclusive_lock;
use crate::metrics;
use crate::mode::Mode;
use crate::progress::{FileOutcome, Phase, SnapshotFileProgress};
use crate::snapshot::Snapshot;
use crate::source_file::SourceFile;
use crate::write_tracker::{verify_source_literal, InlineWriteTracker, ToBeFileWriteTracker};

static OPEN_ROOTS: Mutex<BTreeSet<PathBuf>> = Mutex::new(BTreeSet::new());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SystemState {
    Open,
    Finished,
    Closed,
}

/// Summary of `finished_all_tests`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuiteReport {
    pub snapshot_files_written: usize,
    pub snapshot_files_deleted: usize,
    pub source_files_rewritten: usize,
    pub once_comments_removed: usize,
}

pub struct SnapshotSystem {
    config: SelfieConfig,
    layout: Arc<SnapshotFileLayout>,
    comments: CommentTracker,
    inline_writes: InlineWriteTracker,
    to_be_file_writes: ToBeFileWriteTracker,
    progress: Mutex<BTreeMap<PathBuf, Arc<SnapshotFileProgress>>>,
    written_paths: Mutex<BTreeSet<PathBuf>>,
    state: Mutex<SystemState>,
}

impl SnapshotSystem {
    pub fn open(config: SelfieConfig) -> Result<Arc<Self>> {
        Self::open_with_fs(config, Arc::new(DiskFs))
    }

    pub fn open_with_fs(config: SelfieConfig, fs: Arc<dyn Fs>) -> Result<Arc<Self>> {
        let config = config.build();
        {
            let mut roots = OPEN_ROOTS.lock().unwrap_or_else(|e| e.into_inner());
            if !roots.insert(config.root_folder.clone()) {
                return Err(SelfieError::Lifecycle(format!(
                    "a snapshot system is already open for {}",
                    config.root_folder.display()
                ))
                .into());
            }
        }
        info!(
            "selfie open: root={} mode={}",
            config.root_folder.display(),
            config.mode
        );
        let layout = Arc::new(SnapshotFileLayout::new(&config, fs));
        Ok(Arc::new(Self {
            config,
            layout,
            comments: CommentTracker::new(),
            inline_writes: InlineWriteTracker::new(),
            to_be_file_writes: ToBeFileWriteTracker::new(),
            progress: Mutex::new(BTreeMap::new()),
            written_paths: Mutex::new(BTreeSet::new()),
            state: Mutex::new(SystemState::Open),
        }))
    }

    /// Releases the root. Closing twice is a lifecycle error.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SystemState::Closed {
            return Err(SelfieError::Lifecycle("snapshot system closed twice".into()).into());
        }
        if *state == SystemState::Open {
            debug!("selfie closed before finished_all_tests; no sources were rewritten");
        }
        *state = SystemState::Closed;
        self.release_root();
        info!("selfie closed: root={}", self.config.root_folder.display());
        Ok(())
    }

    fn release_root(&self) {
        let mut roots = OPEN_ROOTS.lock().unwrap_or_else(|e| e.into_inner());
        roots.remove(&self.config.root_folder);
    }

    fn ensure_open(&self) -> Result<()> {
        match *self.state.lock().unwrap_or_else(|e| e.into_inner()) {
            SystemState::Open => Ok(()),
            SystemState::Finished => Err(SelfieError::Lifecycle(
                "snapshot system used after finished_all_tests".into(),
            )
            .into()),
            SystemState::Closed => {
                Err(SelfieError::Lifecycle("snapshot system used after close".into()).into())
            }
        }
    }

    pub fn config(&self) -> &SelfieConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.config.mode
    }

    pub fn layout(&self) -> &SnapshotFileLayout {
        &self.layout
    }

    pub fn fs(&self) -> &dyn Fs {
        self.layout.fs()
    }

    pub fn comments(&self) -> &CommentTracker {
        &self.comments
    }

    /// See `Mode::can_write`.
    pub fn can_write(&self, is_todo: bool, call: &CallStack) -> Result<bool> {
        self.mode()
            .can_write(is_todo, call, &self.comments, &self.layout)
    }

    fn progress_for(&self, file: &Path) -> Arc<SnapshotFileProgress> {
        let mut map = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(file.to_path_buf())
            .or_insert_with(|| {
                Arc::new(SnapshotFileProgress::new(
                    self.layout.clone(),
                    self.mode(),
                    file,
                ))
            })
            .clone()
    }

    // ----- test lifecycle -----

    pub fn planning_to_run<I, S>(&self, file: impl AsRef<Path>, tests: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ensure_open()?;
        self.progress_for(file.as_ref()).planning_to_run(tests)
    }

    pub fn test_start(self: &Arc<Self>, file: impl AsRef<Path>, test: &str) -> Result<TestDisk> {
        self.ensure_open()?;
        let progress = self.progress_for(file.as_ref());
        progress.test_start(test)?;
        Ok(TestDisk {
            system: self.clone(),
            progress,
            test: test.to_string(),
        })
    }

    pub fn test_finish(&self, file: impl AsRef<Path>, test: &str) -> Result<()> {
        self.ensure_open()?;
        self.progress_for(file.as_ref()).test_finish(test, false)
    }

    pub fn test_failed(&self, file: impl AsRef<Path>, test: &str) -> Result<()> {
        self.ensure_open()?;
        self.progress_for(file.as_ref()).test_finish(test, true)
    }

    /// Runs `body` as test `test` of `file`; a returned error marks the test failed.
    pub fn run_test<T, F>(self: &Arc<Self>, file: impl AsRef<Path>, test: &str, body: F) -> Result<T>
    where
        F: FnOnce(&TestDisk) -> Result<T>,
    {
        let file = file.as_ref();
        let disk = self.test_start(file, test)?;
        match body(&disk) {
            Ok(v) => {
                self.test_finish(file, test)?;
                Ok(v)
            }
            Err(e) => {
                self.test_failed(file, test)?;
                Err(e)
            }
        }
    }

    /// Ends one test file early (its snapshot file is written now, not at suite end).
    pub fn finished_file(&self, file: impl AsRef<Path>) -> Result<FileOutcome> {
        self.ensure_open()?;
        let outcome = self.progress_for(file.as_ref()).finish_file()?;
        if outcome == FileOutcome::Written {
            self.mark_path_as_written(self.layout.snapshot_path_for(file.as_ref()));
        }
        Ok(outcome)
    }

    /// Finishes every file that is still open, then rewrites sources. Must be called exactly once.
    pub fn finished_all_tests(&self) -> Result<SuiteReport> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            match *state {
                SystemState::Open => *state = SystemState::Finished,
                SystemState::Finished => {
                    return Err(SelfieError::Lifecycle(
                        "finished_all_tests() was called more than once".into(),
                    )
                    .into())
                }
                SystemState::Closed => {
                    return Err(
                        SelfieError::Lifecycle("snapshot system used after close".into()).into(),
                    )
                }
            }
        }

        let mut report = SuiteReport::default();
        let pending: Vec<Arc<SnapshotFileProgress>> = {
            let map = self.progress.lock().unwrap_or_else(|e| e.into_inner());
            map.values()
                .filter(|p| p.phase() != Phase::Terminated)
                .cloned()
                .collect()
        };
        for progress in pending {
            match progress.finish_file()? {
                FileOutcome::Written => {
                    report.snapshot_files_written += 1;
                    self.mark_path_as_written(progress.snapshot_path().to_path_buf());
                }
                FileOutcome::Deleted => report.snapshot_files_deleted += 1,
                FileOutcome::Unchanged => {}
            }
        }

        if self.mode() != Mode::Readonly {
            let _guard = acquire_exclusive_lock(self.layout.root_folder())?;
            for path in self.comments.paths_with_once() {
                let content = self.fs().file_read(&path)?;
                let mut source = SourceFile::new(&path.to_string_lossy(), &content)?;
                let removed = source.remove_selfie_once_comments();
                if removed > 0 {
                    self.fs().file_write(&path, &source.as_string())?;
                    metrics::record_once_comments_removed(removed);
                    info!("removed {} selfieonce comment(s) from {}", removed, path.display());
                    report.once_comments_removed += removed;
                }
            }
            if self.inline_writes.has_writes() {
                report.source_files_rewritten = self.inline_writes.persist_writes(&self.layout)?;
            }
        }
        info!(
            "selfie finished: {} written, {} deleted, {} sources rewritten",
            report.snapshot_files_written, report.snapshot_files_deleted, report.source_files_rewritten
        );
        Ok(report)
    }

    // ----- writes -----

    /// Records an inline literal write; the source is rewritten at suite end.
    pub fn write_inline(&self, literal: LiteralValue, call: &CallStack) -> Result<()> {
        self.ensure_open()?;
        self.inline_writes
            .record(call, &literal, self.layout.allow_multiple_equivalent_writes())?;
        if literal.expected.is_some() {
            let path = self.layout.source_path_for_call(&call.location);
            let content = self.fs().file_read(&path)?;
            let mut source = SourceFile::new(&path.to_string_lossy(), &content)?;
            verify_source_literal(&mut source, call, &literal)?;
        }
        Ok(())
    }

    /// Records the write, then writes `data` to `path` (relative paths resolve against the root).
    pub fn write_to_be_file(&self, path: &Path, data: &[u8], call: &CallStack) -> Result<()> {
        self.ensure_open()?;
        let path = self.layout.resolve(path);
        self.to_be_file_writes.record(
            path.clone(),
            data,
            call,
            self.layout.allow_multiple_equivalent_writes(),
        )?;
        self.fs().file_write_binary(&path, data)?;
        debug!("wrote {} bytes to {}", data.len(), path.display());
        self.mark_path_as_written(path);
        Ok(())
    }

    pub fn mark_path_as_written(&self, path: PathBuf) {
        let mut written = self.written_paths.lock().unwrap_or_else(|e| e.into_inner());
        written.insert(path);
    }

    /// Every file this run wrote (snapshot files and `to_be_file` targets).
    pub fn written_paths(&self) -> Vec<PathBuf> {
        let written = self.written_paths.lock().unwrap_or_else(|e| e.into_inner());
        written.iter().cloned().collect()
    }
}

impl Drop for SnapshotSystem {
    fn drop(&mut self) {
        let state = *self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state != SystemState::Closed {
            self.release_root();
        }
    }
}

// ----- disk storage -----

/// Storage of one running test: reads and writes keys `test` / `test/sub` of its snapshot file.
pub trait DiskStorage {
    fn read_disk(&self, sub: &str, call: &CallStack) -> Result<Option<Snapshot>>;

    fn write_disk(&self, actual: &Snapshot, sub: &str, call: &CallStack) -> Result<()>;

    /// `None` keeps every snapshot of the test.
    fn keep(&self, sub: Option<&str>) -> Result<()>;
}

pub struct TestDisk {
    system: Arc<SnapshotSystem>,
    progress: Arc<SnapshotFileProgress>,
    test: String,
}

impl TestDisk {
    pub fn system(&self) -> &SnapshotSystem {
        &self.system
    }

    pub fn test_name(&self) -> &str {
        &self.test
    }

    pub fn test_file(&self) -> &Path {
        self.progress.test_file()
    }

    pub fn snapshot_path(&self) -> &Path {
        self.progress.snapshot_path()
    }

    pub fn snapshot_file_exists(&self) -> bool {
        self.progress.snapshot_file_exists()
    }
}

impl DiskStorage for TestDisk {
    fn read_disk(&self, sub: &str, call: &CallStack) -> Result<Option<Snapshot>> {
        self.system.ensure_open()?;
        let found = self.progress.read(&self.test, sub)?;
        debug!("read_disk {}[{}] at {}: {}", self.test, sub, call, found.is_some());
        Ok(found)
    }

    fn write_disk(&self, actual: &Snapshot, sub: &str, call: &CallStack) -> Result<()> {
        self.system.ensure_open()?;
        self.progress.write(&self.test, sub, actual, call)
    }

    fn keep(&self, sub: Option<&str>) -> Result<()> {
        self.system.ensure_open()?;
        self.progress.keep(&self.test, sub)
    }
}
