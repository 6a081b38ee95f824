//! Per test-file progress: which tests ran, which snapshot keys they touched, and the
//! lazily loaded snapshot file.
//!
//! State machine:
//! - NotStarted -> InProgress(test) -> Idle -> InProgress(next) -> ... -> Terminated
//! - at most one test in progress per file; a terminated context accepts nothing
//!
//! The mutex guards only in-memory state; file I/O happens outside of it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::call::CallStack;
use crate::error::SelfieError;
use crate::fs::remove_dir_if_empty;
use crate::gc::{find_stale_snapshots_within, WithinTestGC};
use crate::layout::SnapshotFileLayout;
use crate::metrics;
use crate::mode::Mode;
use crate::ordered_map::OrderedMap;
use crate::snapshot::Snapshot;
use crate::snapshot_file::SnapshotFile;
use crate::write_tracker::DiskWriteTracker;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    NotStarted,
    InProgress(String),
    Idle,
    Terminated,
}

/// What `finish_file` did with the snapshot file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileOutcome {
    Unchanged,
    Written,
    Deleted,
}

/// Key of a (test, sub) pair inside the snapshot file.
pub fn snapshot_key(test: &str, sub: &str) -> String {
    if sub.is_empty() {
        test.to_string()
    } else {
        format!("{}/{}", test, sub)
    }
}

fn suffix(sub: &str) -> String {
    if sub.is_empty() {
        String::new()
    } else {
        format!("/{}", sub)
    }
}

struct ProgressState {
    phase: Phase,
    file: Option<Arc<SnapshotFile>>,
    tests: BTreeMap<String, WithinTestGC>,
    known_tests: Option<BTreeSet<String>>,
    has_failed: bool,
}

pub struct SnapshotFileProgress {
    layout: Arc<SnapshotFileLayout>,
    mode: Mode,
    test_file: PathBuf,
    snapshot_path: PathBuf,
    disk_writes: DiskWriteTracker,
    state: Mutex<ProgressState>,
}

impl SnapshotFileProgress {
    pub fn new(layout: Arc<SnapshotFileLayout>, mode: Mode, test_file: &Path) -> Self {
        let snapshot_path = layout.snapshot_path_for(test_file);
        Self {
            layout,
            mode,
            test_file: test_file.to_path_buf(),
            snapshot_path,
            disk_writes: DiskWriteTracker::new(),
            state: Mutex::new(ProgressState {
                phase: Phase::NotStarted,
                file: None,
                tests: BTreeMap::new(),
                known_tests: None,
                has_failed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn test_file(&self) -> &Path {
        &self.test_file
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase.clone()
    }

    pub fn snapshot_file_exists(&self) -> bool {
        self.layout.fs().file_exists(&self.snapshot_path)
    }

    fn lifecycle(&self, msg: String) -> anyhow::Error {
        SelfieError::Lifecycle(format!("{}: {}", self.test_file.display(), msg)).into()
    }

    /// Declares every test of the file. Only with this list can the GC tell a test that
    /// was filtered out of the run from a test that no longer exists.
    pub fn planning_to_run<I, S>(&self, tests: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut st = self.lock();
        if st.phase == Phase::Terminated {
            return Err(self.lifecycle("planning_to_run after the file finished".into()));
        }
        let known = st.known_tests.get_or_insert_with(BTreeSet::new);
        known.extend(tests.into_iter().map(Into::into));
        Ok(())
    }

    pub fn test_start(&self, test: &str) -> Result<()> {
        if test.contains('/') {
            return Err(SelfieError::invalid(format!(
                "Test name must not contain '/': `{}`",
                test
            ))
            .into());
        }
        let mut st = self.lock();
        match &st.phase {
            Phase::Terminated => {
                return Err(self.lifecycle(format!("test `{}` started after the file finished", test)))
            }
            Phase::InProgress(running) => {
                return Err(self.lifecycle(format!(
                    "test `{}` started while `{}` is still in progress",
                    test, running
                )))
            }
            Phase::NotStarted | Phase::Idle => {}
        }
        st.phase = Phase::InProgress(test.to_string());
        st.tests.entry(test.to_string()).or_default();
        debug!("test start {}::{}", self.test_file.display(), test);
        Ok(())
    }

    pub fn test_finish(&self, test: &str, failed: bool) -> Result<()> {
        let mut st = self.lock();
        if st.phase != Phase::InProgress(test.to_string()) {
            return Err(self.lifecycle(format!(
                "test `{}` finished but it was not in progress ({:?})",
                test, st.phase
            )));
        }
        if failed {
            st.has_failed = true;
            if let Some(gc) = st.tests.get_mut(test) {
                gc.keep_all();
            }
        }
        st.phase = Phase::Idle;
        debug!(
            "test {} {}::{}",
            if failed { "failed" } else { "passed" },
            self.test_file.display(),
            test
        );
        Ok(())
    }

    fn check_in_progress(&self, st: &ProgressState, test: &str) -> Result<()> {
        match &st.phase {
            Phase::InProgress(running) if running == test => Ok(()),
            other => Err(self.lifecycle(format!("test `{}` is not in progress ({:?})", test, other))),
        }
    }

    /// `None` keeps every snapshot of the test.
    pub fn keep(&self, test: &str, sub: Option<&str>) -> Result<()> {
        let mut st = self.lock();
        self.check_in_progress(&st, test)?;
        if let Some(gc) = st.tests.get_mut(test) {
            match sub {
                None => gc.keep_all(),
                Some(sub) => gc.keep_suffix(&suffix(sub)),
            }
        }
        Ok(())
    }

    pub fn read(&self, test: &str, sub: &str) -> Result<Option<Snapshot>> {
        self.check_in_progress(&self.lock(), test)?;
        let file = self.file()?;
        let snapshot = file.get(&snapshot_key(test, sub));
        if snapshot.is_some() {
            if let Some(gc) = self.lock().tests.get_mut(test) {
                gc.keep_suffix(&suffix(sub));
            }
        }
        Ok(snapshot)
    }

    pub fn write(&self, test: &str, sub: &str, snapshot: &Snapshot, call: &CallStack) -> Result<()> {
        self.check_in_progress(&self.lock(), test)?;
        let key = snapshot_key(test, sub);
        self.disk_writes
            .record(&key, snapshot, call, self.layout.allow_multiple_equivalent_writes())?;
        if let Some(gc) = self.lock().tests.get_mut(test) {
            gc.keep_suffix(&suffix(sub));
        }
        self.file()?.set_at_test_time(&key, snapshot.clone());
        metrics::record_disk_write();
        Ok(())
    }

    /// Loads the snapshot file on first use. The read happens without the lock; if two
    /// threads race, the first installed copy wins.
    fn file(&self) -> Result<Arc<SnapshotFile>> {
        if let Some(file) = &self.lock().file {
            return Ok(file.clone());
        }
        let fs = self.layout.fs();
        let loaded = if fs.file_exists(&self.snapshot_path) {
            let content = fs.file_read(&self.snapshot_path)?;
            SnapshotFile::parse_str(&content)
                .with_context(|| format!("parse {}", self.snapshot_path.display()))?
        } else {
            SnapshotFile::create_empty_with_unix_newlines(self.layout.unix_newlines())
        };
        let mut st = self.lock();
        Ok(st.file.get_or_insert_with(|| Arc::new(loaded)).clone())
    }

    /// Runs the stale-snapshot GC and writes, rewrites or deletes the snapshot file.
    pub fn finish_file(&self) -> Result<FileOutcome> {
        let (file, tests, known, has_failed) = {
            let mut st = self.lock();
            match &st.phase {
                Phase::Terminated => return Err(self.lifecycle("file finished twice".into())),
                Phase::InProgress(running) => {
                    return Err(self.lifecycle(format!(
                        "file finished while `{}` is still in progress",
                        running
                    )))
                }
                Phase::NotStarted | Phase::Idle => {}
            }
            st.phase = Phase::Terminated;
            (
                st.file.take(),
                std::mem::take(&mut st.tests),
                st.known_tests.take(),
                st.has_failed,
            )
        };
        match file {
            Some(file) => self.finish_loaded(&file, tests, known),
            None => self.finish_unread(&tests, known.as_ref(), has_failed),
        }
    }

    fn finish_loaded(
        &self,
        file: &SnapshotFile,
        tests: BTreeMap<String, WithinTestGC>,
        known: Option<BTreeSet<String>>,
    ) -> Result<FileOutcome> {
        let snapshots = file.snapshots();
        let didnt_run: Vec<String> = match known {
            Some(known) => known.into_iter().filter(|t| !tests.contains_key(t)).collect(),
            // without a test list, any root we did not see run is assumed to exist
            None => snapshots
                .keys()
                .map(|k| k.split('/').next().unwrap_or_default().to_string())
                .filter(|root| !tests.contains_key(root))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let ran = OrderedMap::of(tests)?;
        let stale = find_stale_snapshots_within(&snapshots, &ran, didnt_run);

        if self.mode == Mode::Readonly {
            if !stale.is_empty() {
                warn!(
                    "{} has {} stale snapshot(s), left alone in readonly mode",
                    self.snapshot_path.display(),
                    stale.len()
                );
            }
            return Ok(FileOutcome::Unchanged);
        }

        if !stale.is_empty() {
            file.remove_all_indices(&stale)?;
            metrics::record_stale_entries_pruned(stale.len());
            info!(
                "pruned {} stale snapshot(s) from {}",
                stale.len(),
                self.snapshot_path.display()
            );
        }
        if stale.is_empty() && !file.was_set_at_test_time() {
            return Ok(FileOutcome::Unchanged);
        }
        if file.is_empty() {
            self.delete_snapshot_file()?;
            return Ok(FileOutcome::Deleted);
        }
        self.layout
            .fs()
            .file_write(&self.snapshot_path, &file.serialize_to_string())?;
        metrics::record_snapshot_file_written();
        info!("wrote {}", self.snapshot_path.display());
        Ok(FileOutcome::Written)
    }

    fn finish_unread(
        &self,
        tests: &BTreeMap<String, WithinTestGC>,
        known: Option<&BTreeSet<String>>,
        has_failed: bool,
    ) -> Result<FileOutcome> {
        if self.mode == Mode::Readonly || has_failed {
            return Ok(FileOutcome::Unchanged);
        }
        let all_ran = match known {
            Some(known) => known.iter().all(|t| tests.contains_key(t)),
            None => false,
        };
        let used_none = tests.values().all(WithinTestGC::succeeded_and_used_no_snapshots);
        if all_ran && used_none && self.snapshot_file_exists() {
            self.delete_snapshot_file()?;
            return Ok(FileOutcome::Deleted);
        }
        Ok(FileOutcome::Unchanged)
    }

    fn delete_snapshot_file(&self) -> Result<()> {
        if !self.snapshot_file_exists() {
            return Ok(());
        }
        self.layout.fs().delete(&self.snapshot_path)?;
        metrics::record_snapshot_file_deleted();
        info!("deleted {}", self.snapshot_path.display());
        if let Some(dir) = self.layout.dedicated_snapshot_folder(&self.snapshot_path) {
            if remove_dir_if_empty(&dir)? {
                debug!("removed empty snapshot folder {}", dir.display());
            }
        }
        Ok(())
    }
}
