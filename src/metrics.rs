//! Lightweight global metrics for the snapshot engine.
//!
//! Потокобезопасные атомарные счётчики:
//! - snapshot files (written / deleted, stale entries pruned)
//! - disk writes recorded by tests
//! - source rewrites (inline literals, `_TODO` stubs, once-comments)
//!
//! Counters are process-wide; tests running in parallel share them, so assert on deltas.

use std::sync::atomic::{AtomicU64, Ordering};

// ----- Snapshot files -----
static SNAPSHOT_FILES_WRITTEN: AtomicU64 = AtomicU64::new(0);
static SNAPSHOT_FILES_DELETED: AtomicU64 = AtomicU64::new(0);
static STALE_ENTRIES_PRUNED: AtomicU64 = AtomicU64::new(0);
static DISK_WRITES_RECORDED: AtomicU64 = AtomicU64::new(0);

// ----- Source rewrites -----
static INLINE_LITERALS_REWRITTEN: AtomicU64 = AtomicU64::new(0);
static TODO_STUBS_RESOLVED: AtomicU64 = AtomicU64::new(0);
static ONCE_COMMENTS_REMOVED: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub snapshot_files_written: u64,
    pub snapshot_files_deleted: u64,
    pub stale_entries_pruned: u64,
    pub disk_writes_recorded: u64,

    pub inline_literals_rewritten: u64,
    pub todo_stubs_resolved: u64,
    pub once_comments_removed: u64,
}

impl MetricsSnapshot {
    /// Number of source edits of any kind.
    pub fn source_edits(&self) -> u64 {
        self.inline_literals_rewritten + self.todo_stubs_resolved + self.once_comments_removed
    }
}

// ----- Recorders (snapshot files) -----
pub fn record_snapshot_file_written() {
    SNAPSHOT_FILES_WRITTEN.fetch_add(1, Ordering::Relaxed);
}

pub fn record_snapshot_file_deleted() {
    SNAPSHOT_FILES_DELETED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_stale_entries_pruned(n: usize) {
    STALE_ENTRIES_PRUNED.fetch_add(n as u64, Ordering::Relaxed);
}

pub fn record_disk_write() {
    DISK_WRITES_RECORDED.fetch_add(1, Ordering::Relaxed);
}

// ----- Recorders (source rewrites) -----
pub fn record_inline_literal_rewritten() {
    INLINE_LITERALS_REWRITTEN.fetch_add(1, Ordering::Relaxed);
}

pub fn record_todo_stub_resolved() {
    TODO_STUBS_RESOLVED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_once_comments_removed(n: usize) {
    ONCE_COMMENTS_REMOVED.fetch_add(n as u64, Ordering::Relaxed);
}

// ----- Snapshot / Reset -----
pub fn snapshot() -> MetricsSnapshot {
    MetricsSnapshot {
        snapshot_files_written: SNAPSHOT_FILES_WRITTEN.load(Ordering::Relaxed),
        snapshot_files_deleted: SNAPSHOT_FILES_DELETED.load(Ordering::Relaxed),
        stale_entries_pruned: STALE_ENTRIES_PRUNED.load(Ordering::Relaxed),
        disk_writes_recorded: DISK_WRITES_RECORDED.load(Ordering::Relaxed),

        inline_literals_rewritten: INLINE_LITERALS_REWRITTEN.load(Ordering::Relaxed),
        todo_stubs_resolved: TODO_STUBS_RESOLVED.load(Ordering::Relaxed),
        once_comments_removed: ONCE_COMMENTS_REMOVED.load(Ordering::Relaxed),
    }
}

pub fn reset() {
    SNAPSHOT_FILES_WRITTEN.store(0, Ordering::Relaxed);
    SNAPSHOT_FILES_DELETED.store(0, Ordering::Relaxed);
    STALE_ENTRIES_PRUNED.store(0, Ordering::Relaxed);
    DISK_WRITES_RECORDED.store(0, Ordering::Relaxed);

    INLINE_LITERALS_REWRITTEN.store(0, Ordering::Relaxed);
    TODO_STUBS_RESOLVED.store(0, Ordering::Relaxed);
    ONCE_COMMENTS_REMOVED.store(0, Ordering::Relaxed);
}
