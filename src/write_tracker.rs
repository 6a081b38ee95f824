//! Write trackers: one location may be written at most once per run.
//!
//! Every tracker is a map `key -> first write` behind its own mutex. A second write with a
//! different value is a consistency error naming both call sites; a second identical write
//! is accepted unless the layout forbids equivalent writes.
//!
//! - `DiskWriteTracker`: key is the snapshot key (`test` or `test/sub`) within one snapshot file.
//! - `InlineWriteTracker`: key is the call site; the writes are applied to the sources at suite end.
//! - `ToBeFileWriteTracker`: key is the target file.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::info;

use crate::call::{CallLocation, CallStack};
use crate::error::{Result, SelfieError};
use crate::layout::SnapshotFileLayout;
use crate::literals::{Literal, LiteralValue};
use crate::metrics;
use crate::snapshot::Snapshot;
use crate::source_file::SourceFile;

#[derive(Clone, Debug)]
struct FirstWrite<V> {
    value: V,
    call: CallStack,
}

struct WriteTracker<K, V> {
    how_to_fix: &'static str,
    writes: Mutex<BTreeMap<K, FirstWrite<V>>>,
}

impl<K: Ord + Clone, V: PartialEq + Debug + Clone> WriteTracker<K, V> {
    fn new(how_to_fix: &'static str) -> Self {
        Self {
            how_to_fix,
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    fn record_internal(&self, key: K, value: V, call: &CallStack, allow_equivalent: bool) -> Result<()> {
        let prior = {
            let mut writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
            match writes.get(&key) {
                Some(prior) => prior.clone(),
                None => {
                    writes.insert(
                        key,
                        FirstWrite {
                            value,
                            call: call.clone(),
                        },
                    );
                    return Ok(());
                }
            }
        };
        if prior.value != value {
            Err(SelfieError::Consistency(format!(
                "Snapshot was set to multiple values!\n  first time: {}\n   this time: {}\n{}\n first value: {:?}\n  this value: {:?}",
                prior.call.ide_link(),
                call.ide_link(),
                self.how_to_fix,
                prior.value,
                value
            )))
        } else if !allow_equivalent {
            Err(SelfieError::Consistency(format!(
                "Snapshot was set to the same value multiple times.\n  first time: {}\n   this time: {}\n{}",
                prior.call.ide_link(),
                call.ide_link(),
                self.how_to_fix
            )))
        } else {
            Ok(())
        }
    }

    fn entries(&self) -> Vec<(K, V)> {
        let writes = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        writes
            .iter()
            .map(|(k, w)| (k.clone(), w.value.clone()))
            .collect()
    }

    fn is_empty(&self) -> bool {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

// ----- disk -----

pub struct DiskWriteTracker {
    inner: WriteTracker<String, Snapshot>,
}

impl Default for DiskWriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskWriteTracker {
    pub fn new() -> Self {
        Self {
            inner: WriteTracker::new(
                "You can fix this with `.to_match_disk_sub(disk, sub)` and pass a unique value for sub.",
            ),
        }
    }

    pub fn record(&self, key: &str, snapshot: &Snapshot, call: &CallStack, allow_equivalent: bool) -> Result<()> {
        self.inner
            .record_internal(key.to_string(), snapshot.clone(), call, allow_equivalent)
    }
}

// ----- inline -----

pub struct InlineWriteTracker {
    inner: WriteTracker<CallLocation, LiteralValue>,
}

impl Default for InlineWriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InlineWriteTracker {
    pub fn new() -> Self {
        Self {
            inner: WriteTracker::new(
                "You can fix this by doing an `if` before the assertion to separate the cases into different assertions.",
            ),
        }
    }

    pub fn record(&self, call: &CallStack, literal: &LiteralValue, allow_equivalent: bool) -> Result<()> {
        self.inner
            .record_internal(call.location.clone(), literal.clone(), call, allow_equivalent)
    }

    pub fn has_writes(&self) -> bool {
        !self.inner.is_empty()
    }

    /// Applies every recorded write, file by file, in line order. Earlier rewrites on a file
    /// shift the lines of later ones by the newline delta they introduced.
    /// Returns the number of source files written.
    pub fn persist_writes(&self, layout: &SnapshotFileLayout) -> anyhow::Result<usize> {
        let mut by_file: BTreeMap<PathBuf, Vec<(usize, LiteralValue)>> = BTreeMap::new();
        for (location, literal) in self.inner.entries() {
            by_file
                .entry(layout.source_path_for_call(&location))
                .or_default()
                .push((location.line(), literal));
        }
        let mut files_written = 0;
        for (path, writes) in by_file {
            let content = layout.fs().file_read(&path)?;
            let mut source = SourceFile::new(&path.to_string_lossy(), &content)?;
            let mut delta: isize = 0;
            for (line, literal) in writes {
                let line = (line as isize + delta) as usize;
                match &literal.actual {
                    Literal::Todo(stub) => {
                        source.replace_on_line(
                            line,
                            &format!(".{}_TODO(", stub.method_name()),
                            &format!(".{}(", stub.method_name()),
                        )?;
                        metrics::record_todo_stub_resolved();
                    }
                    _ => {
                        delta += source
                            .parse_to_be_like(line)?
                            .set_literal_and_get_newline_delta(&literal)?;
                        metrics::record_inline_literal_rewritten();
                    }
                }
            }
            layout.fs().file_write(&path, &source.as_string())?;
            info!("rewrote inline snapshots in {}", path.display());
            files_written += 1;
        }
        Ok(files_written)
    }
}

/// Checks that the literal the test passed at runtime is the one the rewriter would find at
/// `call` in `source`; otherwise rewriting it later would corrupt the file.
pub fn verify_source_literal(source: &mut SourceFile, call: &CallStack, literal: &LiteralValue) -> Result<()> {
    let expected = match &literal.expected {
        Some(expected) => expected,
        None => return Ok(()),
    };
    let parsed = source
        .parse_to_be_like(call.location.line())
        .and_then(|to_be| to_be.parse_literal(literal.format()))
        .map_err(|e| {
            SelfieError::RewriteScan(format!(
                "Error while parsing the literal at {}: {}",
                call.ide_link(),
                e
            ))
        })?;
    if &parsed != expected {
        return Err(SelfieError::Consistency(format!(
            "Selfie cannot modify the literal at {} because Selfie has a parsing bug.\n  runtime value: {}\n   parsed value: {}",
            call.ide_link(),
            expected,
            parsed
        )));
    }
    Ok(())
}

// ----- to_be_file -----

pub struct ToBeFileWriteTracker {
    inner: WriteTracker<PathBuf, Arc<[u8]>>,
}

impl Default for ToBeFileWriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ToBeFileWriteTracker {
    pub fn new() -> Self {
        Self {
            inner: WriteTracker::new(
                "You can fix this by calling `to_be_file` with a different filename.",
            ),
        }
    }

    /// Records the write; the caller writes the bytes only after this succeeded.
    pub fn record(&self, path: PathBuf, bytes: &[u8], call: &CallStack, allow_equivalent: bool) -> Result<()> {
        self.inner
            .record_internal(path, Arc::from(bytes), call, allow_equivalent)
    }
}
