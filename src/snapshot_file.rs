//! The persisted container: optional metadata, ordered snapshots, end-of-file sentinel.
//!
//! All mutation goes through an internal mutex; readers get cheap clones of the
//! immutable snapshot map.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use crate::codec::{
    to_windows_newlines, write_end_of_file, write_entry, SnapshotReader, SnapshotValueReader,
};
use crate::error::{Result, SelfieError};
use crate::ordered_map::OrderedMap;
use crate::snapshot::{Snapshot, SnapshotValue};

/// Marker that prefixes the metadata key.
pub const METADATA_PREFIX: &str = "📷 ";

#[derive(Clone, Default)]
struct FileState {
    metadata: Option<(String, String)>,
    snapshots: OrderedMap<String, Snapshot>,
    was_set_at_test_time: bool,
}

pub struct SnapshotFile {
    unix_newlines: bool,
    state: Mutex<FileState>,
}

impl SnapshotFile {
    pub fn create_empty_with_unix_newlines(unix_newlines: bool) -> Self {
        Self {
            unix_newlines,
            state: Mutex::new(FileState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        Self::parse(SnapshotValueReader::of(content))
    }

    pub fn parse(values: SnapshotValueReader<'_>) -> Result<Self> {
        let unix_newlines = values.unix_newlines();
        let mut reader = SnapshotReader::new(values);
        let mut state = FileState::default();

        let metadata_key = match reader.values().peek_entry()? {
            Some(k) if k.facet.is_none() => k.root.strip_prefix(METADATA_PREFIX).map(str::to_string),
            _ => None,
        };
        if let Some(name) = metadata_key {
            let value = reader.values().next_value()?;
            let text = value
                .value_string()
                .map_err(|_| reader.values().err("Metadata must be a string value"))?
                .to_string();
            state.metadata = Some((name, text));
        }

        while let Some(key) = reader.peek_key()? {
            let snapshot = reader.next_snapshot()?;
            state.snapshots = state
                .snapshots
                .plus(key, snapshot)
                .map_err(|e| reader.values().err(e.to_string()))?;
        }

        Ok(Self {
            unix_newlines,
            state: Mutex::new(state),
        })
    }

    /// Metadata, every subject followed by its facets, then the sentinel.
    pub fn serialize(&self, out: &mut String) {
        let state = self.lock().clone();
        let mut buf = String::new();
        if let Some((name, value)) = &state.metadata {
            write_entry(
                &mut buf,
                &format!("{}{}", METADATA_PREFIX, name),
                None,
                &SnapshotValue::string(value),
            );
        }
        for (key, snapshot) in state.snapshots.iter() {
            write_entry(&mut buf, key, None, snapshot.subject());
            for (facet, value) in snapshot.facets().iter() {
                write_entry(&mut buf, key, Some(facet), value);
            }
        }
        write_end_of_file(&mut buf);
        if self.unix_newlines {
            out.push_str(&buf);
        } else {
            out.push_str(&to_windows_newlines(&buf));
        }
    }

    pub fn serialize_to_string(&self) -> String {
        let mut out = String::new();
        self.serialize(&mut out);
        out
    }

    pub fn unix_newlines(&self) -> bool {
        self.unix_newlines
    }

    pub fn metadata(&self) -> Option<(String, String)> {
        self.lock().metadata.clone()
    }

    pub fn set_metadata(&self, name: impl Into<String>, value: impl Into<String>) {
        self.lock().metadata = Some((name.into(), value.into()));
    }

    pub fn snapshots(&self) -> OrderedMap<String, Snapshot> {
        self.lock().snapshots.clone()
    }

    pub fn get(&self, key: &str) -> Option<Snapshot> {
        self.lock().snapshots.get(&key.to_string()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().snapshots.is_empty()
    }

    pub fn was_set_at_test_time(&self) -> bool {
        self.lock().was_set_at_test_time
    }

    /// Insert-or-replace. Marks the file dirty only when the stored value changed.
    pub fn set_at_test_time(&self, key: &str, snapshot: Snapshot) {
        let mut state = self.lock();
        if let Some(next) = state
            .snapshots
            .plus_or_noop_or_replace(key.to_string(), snapshot)
        {
            state.snapshots = next;
            state.was_set_at_test_time = true;
        }
    }

    /// Removes entries by ascending index (the output of the stale-snapshot GC).
    pub fn remove_all_indices(&self, indices: &[usize]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let mut state = self.lock();
        if let Some(&last) = indices.last() {
            if last >= state.snapshots.len() {
                return Err(SelfieError::invalid(format!(
                    "index {} out of range for {} snapshots",
                    last,
                    state.snapshots.len()
                )));
            }
        }
        state.snapshots = state.snapshots.minus_by_indices(indices);
        state.was_set_at_test_time = true;
        Ok(())
    }
}

impl PartialEq for SnapshotFile {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        let a = self.lock().clone();
        let b = other.lock().clone();
        self.unix_newlines == other.unix_newlines
            && a.metadata == b.metadata
            && a.snapshots == b.snapshots
    }
}

impl fmt::Debug for SnapshotFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("SnapshotFile")
            .field("unix_newlines", &self.unix_newlines)
            .field("metadata", &state.metadata)
            .field("snapshots", &state.snapshots)
            .field("was_set_at_test_time", &state.was_set_at_test_time)
            .finish()
    }
}
