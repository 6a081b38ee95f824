//! Offline maintenance of snapshot files (backs the `selfie` binary).
//!
//! - load / check: parse a `.ss` file, reporting the failing line
//! - list: keys, facets and value kinds
//! - canonical: re-serialise in canonical form, keeping the newline convention
//! - prune: drop entries of tests that are not in a keep-list

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::fs::{DiskFs, Fs};
use crate::gc::{find_stale_snapshots_within, WithinTestGC};
use crate::layout::SNAPSHOT_EXT;
use crate::ordered_map::OrderedMap;
use crate::snapshot_file::SnapshotFile;

pub fn load(path: &Path) -> Result<SnapshotFile> {
    let content = DiskFs.file_read(path)?;
    SnapshotFile::parse_str(&content).with_context(|| format!("parse {}", path.display()))
}

/// Expands directories into the `.ss` files below them.
pub fn snapshot_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if path.is_dir() {
            out.extend(
                DiskFs
                    .walk(path)?
                    .into_iter()
                    .filter(|p| p.extension().map_or(false, |e| e == SNAPSHOT_EXT)),
            );
        } else {
            out.push(path.clone());
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedEntry {
    pub key: String,
    pub binary: bool,
    pub facets: Vec<String>,
}

pub fn list_entries(file: &SnapshotFile) -> Vec<ListedEntry> {
    file.snapshots()
        .iter()
        .map(|(key, snapshot)| ListedEntry {
            key: key.clone(),
            binary: snapshot.subject().is_binary(),
            facets: snapshot.facets().keys().cloned().collect(),
        })
        .collect()
}

/// Parses and re-serialises `content`.
pub fn canonical(content: &str) -> Result<String> {
    Ok(SnapshotFile::parse_str(content)?.serialize_to_string())
}

/// Removes every entry whose test is not in `keep`. Returns the removed keys.
pub fn prune(file: &SnapshotFile, keep: &[String]) -> Result<Vec<String>> {
    let snapshots = file.snapshots();
    let none_ran: OrderedMap<String, WithinTestGC> = OrderedMap::empty();
    let stale = find_stale_snapshots_within(&snapshots, &none_ran, keep.iter().cloned());
    let removed = stale
        .iter()
        .filter_map(|idx| snapshots.key_at(*idx).cloned())
        .collect();
    file.remove_all_indices(&stale)?;
    Ok(removed)
}
