use anyhow::Result;
use log::info;
use std::path::PathBuf;

use selfie::fs::{DiskFs, Fs};
use selfie::maintenance::{load, prune};

pub fn exec(path: PathBuf, keep: Vec<String>, dry_run: bool) -> Result<()> {
    let file = load(&path)?;
    let removed = prune(&file, &keep)?;

    for key in &removed {
        println!("{} {}", if dry_run { "would remove" } else { "removed" }, key);
    }
    if dry_run || removed.is_empty() {
        println!("{} stale snapshots", removed.len());
        return Ok(());
    }

    if file.is_empty() {
        DiskFs.delete(&path)?;
        info!("deleted {} (no snapshots left)", path.display());
    } else {
        DiskFs.file_write(&path, &file.serialize_to_string())?;
        info!("pruned {} snapshots from {}", removed.len(), path.display());
    }
    selfie::metrics::record_stale_entries_pruned(removed.len());
    Ok(())
}
