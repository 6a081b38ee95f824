use anyhow::{anyhow, Context, Result};
use log::info;
use std::path::PathBuf;

use selfie::fs::{DiskFs, Fs};
use selfie::maintenance::{canonical, snapshot_files};

pub fn exec(paths: Vec<PathBuf>, check: bool) -> Result<()> {
    let mut unformatted = 0usize;
    for path in snapshot_files(&paths)? {
        let content = DiskFs.file_read(&path)?;
        let formatted = canonical(&content).with_context(|| format!("parse {}", path.display()))?;
        if formatted == content {
            continue;
        }
        unformatted += 1;
        if check {
            println!("would reformat {}", path.display());
        } else {
            DiskFs.file_write(&path, &formatted)?;
            info!("formatted {}", path.display());
        }
    }
    if check && unformatted > 0 {
        return Err(anyhow!("{} snapshot files are not canonical", unformatted));
    }
    Ok(())
}
