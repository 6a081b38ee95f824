use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::PathBuf;

use selfie::maintenance::{load, snapshot_files};
use selfie::SelfieError;

pub fn exec(paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let files = snapshot_files(&paths)?;
    let mut failed = 0usize;
    for path in &files {
        match load(path) {
            Ok(file) => {
                let count = file.snapshots().len();
                if json {
                    println!(
                        "{}",
                        json!({ "path": path.display().to_string(), "ok": true, "snapshots": count })
                    );
                } else {
                    println!("ok    {} ({} snapshots)", path.display(), count);
                }
            }
            Err(e) => {
                failed += 1;
                let (kind, line) = match e.downcast_ref::<SelfieError>() {
                    Some(SelfieError::Parse { line, .. }) => ("parse", Some(*line)),
                    Some(other) => (other.kind(), None),
                    None => ("io", None),
                };
                if json {
                    println!(
                        "{}",
                        json!({
                            "path": path.display().to_string(),
                            "ok": false,
                            "kind": kind,
                            "line": line,
                            "error": format!("{:#}", e),
                        })
                    );
                } else {
                    println!("error {}: {:#}", path.display(), e);
                }
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!("{} of {} snapshot files failed to parse", failed, files.len()));
    }
    Ok(())
}
