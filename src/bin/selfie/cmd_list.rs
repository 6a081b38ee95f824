use anyhow::Result;
use std::path::PathBuf;

use selfie::maintenance::{list_entries, load};

pub fn exec(path: PathBuf, json: bool) -> Result<()> {
    let file = load(&path)?;
    let entries = list_entries(&file);

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if let Some((name, _)) = file.metadata() {
        println!("metadata: {}", name);
    }
    for e in &entries {
        let kind = if e.binary { " (binary)" } else { "" };
        if e.facets.is_empty() {
            println!("{}{}", e.key, kind);
        } else {
            println!("{}{} [{}]", e.key, kind, e.facets.join(", "));
        }
    }
    println!("{} snapshots", entries.len());
    Ok(())
}
