//! Centralized configuration for the snapshot engine.
//!
//! Env:
//! - SELFIE (or `selfie`) = interactive|readonly|overwrite. Unset: `CI` truthy => readonly,
//!   otherwise interactive. Unknown value is an error.
//! - SELFIE_ROOT: project root; defaults to CARGO_MANIFEST_DIR, then the current dir.
//! - SELFIE_SNAPSHOT_FOLDER: optional folder (next to the test source) holding `.ss` files.
//! - SELFIE_ALLOW_EQUIVALENT_WRITES: default true ("1|true|yes|on" => true).
//! - SELFIE_UNIX_NEWLINES: forces the newline convention of new snapshot files;
//!   when unset it is inferred from the project files at `build()`.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;

use crate::fs::infer_unix_newlines;
use crate::mode::Mode;

#[derive(Clone, Debug)]
pub struct SelfieConfig {
    pub mode: Mode,

    /// Call sites (compiler-relative paths) are resolved against this folder.
    /// Env: SELFIE_ROOT
    pub root_folder: PathBuf,

    /// None => `<dir>/<stem>.ss`, Some(f) => `<dir>/<f>/<stem>.ss`.
    /// Env: SELFIE_SNAPSHOT_FOLDER
    pub snapshot_folder_name: Option<String>,

    /// Writing the same value twice to one location is fine unless this is false.
    /// Env: SELFIE_ALLOW_EQUIVALENT_WRITES (default true)
    pub allow_multiple_equivalent_writes: bool,

    /// Env: SELFIE_UNIX_NEWLINES (default: inferred)
    pub unix_newlines: Option<bool>,
}

impl Default for SelfieConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Interactive,
            root_folder: PathBuf::from("."),
            snapshot_folder_name: None,
            allow_multiple_equivalent_writes: true,
            unix_newlines: None,
        }
    }
}

fn truthy(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "yes" || s == "on"
}

impl SelfieConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Same as `from_env`, reading variables through `lookup` (tests use a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        // ----- mode -----
        let mode = lookup("SELFIE").or_else(|| lookup("selfie"));
        cfg.mode = match mode {
            Some(v) if !v.trim().is_empty() => v.parse::<Mode>()?,
            _ => {
                if lookup("CI").map_or(false, |v| truthy(&v)) {
                    Mode::Readonly
                } else {
                    Mode::Interactive
                }
            }
        };

        // ----- layout -----
        cfg.root_folder = match lookup("SELFIE_ROOT").or_else(|| lookup("CARGO_MANIFEST_DIR")) {
            Some(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
            _ => std::env::current_dir()?,
        };

        if let Some(v) = lookup("SELFIE_SNAPSHOT_FOLDER") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.snapshot_folder_name = Some(s.to_string());
            }
        }

        if let Some(v) = lookup("SELFIE_ALLOW_EQUIVALENT_WRITES") {
            cfg.allow_multiple_equivalent_writes = truthy(&v);
        }

        if let Some(v) = lookup("SELFIE_UNIX_NEWLINES") {
            if !v.trim().is_empty() {
                cfg.unix_newlines = Some(truthy(&v));
            }
        }

        Ok(cfg)
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_root_folder(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_folder = root.into();
        self
    }

    pub fn with_snapshot_folder_name<S: Into<String>>(mut self, name: Option<S>) -> Self {
        self.snapshot_folder_name = name.map(Into::into);
        self
    }

    pub fn with_allow_multiple_equivalent_writes(mut self, on: bool) -> Self {
        self.allow_multiple_equivalent_writes = on;
        self
    }

    pub fn with_unix_newlines(mut self, on: Option<bool>) -> Self {
        self.unix_newlines = on;
        self
    }

    /// Resolves everything left to inference (currently only the newline convention).
    pub fn build(mut self) -> Self {
        if self.unix_newlines.is_none() {
            self.unix_newlines = Some(infer_unix_newlines(&self.root_folder));
        }
        self
    }
}

impl fmt::Display for SelfieConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SelfieConfig {{")?;
        writeln!(f, "  mode: {}", self.mode)?;
        writeln!(f, "  root_folder: {}", self.root_folder.display())?;
        writeln!(
            f,
            "  snapshot_folder_name: {}",
            self.snapshot_folder_name.as_deref().unwrap_or("(none)")
        )?;
        writeln!(
            f,
            "  allow_multiple_equivalent_writes: {}",
            self.allow_multiple_equivalent_writes
        )?;
        match self.unix_newlines {
            Some(v) => writeln!(f, "  unix_newlines: {}", v)?,
            None => writeln!(f, "  unix_newlines: (infer)")?,
        }
        write!(f, "}}")
    }
}
