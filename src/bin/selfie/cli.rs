use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Инструменты для файлов снапшотов (.ss)
#[derive(Parser, Debug)]
#[command(name = "selfie", version, about = "Snapshot file tools")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Parse snapshot files (directories are searched for *.ss) and report errors
    Check {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// One JSON object per file
        #[arg(long)]
        json: bool,
    },
    /// List the keys of a snapshot file
    List {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Rewrite snapshot files in canonical form
    Fmt {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only report files that are not canonical (exit code 1 if any)
        #[arg(long)]
        check: bool,
    },
    /// Remove the snapshots of every test not listed with --keep
    Prune {
        path: PathBuf,
        /// Test names whose snapshots stay (repeatable)
        #[arg(long)]
        keep: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
}
