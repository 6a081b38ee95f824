use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

mod cli;
mod cmd_check;
mod cmd_fmt;
mod cmd_list;
mod cmd_prune;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт — info.
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Check { paths, json } => cmd_check::exec(paths, json),

        cli::Cmd::List { path, json } => cmd_list::exec(path, json),

        cli::Cmd::Fmt { paths, check } => cmd_fmt::exec(paths, check),

        cli::Cmd::Prune { path, keep, dry_run } => cmd_prune::exec(path, keep, dry_run),
    }
}
