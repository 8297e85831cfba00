//! Busboard CLI - local-first bus seating and roster management.
//!
//! Thin command-line surface over `busboard-core`. The engine runs on a
//! current-thread runtime: one logical thread of control, suspending at I/O.

mod app;
mod cli;
mod commands;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("busboard=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(commands::run(cli))
}
