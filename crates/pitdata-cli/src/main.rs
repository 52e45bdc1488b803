//! `pitdata` command line.
//!
//! Commands:
//! - `kinds`: print the effective cache policy table
//! - `check`: report cache health for a list of entities
//! - `prepare`: build one as-of dataset from the cache
//! - `batch`: build as-of datasets for many entities
//!
//! `prepare` and `batch` never touch the network. Caches that would need a
//! refresh fail with an offline fetch error.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("pitdata=info"))?)
        .init();

    let cli = Cli::parse();
    let registry = commands::load_registry(cli.policy.as_deref());

    match &cli.command {
        Commands::Kinds { json } => commands::kinds(&registry, *json),
        Commands::Check(args) => commands::check(registry, &cli.base_dir, args),
        Commands::Prepare(args) => commands::prepare(registry, &cli.base_dir, args).await,
        Commands::Batch(args) => commands::batch(registry, &cli.base_dir, args).await,
    }
}
