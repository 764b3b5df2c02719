//! EnDAOment command-line entry point.
//!
//! Deploys and configures the contract suite, drives the donor, university
//! and student transaction flows, and serves deployment records over a small
//! Axum REST API.

mod abi;
mod api;
mod artifacts;
mod chain;
mod cli;
mod config;
mod contracts;
mod dashboard;
mod db;
mod deploy;
mod errors;
mod flows;
mod format;
mod ipfs;
mod registration;
mod rpc;
mod scripts;
mod session;
mod sim;
mod student;
mod universities;
mod wallets;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Parse first so --help and usage errors work without a valid environment.
    let cli = Cli::parse();
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    cli::execute(cli, config).await?;
    Ok(())
}
