//! `pgw-harness`: drive a payment gateway's APIs from the command line and
//! capture its webhooks.
//!
//! Logs go to stderr (`RUST_LOG`, `LOG_FORMAT`); command output goes to stdout.

#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from josekit, openssl and reqwest"
)]

mod cli;
mod commands;
mod observability;
mod security_log;
mod webhook_server;

use clap::Parser;

use crate::{cli::Cli, observability::init_observability};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_observability(cli.log_format);
    commands::run(cli).await
}
