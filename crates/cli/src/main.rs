// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! chorus - command-line client for chorusd

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod output;

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{send, status, watch};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "chorus",
    version,
    about = "Chorus - durable message broadcast"
)]
struct Cli {
    /// Daemon address
    #[arg(long, global = true, env = "CHORUS_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a message for broadcast
    Send(send::SendArgs),
    /// Print broadcast messages as they arrive
    Watch(watch::WatchArgs),
    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send(args) => send::handle(args, cli.addr).await,
        Commands::Watch(args) => watch::handle(args, cli.addr, cli.output).await,
        Commands::Status => status::handle(cli.addr, cli.output).await,
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}
