// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Stampede CLI
//!
//! The `stampede` binary runs the swarm web-testing daemon and talks to a
//! running daemon from the command line.
//!
//! ## Commands
//!
//! - `stampede serve` - Run the daemon (REST API + websocket event stream)
//! - `stampede mission create|list|status` - Manage missions on a daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

use commands::mission::MissionCommand;
use commands::serve::ServeArgs;

/// Stampede - agent-swarm web testing
#[derive(Parser)]
#[command(name = "stampede")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// HTTP API host
    #[arg(long, global = true, env = "STAMPEDE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// HTTP API port
    #[arg(long, global = true, env = "STAMPEDE_PORT", default_value = "8080")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "STAMPEDE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Mission operations against a running daemon
    #[command(name = "mission")]
    Mission {
        #[command(subcommand)]
        command: MissionCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve { args } => commands::serve::execute(args, &cli.host, cli.port).await,
        Commands::Mission { command } => {
            commands::mission::handle_command(command, &cli.host, cli.port).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
