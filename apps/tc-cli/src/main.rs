//! # tc-cli
//!
//! Command-line interface for the temperature controller daemon.
//!
//! - `tc temp get/step/watch`: query, mutate and follow the temperature
//! - `tc goal set/cancel/status`: run a goal and manage it

mod client;
mod commands;
mod sse;

use clap::{Parser, Subcommand};

use crate::client::DaemonClient;

/// Temperature controller CLI.
#[derive(Parser)]
#[command(name = "tc", version, about)]
struct Cli {
    /// Daemon base URL.
    #[arg(long, global = true, default_value = "http://127.0.0.1:7878")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query and mutate the temperature.
    Temp {
        #[command(subcommand)]
        command: commands::temp::TempCommands,
    },
    /// Run and manage goals.
    Goal {
        #[command(subcommand)]
        command: commands::goal::GoalCommands,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = DaemonClient::new(&cli.server)?;

    match &cli.command {
        Commands::Temp { command } => commands::temp::execute(command, &client),
        Commands::Goal { command } => commands::goal::execute(command, &client),
    }
}
