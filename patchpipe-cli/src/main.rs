//! patchpipe CLI - patch a multi-repository client from the command line.

mod applier;
mod commands;
mod error;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::CommonArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "patchpipe", version, about = "Patch pipeline for multi-repository game clients")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check what an update would download, without changing anything
    Check {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Download and install all required patches
    Update {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        update: commands::update::UpdateArgs,
    },
}

fn init_tracing() {
    // Quiet by default; RUST_LOG opts into pipeline internals.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result: Result<(), CliError> = match &cli.command {
        Command::Check { common } => commands::check::run(common).await,
        Command::Update { common, update } => commands::update::run(common, update).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::debug!(%error, "command failed");
            ExitCode::from(error.exit_code())
        }
    }
}
