//! deploycheck -- deployment lifecycle verifier for Helm charts

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use deploycheck_core::config::{DeploycheckConfig, GeneralConfig};

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut general = load_general_config(&cli).await;
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    if let Err(e) = logging::init_tracing(&general) {
        eprintln!("{} {e}", "warning:".yellow().bold());
    }

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

/// Logging settings come from the config file when it is readable. A broken
/// or missing file is reported by the command itself, after logging is up.
async fn load_general_config(cli: &Cli) -> GeneralConfig {
    let mut config = DeploycheckConfig::from_file(&cli.config)
        .await
        .unwrap_or_default();
    config.apply_env_overrides();
    config.general
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, &writer).await,
        Commands::List => commands::list::execute(&writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
