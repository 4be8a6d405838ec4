pub mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::CommandResult;

#[derive(Debug, Parser)]
#[command(
    name = "dokan",
    about = "Dokan operator CLI",
    long_about = "Operate the Dokan messaging assistant: migrations, demo data, config \
                  inspection and readiness checks.",
    after_help = "Examples:\n  dokan doctor --json\n  dokan config\n  dokan seed"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo merchant and catalog (idempotent; resets demo stock)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, model provider readiness, DB connectivity and schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::try_parse()?;

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => CommandResult::report(commands::config::run()),
        Command::Doctor { json } => CommandResult::report(commands::doctor::run(json)),
    };

    println!("{}", result.output);
    Ok(ExitCode::from(result.exit_code))
}
