pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "gingga",
    about = "Gingga operator CLI",
    long_about = "Apply database migrations, inspect effective configuration, and check runtime readiness.",
    after_help = "Examples:\n  gingga doctor --json\n  gingga config\n  gingga migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, LLM provider settings, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
