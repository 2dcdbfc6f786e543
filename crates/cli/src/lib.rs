pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley operator CLI",
    long_about = "Operate the parley call agent: startup preflight, migrations, config inspection, readiness checks, call history, and offline transcript analysis.",
    after_help = "Examples:\n  parley doctor --json\n  parley calls --limit 20\n  parley analyze \"I can pay 200 a month\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending call store migrations and report schema versions")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, classifier client readiness, and call store access")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the most recent call records as JSON")]
    Calls {
        #[arg(long, default_value_t = 50, help = "Maximum number of records to return")]
        limit: u32,
    },
    #[command(about = "Classify a caller transcript for initial repayment intent")]
    Analyze {
        #[arg(help = "Caller transcript to analyze")]
        transcript: String,
    },
}

pub fn run() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Calls { limit } => commands::calls::run(limit),
        Command::Analyze { transcript } => commands::analyze::run(&transcript),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
