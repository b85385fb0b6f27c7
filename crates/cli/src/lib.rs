pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "safepath",
    about = "SafePath operator CLI",
    long_about = "Inspect SafePath configuration, check service readiness, and talk to the travel safety assistant.",
    after_help = "Examples:\n  safepath doctor --json\n  safepath config\n  safepath classify \"is this area safe at night?\"\n  safepath chat"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to a safepath.toml config file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List registered agents and the default agent")]
    Agents,
    #[command(about = "Show which persona a message would be routed to, without calling a model")]
    Classify {
        #[arg(required = true, help = "Message text")]
        text: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and check chat model, backend and speech readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Start an interactive conversation on stdin")]
    Chat {
        #[arg(long, help = "Agent key (defaults to the registry default)")]
        agent: Option<String>,
        #[arg(long, help = "Write synthesized reply audio into this directory")]
        audio_dir: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Command::Agents => commands::agents::run(config_path),
        Command::Classify { text } => commands::classify::run(&text.join(" ")),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(config_path) }
        }
        Command::Doctor { json } => commands::doctor::run(config_path, json),
        Command::Chat { agent, audio_dir } => {
            commands::chat::run(config_path, agent.as_deref(), audio_dir.as_deref())
        }
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    ExitCode::from(result.exit_code)
}
