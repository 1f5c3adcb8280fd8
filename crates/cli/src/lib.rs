pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use leadbridge_mcp::init_logging;

use crate::commands::{CommandResult, ConfigSource};

#[derive(Debug, Parser)]
#[command(
    name = "leadbridge",
    about = "Leadbridge operator CLI",
    long_about = "Check CRM readiness, inspect configuration, and call CRM tools without an MCP client.",
    after_help = "Examples:\n  leadbridge doctor --json\n  leadbridge config\n  leadbridge tools\n  leadbridge invoke summarize_opportunity --args '{\"lead_id\": 42}'"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Read configuration from this TOML file")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Validate config, CRM settings, completion key, and a live CRM login")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "List the registered CRM tools and their input schemas")]
    Tools,
    #[command(about = "Call one CRM tool and print its result envelope")]
    Invoke {
        #[arg(help = "Tool name, e.g. list_leads")]
        tool: String,
        #[arg(long, default_value = "{}", help = "Tool arguments as a JSON object")]
        args: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let source = ConfigSource { path: cli.config };

    if let Ok(config) = source.load() {
        init_logging(&config);
    }

    let result = match cli.command {
        Command::Doctor { json } => commands::doctor::run(&source, json),
        Command::Config => CommandResult { exit_code: 0, output: commands::config::run(&source) },
        Command::Tools => commands::tools::run(&source),
        Command::Invoke { tool, args } => commands::invoke::run(&source, &tool, &args),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
