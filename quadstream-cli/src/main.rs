//! QuadStream CLI - Command-line interface
//!
//! Streams map tiles for a camera position through the full pipeline and
//! reports telemetry, or inspects the configuration file.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "quadstream")]
#[command(version = quadstream::VERSION)]
#[command(about = "Stream quad-tree map tiles into a bounded GPU texture array", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.quadstream/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream tiles around a camera position until the duration ends or Ctrl+C
    Run(RunArgs),

    /// Inspect or initialize the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args, cli.config),
        Commands::Config { command } => commands::config::run(command, cli.config),
    };

    if let Err(e) = result {
        e.exit();
    }
}
