//! Configuration CLI commands.
//!
//! Provides `config show`, `config check`, `config path` and `config init`.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use quadstream::config::ConfigFile;

use crate::error::CliError;
use crate::runner::{load_config, resolve_config_path};

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration (file values over defaults)
    Show,

    /// Validate the effective configuration
    Check,

    /// Show the configuration file path
    Path,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let path = resolve_config_path(config_path);
    match command {
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Check => run_check(&path),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => run_init(&path, force),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;
    if !path.exists() {
        println!("# {} not found, showing defaults", path.display());
        println!();
    }
    print!("{}", config.to_ini_string());
    Ok(())
}

fn run_check(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;
    config.pipeline.validate()?;

    let pipeline = &config.pipeline;
    println!("Configuration OK");
    println!();
    println!(
        "  GPU:      {} quads ({} texture slots)",
        pipeline.gpu_quad_limit,
        pipeline.gpu_slots()
    );
    println!("  RAM:      {} quads", pipeline.ram_quad_limit);
    println!(
        "  Network:  {} quads per {:?}, {} in flight",
        pipeline.rate_limit, pipeline.rate_interval, pipeline.max_in_flight
    );
    println!(
        "  Source:   {} ({})",
        pipeline.url_template,
        pipeline.scheme.as_str()
    );
    println!("  Cache:    {}", pipeline.cache_directory.display());
    Ok(())
}

fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_defaults_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        run_init(&path, false).unwrap();
        assert_eq!(load_config(&path).unwrap(), ConfigFile::default());

        assert!(matches!(run_init(&path, false), Err(CliError::Usage(_))));
        assert!(run_init(&path, true).is_ok());
    }

    #[test]
    fn test_check_rejects_invalid_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[network]\nmax_in_flight = 0\n").unwrap();

        match run_check(&path) {
            Err(CliError::Config(e)) => assert!(e.to_string().contains("max_in_flight")),
            other => panic!("expected config error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_check_accepts_defaults() {
        let dir = TempDir::new().unwrap();
        assert!(run_check(&dir.path().join("absent.ini")).is_ok());
    }
}
