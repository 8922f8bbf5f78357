//! CLI runner for common setup.
//!
//! Loads the configuration file and initializes logging for commands that
//! start the pipeline.

use std::path::{Path, PathBuf};

use tracing::info;

use quadstream::config::{config_file_path, ConfigFile};
use quadstream::logging::{default_log_dir, default_log_file, init_logging, LoggingGuard};

use crate::error::CliError;

/// Resolves the configuration path: CLI argument, then the default location.
pub fn resolve_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path.unwrap_or_else(config_file_path)
}

/// Loads the configuration file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_from(path)?)
}

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    /// Keeps the log writer alive while the runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Loads the configuration and initializes logging.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, CliError> {
        let config_path = resolve_config_path(config_path);
        let config = load_config(&config_path)?;

        let logging_guard = init_logging(default_log_dir(), default_log_file())
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("QuadStream v{}", quadstream::VERSION);
        info!(
            config = %self.config_path.display(),
            "QuadStream CLI: {} command", command
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_cli_path_takes_precedence() {
        let path = PathBuf::from("/tmp/custom.ini");
        assert_eq!(resolve_config_path(Some(path.clone())), path);
        assert_eq!(resolve_config_path(None), config_file_path());
    }
}
