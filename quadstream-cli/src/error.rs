//! CLI error handling with user-friendly messages.

use std::fmt;
use std::process;

use quadstream::config::ConfigError;
use quadstream::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration could not be read, parsed or written
    Config(ConfigError),
    /// Invalid command-line usage
    Usage(String),
    /// Failed to build the async runtime
    Runtime(std::io::Error),
    /// Streaming service failed
    Service(ServiceError),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigError::InvalidValue { section, .. }) = self {
            eprintln!();
            eprintln!("Fix the [{}] section of the configuration file, or run:", section);
            eprintln!("  quadstream config init --force");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Service(e) => write!(f, "Streaming service error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Service(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Config(e) => CliError::Config(e),
            other => CliError::Service(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_config_errors_surface_as_config() {
        let err = ServiceError::Config(ConfigError::InvalidValue {
            section: "cache".to_string(),
            key: "gpu_quads".to_string(),
            value: "0".to_string(),
            reason: "must be greater than 0".to_string(),
        });
        assert!(matches!(CliError::from(err), CliError::Config(_)));
        assert!(matches!(
            CliError::from(ServiceError::NoRuntime),
            CliError::Service(ServiceError::NoRuntime)
        ));
    }
}
