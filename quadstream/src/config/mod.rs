//! Configuration: pipeline settings and the INI configuration file.

mod file;
mod parser;
mod pipeline;
mod writer;

pub use file::{config_directory, config_file_path, ConfigError, ConfigFile};
pub use pipeline::{
    default_cache_directory, PipelineConfig, DEFAULT_ASSEMBLY_TIMEOUT, DEFAULT_GPU_QUAD_LIMIT,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_PERSIST_INTERVAL, DEFAULT_RAM_QUAD_LIMIT, DEFAULT_RATE_INTERVAL,
    DEFAULT_RATE_LIMIT, DEFAULT_REACHABILITY_GRACE, DEFAULT_UPDATE_INTERVAL, DEFAULT_URL_TEMPLATE,
};
