//! Runtime configuration of the streaming pipeline.

use std::path::PathBuf;
use std::time::Duration;

use super::file::ConfigError;
use crate::gpu::MAX_GPU_SLOTS;
use crate::provider::DEFAULT_HTTP_TIMEOUT;
use crate::scheduler::RetryPolicy;
use crate::tile::{Scheme, QUAD_ARITY};

/// Default GPU budget in quads (2048 texture slots).
pub const DEFAULT_GPU_QUAD_LIMIT: usize = 512;

/// Default RAM cache budget in quads.
pub const DEFAULT_RAM_QUAD_LIMIT: usize = 12_000;

/// Default quads admitted per rate interval.
pub const DEFAULT_RATE_LIMIT: usize = 30;

pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of quads fetched concurrently.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Default deadline for all four children of a quad.
pub const DEFAULT_ASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time the network may be unreachable before in-flight work is
/// cancelled.
pub const DEFAULT_REACHABILITY_GRACE: Duration = Duration::from_secs(5);

/// Default daemon tick.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(50);

/// Default interval between disk cache writes.
pub const DEFAULT_PERSIST_INTERVAL: Duration = Duration::from_secs(30);

/// Default tile server.
pub const DEFAULT_URL_TEMPLATE: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default disk cache directory (`<platform cache dir>/quadstream`).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quadstream")
}

/// Settings for every stage of the pipeline.
///
/// Build with [`Default`] and the `with_*` setters, or load a
/// [`ConfigFile`](super::ConfigFile). Call [`PipelineConfig::validate`]
/// before starting a service.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Quads kept on the GPU (four texture slots each).
    pub gpu_quad_limit: usize,
    /// Quads kept in the RAM cache.
    pub ram_quad_limit: usize,
    /// Quads admitted per `rate_interval`.
    pub rate_limit: usize,
    pub rate_interval: Duration,
    /// Quads fetched concurrently.
    pub max_in_flight: usize,
    pub assembly_timeout: Duration,
    pub reachability_grace: Duration,
    pub update_interval: Duration,
    pub persist_interval: Duration,
    /// Tile URL with `{z}`, `{x}` and `{y}` placeholders.
    pub url_template: String,
    /// Row convention of the tile server.
    pub scheme: Scheme,
    pub cache_directory: PathBuf,
    pub http_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gpu_quad_limit: DEFAULT_GPU_QUAD_LIMIT,
            ram_quad_limit: DEFAULT_RAM_QUAD_LIMIT,
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_interval: DEFAULT_RATE_INTERVAL,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            assembly_timeout: DEFAULT_ASSEMBLY_TIMEOUT,
            reachability_grace: DEFAULT_REACHABILITY_GRACE,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            persist_interval: DEFAULT_PERSIST_INTERVAL,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            scheme: Scheme::NorthUp,
            cache_directory: default_cache_directory(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_gpu_quad_limit(mut self, quads: usize) -> Self {
        self.gpu_quad_limit = quads;
        self
    }

    pub fn with_ram_quad_limit(mut self, quads: usize) -> Self {
        self.ram_quad_limit = quads;
        self
    }

    /// Admit `limit` quads per `interval`.
    pub fn with_rate(mut self, limit: usize, interval: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_interval = interval;
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_assembly_timeout(mut self, timeout: Duration) -> Self {
        self.assembly_timeout = timeout;
        self
    }

    pub fn with_reachability_grace(mut self, grace: Duration) -> Self {
        self.reachability_grace = grace;
        self
    }

    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_persist_interval(mut self, interval: Duration) -> Self {
        self.persist_interval = interval;
        self
    }

    pub fn with_source(mut self, url_template: impl Into<String>, scheme: Scheme) -> Self {
        self.url_template = url_template.into();
        self.scheme = scheme;
        self
    }

    pub fn with_cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.cache_directory = directory.into();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// GPU texture slots implied by the quad limit.
    pub fn gpu_slots(&self) -> usize {
        self.gpu_quad_limit.saturating_mul(QUAD_ARITY)
    }

    /// Rejects settings the pipeline cannot run with.
    ///
    /// This is the only fatal check in the pipeline; everything past startup
    /// reports problems as tile status instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive_counts = [
            ("cache", "gpu_quads", self.gpu_quad_limit),
            ("cache", "ram_quads", self.ram_quad_limit),
            ("network", "rate_limit", self.rate_limit),
            ("network", "max_in_flight", self.max_in_flight),
        ];
        for (section, key, value) in positive_counts {
            if value == 0 {
                return Err(invalid(section, key, value, "must be greater than 0"));
            }
        }

        let positive_durations = [
            ("network", "rate_interval_ms", self.rate_interval),
            ("network", "assembly_timeout", self.assembly_timeout),
            ("network", "http_timeout", self.http_timeout),
            ("network", "update_interval_ms", self.update_interval),
            ("cache", "persist_interval", self.persist_interval),
        ];
        for (section, key, value) in positive_durations {
            if value.is_zero() {
                return Err(invalid(section, key, format!("{:?}", value), "must be greater than 0"));
            }
        }

        if self.gpu_slots() > MAX_GPU_SLOTS {
            return Err(invalid(
                "cache",
                "gpu_quads",
                self.gpu_quad_limit,
                format!("at most {} quads fit the GPU slot index", MAX_GPU_SLOTS / QUAD_ARITY),
            ));
        }

        if self.gpu_quad_limit > self.ram_quad_limit {
            return Err(invalid(
                "cache",
                "gpu_quads",
                self.gpu_quad_limit,
                "must not exceed ram_quads, GPU residency implies RAM residency",
            ));
        }

        if crate::provider::UrlTemplate::new(self.url_template.as_str(), self.scheme).is_none() {
            return Err(invalid(
                "source",
                "url",
                &self.url_template,
                "must contain {z}, {x} and {y}",
            ));
        }

        Ok(())
    }
}

fn invalid(
    section: &str,
    key: &str,
    value: impl ToString,
    reason: impl Into<String>,
) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_key(config: PipelineConfig) -> String {
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => key,
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gpu_slots(), 2048);
        assert_eq!(config.rate_limit, 30);
        assert_eq!(config.max_in_flight, 16);
    }

    #[test]
    fn test_zero_capacities_rejected() {
        assert_eq!(invalid_key(PipelineConfig::default().with_gpu_quad_limit(0)), "gpu_quads");
        assert_eq!(invalid_key(PipelineConfig::default().with_ram_quad_limit(0)), "ram_quads");
        assert_eq!(
            invalid_key(PipelineConfig::default().with_max_in_flight(0)),
            "max_in_flight"
        );
        assert_eq!(
            invalid_key(PipelineConfig::default().with_rate(0, Duration::from_secs(1))),
            "rate_limit"
        );
    }

    #[test]
    fn test_zero_durations_rejected() {
        assert_eq!(
            invalid_key(PipelineConfig::default().with_rate(5, Duration::ZERO)),
            "rate_interval_ms"
        );
        assert_eq!(
            invalid_key(PipelineConfig::default().with_assembly_timeout(Duration::ZERO)),
            "assembly_timeout"
        );
    }

    #[test]
    fn test_gpu_limit_bounded_by_slot_index() {
        let config = PipelineConfig::default()
            .with_ram_quad_limit(1_000_000)
            .with_gpu_quad_limit(MAX_GPU_SLOTS / QUAD_ARITY + 1);
        assert_eq!(invalid_key(config), "gpu_quads");

        let config = PipelineConfig::default()
            .with_ram_quad_limit(1_000_000)
            .with_gpu_quad_limit(MAX_GPU_SLOTS / QUAD_ARITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gpu_limit_bounded_by_ram() {
        let config = PipelineConfig::default()
            .with_ram_quad_limit(10)
            .with_gpu_quad_limit(11);
        assert_eq!(invalid_key(config), "gpu_quads");
    }

    #[test]
    fn test_template_placeholders_required() {
        let config =
            PipelineConfig::default().with_source("https://example.org/{z}/{x}.png", Scheme::NorthUp);
        assert_eq!(invalid_key(config), "url");
    }
}
