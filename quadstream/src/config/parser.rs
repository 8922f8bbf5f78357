//! INI parsing: `Ini` → `ConfigFile`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};

use super::file::{ConfigError, ConfigFile};
use crate::scheduler::RetryPolicy;
use crate::tile::Scheme;

/// Parse an `Ini` object into a `ConfigFile`.
///
/// Starts from `ConfigFile::default()` and overlays any values found.
pub(super) fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigError> {
    let mut config = ConfigFile::default();
    let pipeline = &mut config.pipeline;

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        let keys = Section::new("cache", section);
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                pipeline.cache_directory = expand_tilde(v);
            }
        }
        keys.number("ram_quads", &mut pipeline.ram_quad_limit)?;
        keys.number("gpu_quads", &mut pipeline.gpu_quad_limit)?;
        keys.seconds("persist_interval", &mut pipeline.persist_interval)?;
    }

    // [network] section
    if let Some(section) = ini.section(Some("network")) {
        let keys = Section::new("network", section);
        keys.number("rate_limit", &mut pipeline.rate_limit)?;
        keys.millis("rate_interval_ms", &mut pipeline.rate_interval)?;
        keys.number("max_in_flight", &mut pipeline.max_in_flight)?;
        keys.seconds("assembly_timeout", &mut pipeline.assembly_timeout)?;
        keys.seconds("reachability_grace", &mut pipeline.reachability_grace)?;
        keys.seconds("http_timeout", &mut pipeline.http_timeout)?;
        keys.millis("update_interval_ms", &mut pipeline.update_interval)?;

        let mut attempts = pipeline.retry_policy.max_attempts();
        keys.number("retry_attempts", &mut attempts)?;
        if attempts != pipeline.retry_policy.max_attempts() {
            pipeline.retry_policy = retry_policy_for(attempts);
        }
    }

    // [source] section
    if let Some(section) = ini.section(Some("source")) {
        if let Some(v) = section.get("url") {
            let v = v.trim();
            if !v.is_empty() {
                pipeline.url_template = v.to_string();
            }
        }
        if let Some(v) = section.get("scheme") {
            pipeline.scheme = Scheme::from_str(v).map_err(|reason| ConfigError::InvalidValue {
                section: "source".to_string(),
                key: "scheme".to_string(),
                value: v.to_string(),
                reason,
            })?;
        }
    }

    Ok(config)
}

/// Retry policy for a total attempt budget. One attempt means no retries.
pub(super) fn retry_policy_for(attempts: u32) -> RetryPolicy {
    if attempts <= 1 {
        RetryPolicy::None
    } else {
        RetryPolicy::exponential(attempts)
    }
}

/// Typed accessors over one INI section.
struct Section<'a> {
    name: &'static str,
    properties: &'a Properties,
}

impl<'a> Section<'a> {
    fn new(name: &'static str, properties: &'a Properties) -> Self {
        Self { name, properties }
    }

    fn number<T: FromStr>(&self, key: &str, target: &mut T) -> Result<(), ConfigError> {
        if let Some(v) = self.properties.get(key) {
            *target = v
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, v, "must be a non-negative integer"))?;
        }
        Ok(())
    }

    fn seconds(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        if let Some(v) = self.properties.get(key) {
            let secs: u64 = v
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, v, "must be a whole number of seconds"))?;
            *target = Duration::from_secs(secs);
        }
        Ok(())
    }

    fn millis(&self, key: &str, target: &mut Duration) -> Result<(), ConfigError> {
        if let Some(v) = self.properties.get(key) {
            let millis: u64 = v
                .trim()
                .parse()
                .map_err(|_| self.invalid(key, v, "must be a whole number of milliseconds"))?;
            *target = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn invalid(&self, key: &str, value: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            section: self.name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
