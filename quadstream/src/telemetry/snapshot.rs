//! Point-in-time telemetry snapshot.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// An immutable copy of all pipeline metrics.
#[derive(Clone, Debug, Serialize)]
pub struct TelemetrySnapshot {
    /// How long the pipeline has been running
    #[serde(serialize_with = "serialize_secs")]
    pub uptime: Duration,

    // === Scheduler ===
    pub quads_requested: u64,
    /// Quads delivered with at least one usable child (includes partial)
    pub quads_assembled: u64,
    pub quads_partial: u64,
    /// Quads delivered with no usable child
    pub quads_failed: u64,
    pub quads_retried: u64,
    pub quads_discarded: u64,
    pub decode_failures: u64,

    // === Fetching ===
    pub tiles_fetched: u64,
    pub tiles_failed: u64,
    pub tiles_timed_out: u64,
    pub bytes_fetched: u64,
    pub requests_in_flight: usize,
    pub requests_queued: usize,

    // === RAM cache ===
    pub ram_quads: usize,
    pub ram_evictions: u64,
    pub disk_quads_loaded: u64,
    pub disk_quads_written: u64,

    // === GPU ===
    pub gpu_uploads: u64,
    pub gpu_evictions: u64,
    pub gpu_tiles: usize,

    // === Computed rates ===
    pub tiles_per_second: f64,
    pub bytes_per_second: f64,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl TelemetrySnapshot {
    /// Fraction of finished fetches that failed or timed out (0.0 - 1.0).
    pub fn tile_failure_rate(&self) -> f64 {
        let failed = self.tiles_failed + self.tiles_timed_out;
        let total = self.tiles_fetched + failed;
        if total == 0 {
            0.0
        } else {
            failed as f64 / total as f64
        }
    }

    /// Fraction of delivered quads that were partial (0.0 - 1.0).
    pub fn partial_rate(&self) -> f64 {
        if self.quads_assembled == 0 {
            0.0
        } else {
            self.quads_partial as f64 / self.quads_assembled as f64
        }
    }
}

impl fmt::Display for TelemetrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Pipeline Telemetry (uptime: {:.1}s)",
            self.uptime.as_secs_f64()
        )?;
        writeln!(f, "─────────────────────────────────────────")?;
        writeln!(f, "Quads:")?;
        writeln!(f, "  Requested: {}", self.quads_requested)?;
        writeln!(
            f,
            "  Assembled: {} ({:.1}% partial)",
            self.quads_assembled,
            self.partial_rate() * 100.0
        )?;
        writeln!(f, "  Failed: {}", self.quads_failed)?;
        writeln!(f, "  Retried: {}", self.quads_retried)?;
        writeln!(f, "  Discarded: {}", self.quads_discarded)?;
        writeln!(f, "Tiles:")?;
        writeln!(
            f,
            "  Fetched: {} ({:.1}/s, {:.0} B/s)",
            self.tiles_fetched, self.tiles_per_second, self.bytes_per_second
        )?;
        writeln!(
            f,
            "  Failed: {} / timed out: {} ({:.2}%)",
            self.tiles_failed,
            self.tiles_timed_out,
            self.tile_failure_rate() * 100.0
        )?;
        writeln!(f, "  Decode failures: {}", self.decode_failures)?;
        writeln!(
            f,
            "  In flight: {} / queued: {}",
            self.requests_in_flight, self.requests_queued
        )?;
        writeln!(f, "Caches:")?;
        writeln!(
            f,
            "  RAM: {} quads, {} evicted",
            self.ram_quads, self.ram_evictions
        )?;
        writeln!(
            f,
            "  Disk: {} loaded, {} written",
            self.disk_quads_loaded, self.disk_quads_written
        )?;
        write!(
            f,
            "  GPU: {} tiles, {} uploads, {} evicted",
            self.gpu_tiles, self.gpu_uploads, self.gpu_evictions
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::telemetry::PipelineMetrics;

    #[test]
    fn test_rates_with_no_traffic() {
        let snapshot = PipelineMetrics::new().snapshot();
        assert_eq!(snapshot.tile_failure_rate(), 0.0);
        assert_eq!(snapshot.partial_rate(), 0.0);
    }

    #[test]
    fn test_failure_rate() {
        let metrics = PipelineMetrics::new();
        metrics.tile_fetched(1);
        metrics.tile_fetched(1);
        metrics.tile_failed();
        metrics.tile_timed_out();
        assert!((metrics.snapshot().tile_failure_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_mentions_sections() {
        let text = PipelineMetrics::new().snapshot().to_string();
        assert!(text.contains("Quads:"));
        assert!(text.contains("GPU:"));
    }
}
