//! Lock-free atomic metrics collection.

use super::TelemetrySnapshot;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Lock-free metrics collection for the streaming pipeline.
///
/// All operations use `Relaxed` ordering; counters are independent
/// measurements.
#[derive(Debug)]
pub struct PipelineMetrics {
    start_time: Instant,

    // === Scheduler ===
    quads_requested: AtomicU64,
    quads_assembled: AtomicU64,
    quads_partial: AtomicU64,
    quads_failed: AtomicU64,
    quads_retried: AtomicU64,
    /// Completions that arrived after the quad left the desired set
    quads_discarded: AtomicU64,
    decode_failures: AtomicU64,

    // === Fetching ===
    tiles_fetched: AtomicU64,
    tiles_failed: AtomicU64,
    tiles_timed_out: AtomicU64,
    bytes_fetched: AtomicU64,
    requests_in_flight: AtomicUsize,
    requests_queued: AtomicUsize,

    // === RAM cache ===
    ram_quads: AtomicUsize,
    ram_evictions: AtomicU64,
    disk_quads_loaded: AtomicU64,
    disk_quads_written: AtomicU64,

    // === GPU ===
    gpu_uploads: AtomicU64,
    gpu_evictions: AtomicU64,
    gpu_tiles: AtomicUsize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            quads_requested: AtomicU64::new(0),
            quads_assembled: AtomicU64::new(0),
            quads_partial: AtomicU64::new(0),
            quads_failed: AtomicU64::new(0),
            quads_retried: AtomicU64::new(0),
            quads_discarded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            tiles_fetched: AtomicU64::new(0),
            tiles_failed: AtomicU64::new(0),
            tiles_timed_out: AtomicU64::new(0),
            bytes_fetched: AtomicU64::new(0),
            requests_in_flight: AtomicUsize::new(0),
            requests_queued: AtomicUsize::new(0),
            ram_quads: AtomicUsize::new(0),
            ram_evictions: AtomicU64::new(0),
            disk_quads_loaded: AtomicU64::new(0),
            disk_quads_written: AtomicU64::new(0),
            gpu_uploads: AtomicU64::new(0),
            gpu_evictions: AtomicU64::new(0),
            gpu_tiles: AtomicUsize::new(0),
        }
    }

    // === Scheduler tracking ===

    pub fn quad_requested(&self) {
        self.quads_requested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quad arriving with every child good.
    pub fn quad_assembled(&self) {
        self.quads_assembled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quad arriving with some children failed.
    pub fn quad_partial(&self) {
        self.quads_assembled.fetch_add(1, Ordering::Relaxed);
        self.quads_partial.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a quad arriving with no usable child.
    pub fn quad_failed(&self) {
        self.quads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quad_retried(&self) {
        self.quads_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quad_discarded(&self) {
        self.quads_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decode_failed(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    // === Fetch tracking ===

    pub fn tile_fetched(&self, bytes: u64) {
        self.tiles_fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn tile_failed(&self) {
        self.tiles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tile_timed_out(&self) {
        self.tiles_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the limiter gauges.
    pub fn set_request_gauges(&self, in_flight: usize, queued: usize) {
        self.requests_in_flight.store(in_flight, Ordering::Relaxed);
        self.requests_queued.store(queued, Ordering::Relaxed);
    }

    // === Cache tracking ===

    pub fn set_ram_quads(&self, count: usize) {
        self.ram_quads.store(count, Ordering::Relaxed);
    }

    pub fn ram_evicted(&self, count: u64) {
        self.ram_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn disk_loaded(&self, count: u64) {
        self.disk_quads_loaded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn disk_written(&self, count: u64) {
        self.disk_quads_written.fetch_add(count, Ordering::Relaxed);
    }

    // === GPU tracking ===

    pub fn gpu_uploaded(&self, count: u64) {
        self.gpu_uploads.fetch_add(count, Ordering::Relaxed);
    }

    pub fn gpu_evicted(&self, count: u64) {
        self.gpu_evictions.fetch_add(count, Ordering::Relaxed);
    }

    pub fn set_gpu_tiles(&self, count: usize) {
        self.gpu_tiles.store(count, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot of all metrics.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let uptime = self.start_time.elapsed();
        let tiles_fetched = self.tiles_fetched.load(Ordering::Relaxed);
        let bytes_fetched = self.bytes_fetched.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64();
        let per_second = |v: u64| if secs > 0.0 { v as f64 / secs } else { 0.0 };

        TelemetrySnapshot {
            uptime,
            quads_requested: self.quads_requested.load(Ordering::Relaxed),
            quads_assembled: self.quads_assembled.load(Ordering::Relaxed),
            quads_partial: self.quads_partial.load(Ordering::Relaxed),
            quads_failed: self.quads_failed.load(Ordering::Relaxed),
            quads_retried: self.quads_retried.load(Ordering::Relaxed),
            quads_discarded: self.quads_discarded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            tiles_fetched,
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            tiles_timed_out: self.tiles_timed_out.load(Ordering::Relaxed),
            bytes_fetched,
            requests_in_flight: self.requests_in_flight.load(Ordering::Relaxed),
            requests_queued: self.requests_queued.load(Ordering::Relaxed),
            ram_quads: self.ram_quads.load(Ordering::Relaxed),
            ram_evictions: self.ram_evictions.load(Ordering::Relaxed),
            disk_quads_loaded: self.disk_quads_loaded.load(Ordering::Relaxed),
            disk_quads_written: self.disk_quads_written.load(Ordering::Relaxed),
            gpu_uploads: self.gpu_uploads.load(Ordering::Relaxed),
            gpu_evictions: self.gpu_evictions.load(Ordering::Relaxed),
            gpu_tiles: self.gpu_tiles.load(Ordering::Relaxed),
            tiles_per_second: per_second(tiles_fetched),
            bytes_per_second: per_second(bytes_fetched),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_outcomes() {
        let metrics = PipelineMetrics::new();
        metrics.quad_requested();
        metrics.quad_requested();
        metrics.quad_requested();
        metrics.quad_assembled();
        metrics.quad_partial();
        metrics.quad_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.quads_requested, 3);
        assert_eq!(snapshot.quads_assembled, 2);
        assert_eq!(snapshot.quads_partial, 1);
        assert_eq!(snapshot.quads_failed, 1);
    }

    #[test]
    fn test_fetch_tracking() {
        let metrics = PipelineMetrics::new();
        metrics.tile_fetched(100);
        metrics.tile_fetched(50);
        metrics.tile_failed();
        metrics.tile_timed_out();
        metrics.set_request_gauges(4, 9);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tiles_fetched, 2);
        assert_eq!(snapshot.bytes_fetched, 150);
        assert_eq!(snapshot.tiles_failed, 1);
        assert_eq!(snapshot.tiles_timed_out, 1);
        assert_eq!(snapshot.requests_in_flight, 4);
        assert_eq!(snapshot.requests_queued, 9);
    }

    #[test]
    fn test_gauges_overwrite() {
        let metrics = PipelineMetrics::new();
        metrics.set_ram_quads(10);
        metrics.set_ram_quads(7);
        metrics.set_gpu_tiles(3);
        metrics.gpu_uploaded(3);
        metrics.gpu_evicted(1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.ram_quads, 7);
        assert_eq!(snapshot.gpu_tiles, 3);
        assert_eq!(snapshot.gpu_uploads, 3);
        assert_eq!(snapshot.gpu_evictions, 1);
    }
}
