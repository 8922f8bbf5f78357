//! Pipeline telemetry.
//!
//! Every stage records events into one shared [`PipelineMetrics`] using
//! lock-free atomic counters. Readers take a [`TelemetrySnapshot`], an
//! immutable point-in-time copy that is cheap to print or serialize.
//!
//! ```text
//! FetchDaemon ──┐
//! Scheduler   ──┼──► PipelineMetrics ──► TelemetrySnapshot ──► CLI / JSON
//! TextureLayer ─┘    (atomic counters)    (point-in-time copy)
//! ```
//!
//! # Example
//!
//! ```
//! use quadstream::telemetry::PipelineMetrics;
//!
//! let metrics = PipelineMetrics::new();
//! metrics.quad_requested();
//! metrics.tile_fetched(1024);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.quads_requested, 1);
//! assert_eq!(snapshot.bytes_fetched, 1024);
//! ```

mod metrics;
mod snapshot;

pub use metrics::PipelineMetrics;
pub use snapshot::TelemetrySnapshot;
