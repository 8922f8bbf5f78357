//! Quad residency scheduling.
//!
//! The [`Scheduler`] decides which quads should exist at which tier:
//!
//! - **Desired**: ancestors of every tile in the current draw list
//! - **RAM**: assembled quads, bounded by `ram_quad_limit`
//! - **GPU**: the coarse-first prefix of desired resident quads, bounded by
//!   `gpu_quad_limit`
//!
//! It is a synchronous state machine. [`SchedulerDaemon`] wires it to the
//! fetch daemon, the disk cache and the render side.

mod daemon;
mod decoder;
mod policy;
mod residency;
mod state;

pub use daemon::{SchedulerChannels, SchedulerCommand, SchedulerDaemon, SchedulerDaemonConfig};
pub use decoder::{DecodeError, ImageHeaderDecoder, PassthroughDecoder, TileDecoder};
pub use policy::{
    RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_DELAY_SECS,
};
pub use residency::{Scheduler, SchedulerConfig};
pub use state::{QuadState, StateTable};
