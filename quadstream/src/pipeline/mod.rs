//! Request pipeline between the scheduler and the tile sources.
//!
//! Quad requests flow down through three synchronous stages owned by the
//! [`FetchDaemon`]:
//!
//! - [`RateLimiter`]: bounds how many quads are admitted per time window
//! - [`SlotLimiter`]: bounds how many quads are in flight at once
//! - [`QuadAssembler`]: fans a quad out into child fetches and joins the
//!   results back into one [`Quad`](crate::tile::Quad)
//!
//! The stages never block and take the current time as an argument; only the
//! tile source fetches suspend.

mod assembler;
mod daemon;
mod rate_limiter;
mod slot_limiter;

pub use assembler::QuadAssembler;
pub use daemon::{FetchCommand, FetchDaemon, FetchDaemonConfig};
pub use rate_limiter::RateLimiter;
pub use slot_limiter::SlotLimiter;
