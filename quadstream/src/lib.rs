//! QuadStream - quad-tree map tile streaming into a bounded GPU texture array.
//!
//! Tiles are fetched in quads (the four children of a parent tile) through a
//! rate limiter, a concurrency limiter and an assembler, kept in a bounded RAM
//! cache, and uploaded into a fixed number of GPU texture slots.
//!
//! ```text
//! camera ─► draw_list ─► scheduler ─► pipeline (rate ─► slots ─► assembler) ─► provider
//!                           │  ▲                                       │
//!                           │  └──────────── assembled quads ◄─────────┘
//!                           ├─► cache (RAM, disk)
//!                           └─► gpu (slot allocator, dictionary, texture layer)
//! ```
//!
//! Start with [`service::StreamingService`].

pub mod cache;
pub mod config;
pub mod coord;
pub mod draw_list;
pub mod gpu;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod telemetry;
pub mod tile;

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
