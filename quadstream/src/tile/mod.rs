//! Tile and quad data model.
//!
//! - [`TileId`]: value identifier of one quad-tree tile
//! - [`TileLayer`]: a delivered tile payload with its [`NetworkInfo`]
//! - [`Quad`]: a parent tile with its four delivered children
//!
//! Quads are the unit the scheduler and the RAM cache reason about; single
//! tiles are the unit of fetching and of GPU slot residency.

mod id;
mod quad;

pub use id::{Scheme, TileId, MAX_PACKED_ZOOM, QUAD_ARITY};
pub use quad::{utc_now_ms, NetworkInfo, NetworkStatus, Quad, QuadCompleteness, TileLayer};

use std::collections::HashSet;

/// A set of tiles, e.g. the camera-visible tiles of one frame.
pub type TileSet = HashSet<TileId>;
