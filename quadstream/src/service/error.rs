//! Service error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::coord::CoordError;
use crate::provider::FetchError;
use crate::tile::TileId;

/// Errors from starting or talking to a streaming service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The tile source could not be built.
    #[error("Failed to create tile source: {0}")]
    Source(#[from] FetchError),

    /// `start` was called outside a Tokio runtime.
    #[error("No Tokio runtime available; start the service from within a runtime")]
    NoRuntime,

    /// The camera position cannot be turned into tiles.
    #[error("Invalid camera: {0}")]
    Camera(#[from] CoordError),

    /// A draw-list tile lies outside the quad-tree.
    #[error("Invalid tile {0}: zoom or coordinates out of range")]
    InvalidTile(TileId),

    /// The scheduler is gone (shut down or crashed).
    #[error("Streaming service is not running")]
    ChannelClosed,
}
