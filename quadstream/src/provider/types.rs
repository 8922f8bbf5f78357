//! Tile source types and traits

use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

use crate::tile::{NetworkStatus, TileId, TileLayer};

/// Errors a tile source can report for one fetch.
///
/// These are recoverable: the pipeline turns them into a per-tile
/// [`NetworkStatus`] and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The source has no tile at this address.
    #[error("Tile not found: {0}")]
    NotFound(String),

    /// Transport or server failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl FetchError {
    /// Status recorded on the tile for this error.
    pub fn status(&self) -> NetworkStatus {
        match self {
            FetchError::NotFound(_) => NetworkStatus::NotFound,
            FetchError::Network(_) => NetworkStatus::NetworkError,
            FetchError::Timeout(_) => NetworkStatus::Timeout,
        }
    }
}

/// Converts a fetch outcome into a delivered tile.
pub fn into_tile_layer(id: TileId, result: Result<Bytes, FetchError>) -> TileLayer {
    match result {
        Ok(data) => TileLayer::good(id, data),
        Err(e) => {
            tracing::debug!(tile = %id, error = %e, "Tile fetch failed");
            TileLayer::failed(id, e.status())
        }
    }
}

/// Asynchronous source of raw tile bytes (network, disk, synthetic).
///
/// The pipeline keeps at most one outstanding call per tile. Sources have no
/// cancel primitive; a call that is no longer wanted simply has its result
/// discarded.
pub trait TileSource: Send + Sync + 'static {
    /// Fetches the payload of one tile.
    fn fetch(&self, id: TileId) -> impl Future<Output = Result<Bytes, FetchError>> + Send;

    /// Returns the source's name for logging and identification.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_status() {
        assert_eq!(
            FetchError::NotFound("x".into()).status(),
            NetworkStatus::NotFound
        );
        assert_eq!(
            FetchError::Network("x".into()).status(),
            NetworkStatus::NetworkError
        );
        assert_eq!(
            FetchError::Timeout("x".into()).status(),
            NetworkStatus::Timeout
        );
    }

    #[test]
    fn test_into_tile_layer() {
        let id = TileId::new(4, 3, 2);
        let good = into_tile_layer(id, Ok(Bytes::from_static(b"abc")));
        assert!(good.is_good());
        assert_eq!(good.data.as_ref(), b"abc");

        let bad = into_tile_layer(id, Err(FetchError::Network("reset".into())));
        assert_eq!(bad.network_info.status, NetworkStatus::NetworkError);
        assert!(bad.data.is_empty());
    }
}
