//! Delivered tile payloads and assembled quads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::id::{TileId, QUAD_ARITY};

/// Outcome of fetching (and validating) one tile.
///
/// Variants are ordered from best to worst so that [`NetworkInfo::join`]
/// can pick the worst status of a quad with `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NetworkStatus {
    /// Payload received.
    Good,
    /// The source has no tile at this address.
    NotFound,
    /// Payload received but failed validation.
    DecodeError,
    /// Transport-level failure.
    NetworkError,
    /// No terminal outcome before the assembly deadline.
    Timeout,
}

impl NetworkStatus {
    /// Short label for logs and status displays.
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Good => "good",
            NetworkStatus::NotFound => "not_found",
            NetworkStatus::DecodeError => "decode_error",
            NetworkStatus::NetworkError => "network_error",
            NetworkStatus::Timeout => "timeout",
        }
    }

    /// True for [`NetworkStatus::Good`].
    pub fn is_good(&self) -> bool {
        matches!(self, NetworkStatus::Good)
    }
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-fetch metadata attached to every delivered tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Fetch outcome.
    pub status: NetworkStatus,
    /// Completion time in milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
}

impl NetworkInfo {
    /// Creates an info stamped with the current wall-clock time.
    pub fn now(status: NetworkStatus) -> Self {
        Self {
            status,
            timestamp_ms: utc_now_ms(),
        }
    }

    /// Creates an info with an explicit timestamp.
    pub fn at(status: NetworkStatus, timestamp_ms: u64) -> Self {
        Self {
            status,
            timestamp_ms,
        }
    }

    /// Combines two infos: the worse status and the older timestamp win.
    pub fn join(self, other: NetworkInfo) -> NetworkInfo {
        NetworkInfo {
            status: self.status.max(other.status),
            timestamp_ms: self.timestamp_ms.min(other.timestamp_ms),
        }
    }

    /// Folds [`NetworkInfo::join`] over an iterator. Returns `None` when empty.
    pub fn join_all<I>(infos: I) -> Option<NetworkInfo>
    where
        I: IntoIterator<Item = NetworkInfo>,
    {
        infos.into_iter().reduce(NetworkInfo::join)
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn utc_now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// One delivered tile: address, fetch metadata and raw payload.
///
/// The payload is empty unless the status is [`NetworkStatus::Good`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileLayer {
    pub id: TileId,
    pub network_info: NetworkInfo,
    pub data: Bytes,
}

impl TileLayer {
    /// Creates a successfully fetched tile.
    pub fn good(id: TileId, data: Bytes) -> Self {
        Self {
            id,
            network_info: NetworkInfo::now(NetworkStatus::Good),
            data,
        }
    }

    /// Creates a failed tile with an empty payload.
    pub fn failed(id: TileId, status: NetworkStatus) -> Self {
        Self {
            id,
            network_info: NetworkInfo::now(status),
            data: Bytes::new(),
        }
    }

    /// True if the tile carries a usable payload.
    pub fn is_good(&self) -> bool {
        self.network_info.status.is_good()
    }
}

/// Availability of a completed quad's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadCompleteness {
    /// Every child was fetched successfully.
    Full,
    /// Some children are missing or failed.
    Partial,
    /// No child could be fetched.
    Empty,
}

/// A parent tile together with its four children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quad {
    /// The parent tile; the children are `id.children()`.
    pub id: TileId,
    /// Child layers in `id.children()` order.
    pub tiles: Vec<TileLayer>,
}

impl Quad {
    /// Creates a quad, ordering `tiles` to match `id.children()`.
    pub fn new(id: TileId, mut tiles: Vec<TileLayer>) -> Self {
        let children = id.children();
        tiles.sort_by_key(|t| children.iter().position(|c| *c == t.id).unwrap_or(QUAD_ARITY));
        Self { id, tiles }
    }

    /// Joined network info of all children.
    pub fn network_info(&self) -> NetworkInfo {
        NetworkInfo::join_all(self.tiles.iter().map(|t| t.network_info))
            .unwrap_or_else(|| NetworkInfo::now(NetworkStatus::Timeout))
    }

    /// Classifies the quad by how many children carry payloads.
    pub fn completeness(&self) -> QuadCompleteness {
        let good = self.tiles.iter().filter(|t| t.is_good()).count();
        if good == QUAD_ARITY && self.tiles.len() == QUAD_ARITY {
            QuadCompleteness::Full
        } else if good == 0 {
            QuadCompleteness::Empty
        } else {
            QuadCompleteness::Partial
        }
    }

    /// Children carrying a usable payload.
    pub fn good_tiles(&self) -> impl Iterator<Item = &TileLayer> {
        self.tiles.iter().filter(|t| t.is_good())
    }

    /// Combines a newer fetch of the same quad with this one.
    ///
    /// Each child takes the newer layer when it is good, otherwise this
    /// quad's layer if that one is good. Good children are never lost.
    pub fn merge(&self, newer: Quad) -> Quad {
        let mut tiles: Vec<TileLayer> = newer
            .tiles
            .into_iter()
            .map(|tile| {
                if tile.is_good() {
                    return tile;
                }
                self.tiles
                    .iter()
                    .find(|old| old.id == tile.id && old.is_good())
                    .cloned()
                    .unwrap_or(tile)
            })
            .collect();
        for old in self.good_tiles() {
            if !tiles.iter().any(|t| t.id == old.id) {
                tiles.push(old.clone());
            }
        }
        Quad::new(self.id, tiles)
    }

    /// Total payload size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.tiles.iter().map(|t| t.data.len()).sum()
    }
}
