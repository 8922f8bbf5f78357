//! Messages from the scheduler to the render side.

use bytes::Bytes;

use crate::tile::TileId;

/// A tile payload ready for upload into a texture slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuTile {
    pub id: TileId,
    pub data: Bytes,
}

/// Diff between two GPU residency states.
///
/// Deletions apply before additions, so a slot freed by `deleted` can be
/// reused by `new` in the same update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuTileUpdate {
    pub deleted: Vec<TileId>,
    pub new: Vec<GpuTile>,
}

impl GpuTileUpdate {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.new.is_empty()
    }
}
