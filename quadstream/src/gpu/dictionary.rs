//! Tile to slot lookup table handed to the renderer.

use std::collections::HashMap;

use crate::tile::TileId;

/// Parallel arrays of packed tile ids and their texture slots.
///
/// Entries are sorted by packed id, so a shader can binary search them.
/// Both arrays always have the same length, equal to the allocator's
/// occupancy when the dictionary was generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileDictionary {
    pub packed_ids: Vec<[u32; 2]>,
    pub slots: Vec<u16>,
}

impl TileDictionary {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Looks up the slot of `id` (north-up) by binary search.
    pub fn slot_of(&self, id: &TileId) -> Option<u16> {
        let packed = id.pack();
        self.packed_ids
            .binary_search(&packed)
            .ok()
            .map(|index| self.slots[index])
    }

    /// Rebuilds the id to slot mapping.
    pub fn to_map(&self) -> HashMap<TileId, u16> {
        self.packed_ids
            .iter()
            .zip(&self.slots)
            .map(|(packed, slot)| (TileId::unpack(*packed), *slot))
            .collect()
    }
}
