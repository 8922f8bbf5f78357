//! Tile to texture-slot bookkeeping for a fixed-size texture array.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::dictionary::TileDictionary;
use crate::tile::{Scheme, TileId, QUAD_ARITY};

/// Largest slot count. Slot index `u16::MAX` is reserved for "no layer".
pub const MAX_GPU_SLOTS: usize = u16::MAX as usize;

/// Slot value standing for a tile with no resident layer.
pub const NO_LAYER: u16 = u16::MAX;

/// Result of [`GpuSlotAllocator::add_tile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAssignment {
    pub slot: u16,
    /// Occupant displaced to make room, if the array was full.
    pub evicted: Option<TileId>,
}

/// A resolved texture layer: the tile actually resident and its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuLayer {
    pub id: TileId,
    pub slot: u16,
}

/// A tile moved to another slot by a shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub id: TileId,
    pub from: u16,
    pub to: u16,
}

/// Outcome of [`GpuSlotAllocator::set_capacity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resize {
    /// Tiles that lost their slot, oldest first.
    pub evicted: Vec<TileId>,
    pub relocated: Vec<Relocation>,
}

impl Resize {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.relocated.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct Occupant {
    slot: u16,
    stamp: u64,
}

/// Bijection between resident tiles and texture array slots.
///
/// New tiles take the lowest free slot. When the array is full, the least
/// recently added (or re-added) tile gives up its slot. Ids are stored in the
/// north-up scheme.
#[derive(Debug)]
pub struct GpuSlotAllocator {
    capacity: usize,
    occupants: HashMap<TileId, Occupant>,
    /// Use order, oldest first.
    by_stamp: BTreeMap<u64, TileId>,
    free: BTreeSet<u16>,
    clock: u64,
}

impl GpuSlotAllocator {
    /// Creates an allocator with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or exceeds [`MAX_GPU_SLOTS`].
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "GPU slot capacity must be > 0");
        assert!(
            capacity <= MAX_GPU_SLOTS,
            "GPU slot capacity must fit a u16 slot index"
        );
        Self {
            capacity,
            occupants: HashMap::with_capacity(capacity),
            by_stamp: BTreeMap::new(),
            free: (0..capacity).map(|s| s as u16).collect(),
            clock: 0,
        }
    }

    /// Creates an allocator sized for `quads` quads of four tiles.
    pub fn for_quads(quads: usize) -> Self {
        Self::new(quads * QUAD_ARITY)
    }

    /// Places `id` in a slot and returns it.
    ///
    /// A tile that already has a slot keeps it and counts as freshly used.
    /// Otherwise the lowest free slot is taken, or the oldest occupant is
    /// evicted.
    pub fn add_tile(&mut self, id: TileId) -> SlotAssignment {
        let id = id.to_scheme(Scheme::NorthUp);
        let stamp = self.tick();

        if let Some(occupant) = self.occupants.get_mut(&id) {
            self.by_stamp.remove(&occupant.stamp);
            occupant.stamp = stamp;
            self.by_stamp.insert(stamp, id);
            return SlotAssignment {
                slot: occupant.slot,
                evicted: None,
            };
        }

        let (slot, evicted) = match self.free.pop_first() {
            Some(slot) => (slot, None),
            None => match self.evict_oldest() {
                Some((victim, slot)) => (slot, Some(victim)),
                // Capacity is never zero, so a full array has an occupant
                None => unreachable!("full slot array without occupants"),
            },
        };

        self.occupants.insert(id, Occupant { slot, stamp });
        self.by_stamp.insert(stamp, id);
        SlotAssignment { slot, evicted }
    }

    /// Frees the slot of `id`. Returns the freed slot, if any.
    pub fn remove_tile(&mut self, id: &TileId) -> Option<u16> {
        let id = id.to_scheme(Scheme::NorthUp);
        let occupant = self.occupants.remove(&id)?;
        self.by_stamp.remove(&occupant.stamp);
        self.free.insert(occupant.slot);
        Some(occupant.slot)
    }

    pub fn slot_of(&self, id: &TileId) -> Option<u16> {
        self.occupants
            .get(&id.to_scheme(Scheme::NorthUp))
            .map(|o| o.slot)
    }

    /// Resolves `id` to its own slot or the slot of its nearest resident
    /// ancestor.
    pub fn layer(&self, id: &TileId) -> Option<GpuLayer> {
        let mut current = Some(id.to_scheme(Scheme::NorthUp));
        while let Some(tile) = current {
            if let Some(occupant) = self.occupants.get(&tile) {
                return Some(GpuLayer {
                    id: tile,
                    slot: occupant.slot,
                });
            }
            current = tile.parent();
        }
        None
    }

    /// Current occupancy as parallel arrays, ordered by packed id.
    pub fn generate_dictionary(&self) -> TileDictionary {
        let mut entries: Vec<([u32; 2], u16)> = self
            .occupants
            .iter()
            .map(|(id, occupant)| (id.pack(), occupant.slot))
            .collect();
        entries.sort_unstable_by_key(|(packed, _)| *packed);
        let (packed_ids, slots) = entries.into_iter().unzip();
        TileDictionary { packed_ids, slots }
    }

    /// Changes the slot count to `quads` quads of four tiles.
    ///
    /// See [`GpuSlotAllocator::set_capacity`].
    pub fn set_quad_limit(&mut self, quads: usize) -> Resize {
        self.set_capacity(quads * QUAD_ARITY)
    }

    /// Changes the slot count.
    ///
    /// When shrinking, the oldest occupants are evicted until the rest fit.
    /// Survivors whose slot lies beyond the new range move to free slots
    /// inside it. The capacity is clamped to `1..=MAX_GPU_SLOTS`.
    pub fn set_capacity(&mut self, capacity: usize) -> Resize {
        let capacity = capacity.clamp(1, MAX_GPU_SLOTS);
        let mut resize = Resize::default();

        while self.occupants.len() > capacity {
            match self.evict_oldest() {
                Some((victim, _)) => resize.evicted.push(victim),
                None => break,
            }
        }

        let occupied: BTreeSet<u16> = self.occupants.values().map(|o| o.slot).collect();
        self.free = (0..capacity)
            .map(|s| s as u16)
            .filter(|s| !occupied.contains(s))
            .collect();

        let mut stranded: Vec<(TileId, u16)> = self
            .occupants
            .iter()
            .filter(|(_, o)| usize::from(o.slot) >= capacity)
            .map(|(id, o)| (*id, o.slot))
            .collect();
        stranded.sort_unstable_by_key(|(_, slot)| *slot);
        for (id, from) in stranded {
            // Occupancy fits the new capacity, so an in-range slot is free
            let Some(to) = self.free.pop_first() else {
                break;
            };
            if let Some(occupant) = self.occupants.get_mut(&id) {
                occupant.slot = to;
            }
            resize.relocated.push(Relocation { id, from, to });
        }
        self.capacity = capacity;

        if !resize.is_empty() {
            tracing::info!(
                capacity,
                evicted = resize.evicted.len(),
                relocated = resize.relocated.len(),
                "GPU slot capacity reduced"
            );
        }
        resize
    }

    /// Number of occupied slots.
    pub fn tile_count(&self) -> usize {
        self.occupants.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.occupants.contains_key(&id.to_scheme(Scheme::NorthUp))
    }

    /// Removes the oldest occupant without freeing its slot.
    fn evict_oldest(&mut self) -> Option<(TileId, u16)> {
        let (_, victim) = self.by_stamp.pop_first()?;
        let occupant = self.occupants.remove(&victim)?;
        Some((victim, occupant.slot))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}
