//! GPU texture-array residency.
//!
//! The scheduler decides which tiles belong on the GPU and sends
//! [`GpuTileUpdate`] diffs. The render side applies them to a
//! [`TextureLayer`], which owns the [`GpuSlotAllocator`] and reports slots it
//! had to reclaim back to the scheduler.

mod allocator;
mod dictionary;
mod layer;
mod update;

pub use allocator::{
    GpuLayer, GpuSlotAllocator, Relocation, Resize, SlotAssignment, MAX_GPU_SLOTS, NO_LAYER,
};
pub use dictionary::TileDictionary;
pub use layer::{InstanceLayers, NullUploader, TextureLayer, TextureUploader, MAX_INSTANCES};
pub use update::{GpuTile, GpuTileUpdate};
