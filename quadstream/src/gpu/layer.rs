//! Render-side owner of the slot allocator.
//!
//! [`TextureLayer`] applies [`GpuTileUpdate`]s from the scheduler, pushes
//! tile payloads and the refreshed dictionary through a [`TextureUploader`],
//! and resolves draw lists into per-instance texture layers. It is meant to
//! live on the render thread; the scheduler never touches it directly.

use std::sync::Arc;

use tracing::{debug, trace};

use super::allocator::{GpuSlotAllocator, NO_LAYER};
use super::dictionary::TileDictionary;
use super::update::{GpuTile, GpuTileUpdate};
use crate::telemetry::PipelineMetrics;
use crate::tile::TileId;

/// Most draw instances resolved per frame.
pub const MAX_INSTANCES: usize = 1024;

/// Graphics backend seam.
///
/// Implementations copy data into the texture array and the lookup tables.
pub trait TextureUploader {
    /// Writes one tile payload into texture array layer `slot`.
    fn upload_layer(&mut self, slot: u16, tile: &GpuTile);

    /// Copies layer `from` into layer `to`. Called when a shrink moves a
    /// tile, before the array is reduced.
    fn move_layer(&mut self, from: u16, to: u16);

    /// Replaces the tile to slot lookup table.
    fn upload_dictionary(&mut self, dictionary: &TileDictionary);
}

/// Uploader that discards everything, for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUploader;

impl TextureUploader for NullUploader {
    fn upload_layer(&mut self, _slot: u16, _tile: &GpuTile) {}

    fn move_layer(&mut self, _from: u16, _to: u16) {}

    fn upload_dictionary(&mut self, _dictionary: &TileDictionary) {}
}

/// Per-instance layer tables for one draw call, in draw order.
///
/// Instances whose tile has no resident layer (not even an ancestor) carry
/// zoom 0 and slot [`NO_LAYER`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceLayers {
    pub zoom_levels: Vec<u8>,
    pub slots: Vec<u16>,
}

impl InstanceLayers {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub struct TextureLayer<U: TextureUploader> {
    allocator: GpuSlotAllocator,
    uploader: U,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl<U: TextureUploader> TextureLayer<U> {
    /// Creates a layer with room for `quad_limit` quads.
    pub fn new(quad_limit: usize, uploader: U) -> Self {
        Self {
            allocator: GpuSlotAllocator::for_quads(quad_limit),
            uploader,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Applies a scheduler diff: deletions first, then uploads.
    ///
    /// Returns tiles the allocator had to evict to make room. Those must be
    /// reported back to the scheduler so its GPU view stays accurate.
    pub fn update_gpu_tiles(&mut self, update: &GpuTileUpdate) -> Vec<TileId> {
        for id in &update.deleted {
            self.allocator.remove_tile(id);
        }

        let mut evicted = Vec::new();
        for tile in &update.new {
            let assignment = self.allocator.add_tile(tile.id);
            if let Some(victim) = assignment.evicted {
                trace!(tile = %victim, slot = assignment.slot, "GPU slot reused");
                evicted.push(victim);
            }
            self.uploader.upload_layer(assignment.slot, tile);
        }

        self.refresh_dictionary();
        if let Some(metrics) = &self.metrics {
            metrics.gpu_uploaded(update.new.len() as u64);
            metrics.set_gpu_tiles(self.allocator.tile_count());
        }
        debug!(
            deleted = update.deleted.len(),
            uploaded = update.new.len(),
            evicted = evicted.len(),
            occupied = self.allocator.tile_count(),
            "Applied GPU tile update"
        );
        evicted
    }

    /// Resolves a sorted draw list to texture layers, falling back to the
    /// nearest resident ancestor. At most [`MAX_INSTANCES`] are resolved.
    pub fn instance_layers(&self, draw_list: &[TileId]) -> InstanceLayers {
        let count = draw_list.len().min(MAX_INSTANCES);
        let mut layers = InstanceLayers {
            zoom_levels: Vec::with_capacity(count),
            slots: Vec::with_capacity(count),
        };
        for tile in &draw_list[..count] {
            let (zoom, slot) = match self.allocator.layer(tile) {
                Some(layer) => (layer.id.zoom, layer.slot),
                None => (0, NO_LAYER),
            };
            layers.zoom_levels.push(zoom);
            layers.slots.push(slot);
        }
        layers
    }

    /// Changes the quad budget. Returns tiles evicted by a shrink.
    pub fn set_quad_limit(&mut self, quad_limit: usize) -> Vec<TileId> {
        let resize = self.allocator.set_quad_limit(quad_limit);
        for relocation in &resize.relocated {
            self.uploader.move_layer(relocation.from, relocation.to);
        }
        if !resize.is_empty() {
            self.refresh_dictionary();
            if let Some(metrics) = &self.metrics {
                metrics.set_gpu_tiles(self.allocator.tile_count());
            }
        }
        resize.evicted
    }

    pub fn generate_dictionary(&self) -> TileDictionary {
        self.allocator.generate_dictionary()
    }

    pub fn tile_count(&self) -> usize {
        self.allocator.tile_count()
    }

    pub fn allocator(&self) -> &GpuSlotAllocator {
        &self.allocator
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    fn refresh_dictionary(&mut self) {
        let dictionary = self.allocator.generate_dictionary();
        self.uploader.upload_dictionary(&dictionary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::collections::HashMap;

    #[derive(Default)]
    struct RecordingUploader {
        layers: HashMap<u16, TileId>,
        dictionary: TileDictionary,
        dictionary_uploads: usize,
    }

    impl TextureUploader for RecordingUploader {
        fn upload_layer(&mut self, slot: u16, tile: &GpuTile) {
            self.layers.insert(slot, tile.id);
        }

        fn move_layer(&mut self, from: u16, to: u16) {
            if let Some(id) = self.layers.remove(&from) {
                self.layers.insert(to, id);
            }
        }

        fn upload_dictionary(&mut self, dictionary: &TileDictionary) {
            self.dictionary = dictionary.clone();
            self.dictionary_uploads += 1;
        }
    }

    fn gpu_tile(id: TileId) -> GpuTile {
        GpuTile {
            id,
            data: Bytes::from_static(b"px"),
        }
    }

    fn quad_update(quad: TileId) -> GpuTileUpdate {
        GpuTileUpdate {
            deleted: Vec::new(),
            new: quad.children().iter().map(|c| gpu_tile(*c)).collect(),
        }
    }

    #[test]
    fn test_update_uploads_and_publishes_dictionary() {
        let mut layer = TextureLayer::new(2, RecordingUploader::default());
        let quad = TileId::new(3, 2, 2);
        let evicted = layer.update_gpu_tiles(&quad_update(quad));

        assert!(evicted.is_empty());
        assert_eq!(layer.tile_count(), 4);
        let uploader = layer.uploader();
        assert_eq!(uploader.layers.len(), 4);
        assert_eq!(uploader.dictionary.len(), 4);
        for (slot, id) in &uploader.layers {
            assert_eq!(uploader.dictionary.slot_of(id), Some(*slot));
        }
    }

    #[test]
    fn test_deletions_free_slots_for_new_tiles() {
        let mut layer = TextureLayer::new(1, RecordingUploader::default());
        let a = TileId::new(3, 0, 0);
        let b = TileId::new(3, 4, 4);
        layer.update_gpu_tiles(&quad_update(a));

        let mut update = quad_update(b);
        update.deleted = a.children().to_vec();
        let evicted = layer.update_gpu_tiles(&update);

        assert!(evicted.is_empty());
        assert_eq!(layer.tile_count(), 4);
        assert!(b.children().iter().all(|c| layer.allocator().contains(c)));
    }

    #[test]
    fn test_overflow_reports_evictions() {
        let mut layer = TextureLayer::new(1, RecordingUploader::default());
        layer.update_gpu_tiles(&quad_update(TileId::new(3, 0, 0)));
        let evicted = layer.update_gpu_tiles(&quad_update(TileId::new(3, 4, 4)));
        assert_eq!(evicted.len(), 4);
        assert_eq!(layer.tile_count(), 4);
    }

    #[test]
    fn test_instance_layers_use_ancestors() {
        let mut layer = TextureLayer::new(4, NullUploader);
        let quad = TileId::new(2, 1, 1);
        layer.update_gpu_tiles(&quad_update(quad));

        let resident = quad.children()[0];
        let deeper = quad.children()[3].children()[0];
        let elsewhere = TileId::new(3, 7, 0);

        let layers = layer.instance_layers(&[resident, deeper, elsewhere]);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers.zoom_levels, vec![3, 3, 0]);
        assert_eq!(layers.slots[0], layer.allocator().slot_of(&resident).unwrap());
        assert_eq!(
            layers.slots[1],
            layer.allocator().slot_of(&quad.children()[3]).unwrap()
        );
        assert_eq!(layers.slots[2], NO_LAYER);
    }

    #[test]
    fn test_instance_layers_capped() {
        let layer = TextureLayer::new(1, NullUploader);
        let draw_list: Vec<TileId> = (0..2000).map(|n| TileId::new(12, n, 0)).collect();
        assert_eq!(layer.instance_layers(&draw_list).len(), MAX_INSTANCES);
    }

    #[test]
    fn test_shrinking_quad_limit_republishes() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut layer =
            TextureLayer::new(2, RecordingUploader::default()).with_metrics(Arc::clone(&metrics));
        layer.update_gpu_tiles(&quad_update(TileId::new(3, 0, 0)));
        layer.update_gpu_tiles(&quad_update(TileId::new(3, 4, 4)));
        let uploads = layer.uploader().dictionary_uploads;

        let evicted = layer.set_quad_limit(1);
        assert_eq!(evicted.len(), 4);
        assert_eq!(layer.tile_count(), 4);
        assert_eq!(layer.uploader().dictionary_uploads, uploads + 1);
        assert_eq!(layer.uploader().dictionary.len(), 4);
        assert_eq!(metrics.snapshot().gpu_tiles, 4);
        // Survivors were moved into the remaining slots
        for (id, slot) in layer.generate_dictionary().to_map() {
            assert!(slot < 4);
            assert_eq!(layer.uploader().layers.get(&slot), Some(&id));
        }
    }
}
