//! Integration tests for the streaming service.
//!
//! These drive the complete pipeline with a locally rendered tile source:
//! camera → scheduler → fetch daemon → assembled quads → GPU updates applied
//! to a texture layer, plus disk persistence across restarts.
//!
//! Run with: `cargo test --test pipeline_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use quadstream::cache::{DiskCache, MemoryDiskCache};
use quadstream::config::PipelineConfig;
use quadstream::draw_list::Camera;
use quadstream::gpu::{GpuTileUpdate, NullUploader, TextureLayer, NO_LAYER};
use quadstream::provider::SyntheticSource;
use quadstream::service::{ServiceHandle, StreamingService};
use quadstream::tile::TileId;

// ============================================================================
// Helper Functions
// ============================================================================

/// Graz, at a zoom where a 3x3 draw list needs a handful of quads.
fn camera() -> Camera {
    Camera::new(47.07, 15.44, 6, 1)
}

fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_gpu_quad_limit(16)
        .with_ram_quad_limit(64)
        .with_rate(200, Duration::from_secs(1))
        .with_max_in_flight(4)
        .with_assembly_timeout(Duration::from_secs(2))
}

fn start(disk: Arc<MemoryDiskCache>) -> ServiceHandle {
    let source = SyntheticSource::new().with_latency(Duration::from_millis(2));
    StreamingService::new(test_config())
        .start(Arc::new(source), disk)
        .expect("valid test config")
}

/// Whether every drawn tile resolves to its own texture layer.
fn fully_resolved(layer: &TextureLayer<NullUploader>, draw_list: &[TileId]) -> bool {
    let layers = layer.instance_layers(draw_list);
    draw_list
        .iter()
        .zip(layers.zoom_levels.iter().zip(&layers.slots))
        .all(|(tile, (zoom, slot))| *slot != NO_LAYER && *zoom == tile.zoom)
}

/// Applies GPU updates until the draw list is fully resolved.
async fn apply_until_resolved(
    handle: &ServiceHandle,
    updates: &mut mpsc::UnboundedReceiver<GpuTileUpdate>,
    layer: &mut TextureLayer<NullUploader>,
    draw_list: &[TileId],
) {
    while !fully_resolved(layer, draw_list) {
        let update = tokio::time::timeout(Duration::from_secs(10), updates.recv())
            .await
            .expect("GPU update within 10s")
            .expect("GPU update channel open");
        let evicted = layer.update_gpu_tiles(&update);
        handle.report_gpu_evictions(evicted).unwrap();
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Camera update → quads fetched and assembled → GPU layer covers the view.
#[tokio::test]
async fn test_camera_to_gpu_flow() {
    let disk = Arc::new(MemoryDiskCache::new());
    let mut handle = start(Arc::clone(&disk));
    let mut updates = handle.take_gpu_updates().unwrap();
    let mut layer = TextureLayer::new(test_config().gpu_quad_limit, NullUploader);

    let draw_list = handle.update_camera(&camera()).unwrap();
    assert_eq!(draw_list.len(), 9);

    apply_until_resolved(&handle, &mut updates, &mut layer, &draw_list).await;

    let snapshot = handle.telemetry();
    assert!(snapshot.quads_requested > 0);
    assert!(snapshot.quads_assembled > 0);
    assert_eq!(snapshot.quads_failed, 0);
    assert!(layer.tile_count() <= test_config().gpu_quad_limit * 4);

    // Dictionary agrees with the per-tile lookup
    let map = layer.generate_dictionary().to_map();
    for tile in &draw_list {
        assert_eq!(map.get(tile).copied(), layer.allocator().slot_of(tile));
    }

    handle.shutdown().await;
    assert!(!disk.is_empty(), "resident quads persisted on shutdown");
}

/// Quads persisted by one session are served from disk in the next.
#[tokio::test]
async fn test_disk_cache_survives_restart() {
    let disk = Arc::new(MemoryDiskCache::new());

    let mut first = start(Arc::clone(&disk));
    let mut updates = first.take_gpu_updates().unwrap();
    let mut layer = TextureLayer::new(test_config().gpu_quad_limit, NullUploader);
    let draw_list = first.update_camera(&camera()).unwrap();
    apply_until_resolved(&first, &mut updates, &mut layer, &draw_list).await;
    first.shutdown().await;
    let stored = disk.read_all().unwrap().len();
    assert!(stored > 0);

    let mut second = start(Arc::clone(&disk));
    let mut updates = second.take_gpu_updates().unwrap();
    let mut layer = TextureLayer::new(test_config().gpu_quad_limit, NullUploader);
    let draw_list = second.update_camera(&camera()).unwrap();
    apply_until_resolved(&second, &mut updates, &mut layer, &draw_list).await;

    let snapshot = second.telemetry();
    assert_eq!(snapshot.quads_requested, 0);
    assert_eq!(snapshot.disk_quads_loaded, stored as u64);
    second.shutdown().await;
}

/// While offline nothing is requested; reconnecting resumes streaming.
#[tokio::test]
async fn test_offline_then_reconnect() {
    let mut handle = start(Arc::new(MemoryDiskCache::new()));
    let mut updates = handle.take_gpu_updates().unwrap();
    let mut layer = TextureLayer::new(test_config().gpu_quad_limit, NullUploader);

    handle.set_reachability(false).unwrap();
    let draw_list = handle.update_camera(&camera()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.telemetry().quads_requested, 0);
    assert!(updates.try_recv().is_err());

    handle.set_reachability(true).unwrap();
    apply_until_resolved(&handle, &mut updates, &mut layer, &draw_list).await;
    assert!(handle.telemetry().quads_requested > 0);

    handle.shutdown().await;
}

/// Shrinking the GPU budget keeps the coarse quads and reports the rest.
#[tokio::test]
async fn test_gpu_quad_limit_shrink() {
    let mut handle = start(Arc::new(MemoryDiskCache::new()));
    let mut updates = handle.take_gpu_updates().unwrap();
    let mut layer = TextureLayer::new(test_config().gpu_quad_limit, NullUploader);

    let draw_list = handle.update_camera(&camera()).unwrap();
    apply_until_resolved(&handle, &mut updates, &mut layer, &draw_list).await;

    // The render side shrinks first, then tells the scheduler
    let evicted = layer.set_quad_limit(1);
    handle.report_gpu_evictions(evicted).unwrap();
    handle.set_gpu_quad_limit(1).unwrap();
    assert!(layer.tile_count() <= 4);

    // Every tile still resolves, at worst to a coarse ancestor
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(update) = updates.try_recv() {
        let evicted = layer.update_gpu_tiles(&update);
        handle.report_gpu_evictions(evicted).unwrap();
    }
    let layers = layer.instance_layers(&draw_list);
    assert!(layers.slots.iter().all(|slot| *slot != NO_LAYER));
    assert!(layer.tile_count() <= 4);

    handle.shutdown().await;
}
