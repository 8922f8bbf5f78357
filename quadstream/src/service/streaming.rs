//! Streaming service wiring.
//!
//! ```text
//!            ServiceHandle
//!   camera ──► DrawListGenerator ──► SchedulerCommand ─┐
//!                                                      ▼
//!   FetchDaemon ◄── FetchCommand ── SchedulerDaemon ──► GpuTileUpdate ──► render side
//!        │                             ▲      │
//!        └────────── Quad ─────────────┘      └──► DiskCache
//! ```
//!
//! Both daemons run as Tokio tasks and share one cancellation token.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::ServiceError;
use crate::cache::{DiskCache, FsDiskCache};
use crate::config::PipelineConfig;
use crate::draw_list::{Camera, DrawListGenerator, RadiusDrawList};
use crate::gpu::GpuTileUpdate;
use crate::pipeline::{FetchDaemon, FetchDaemonConfig};
use crate::provider::{ReqwestClient, TileSource, UrlTemplate, UrlTemplateSource};
use crate::scheduler::{
    ImageHeaderDecoder, Scheduler, SchedulerChannels, SchedulerCommand, SchedulerConfig,
    SchedulerDaemon, SchedulerDaemonConfig, TileDecoder,
};
use crate::telemetry::{PipelineMetrics, TelemetrySnapshot};
use crate::tile::TileId;

/// Builder for a running pipeline.
///
/// # Example
///
/// ```ignore
/// use quadstream::config::PipelineConfig;
/// use quadstream::draw_list::Camera;
/// use quadstream::service::StreamingService;
///
/// let mut handle = StreamingService::new(PipelineConfig::default()).start_http()?;
/// let mut updates = handle.take_gpu_updates().expect("first take");
/// handle.update_camera(&Camera::new(47.07, 15.44, 14, 3))?;
///
/// while let Some(update) = updates.recv().await {
///     // apply to a TextureLayer on the render thread
/// }
/// handle.shutdown().await;
/// ```
pub struct StreamingService<V: TileDecoder = ImageHeaderDecoder> {
    config: PipelineConfig,
    decoder: V,
    draw_list: Box<dyn DrawListGenerator>,
}

impl StreamingService<ImageHeaderDecoder> {
    /// Creates a service builder using image-header validation and a
    /// radius draw list in the configured scheme.
    pub fn new(config: PipelineConfig) -> Self {
        let draw_list = Box::new(RadiusDrawList::new(1, config.scheme));
        Self {
            config,
            decoder: ImageHeaderDecoder,
            draw_list,
        }
    }
}

impl<V: TileDecoder> StreamingService<V> {
    /// Replaces the payload validator.
    pub fn with_decoder<W: TileDecoder>(self, decoder: W) -> StreamingService<W> {
        StreamingService {
            config: self.config,
            decoder,
            draw_list: self.draw_list,
        }
    }

    /// Replaces the draw-list generator used by [`ServiceHandle::update_camera`].
    pub fn with_draw_list(mut self, generator: impl DrawListGenerator + 'static) -> Self {
        self.draw_list = Box::new(generator);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Starts the pipeline against the configured HTTP tile server, with
    /// quads persisted under the configured cache directory.
    pub fn start_http(self) -> Result<ServiceHandle, ServiceError> {
        self.config.validate()?;
        let template = UrlTemplate::new(self.config.url_template.as_str(), self.config.scheme)
            .ok_or_else(|| {
                crate::config::ConfigError::InvalidValue {
                    section: "source".to_string(),
                    key: "url".to_string(),
                    value: self.config.url_template.clone(),
                    reason: "must contain {z}, {x} and {y}".to_string(),
                }
            })?;
        let client = ReqwestClient::with_timeout(self.config.http_timeout)?;
        let source = Arc::new(UrlTemplateSource::new(client, template));
        let disk = Arc::new(FsDiskCache::new(self.config.cache_directory.clone()));
        self.start(source, disk)
    }

    /// Validates the configuration and spawns both daemons on the current
    /// Tokio runtime.
    ///
    /// The disk cache is read by the scheduler before it handles the first
    /// camera update.
    pub fn start<S, D>(self, source: Arc<S>, disk: Arc<D>) -> Result<ServiceHandle, ServiceError>
    where
        S: TileSource,
        D: DiskCache,
    {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;

        let metrics = Arc::new(PipelineMetrics::new());
        let shutdown = CancellationToken::new();

        let (fetch_daemon, fetch_tx, quad_rx) = FetchDaemon::new(
            FetchDaemonConfig::from(&self.config),
            source,
            Arc::clone(&metrics),
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (gpu_tx, gpu_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::with_decoder(
            SchedulerConfig::from(&self.config),
            self.decoder,
            Arc::clone(&metrics),
        );
        let scheduler_daemon = SchedulerDaemon::new(
            scheduler,
            disk,
            SchedulerChannels {
                command_rx,
                quad_rx,
                fetch_tx,
                gpu_tx,
            },
            SchedulerDaemonConfig {
                update_interval: self.config.update_interval,
                persist_interval: self.config.persist_interval,
            },
            Arc::clone(&metrics),
        );

        let tasks = vec![
            runtime.spawn(fetch_daemon.run(shutdown.clone())),
            runtime.spawn(scheduler_daemon.run(shutdown.clone())),
        ];

        info!(
            gpu_quads = self.config.gpu_quad_limit,
            ram_quads = self.config.ram_quad_limit,
            rate = self.config.rate_limit,
            max_in_flight = self.config.max_in_flight,
            "Streaming service started"
        );

        Ok(ServiceHandle {
            commands: command_tx,
            gpu_updates: Some(gpu_rx),
            draw_list: self.draw_list,
            metrics,
            shutdown,
            tasks,
            config: self.config,
        })
    }
}

/// Control surface of a running pipeline.
///
/// Dropping the handle without [`ServiceHandle::shutdown`] cancels the
/// daemons but does not wait for the final disk write.
pub struct ServiceHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    gpu_updates: Option<mpsc::UnboundedReceiver<GpuTileUpdate>>,
    draw_list: Box<dyn DrawListGenerator>,
    metrics: Arc<PipelineMetrics>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    config: PipelineConfig,
}

impl ServiceHandle {
    /// Recomputes the draw list for `camera` and hands it to the scheduler.
    ///
    /// Returns the draw list in draw order, for resolving texture layers.
    pub fn update_camera(&self, camera: &Camera) -> Result<Vec<TileId>, ServiceError> {
        let tiles = self.draw_list.desired_tile_set(camera)?;
        let ordered = self.draw_list.sort(camera, &tiles);
        self.update_draw_list(ordered.clone(), camera.zoom)?;
        Ok(ordered)
    }

    /// Hands an externally computed draw list (priority order) to the
    /// scheduler.
    ///
    /// Rejects the whole list if any tile lies outside the quad-tree.
    pub fn update_draw_list(&self, tiles: Vec<TileId>, zoom: u8) -> Result<(), ServiceError> {
        if let Some(tile) = tiles.iter().find(|t| !t.is_valid()) {
            return Err(ServiceError::InvalidTile(*tile));
        }
        self.send(SchedulerCommand::CameraUpdated { tiles, zoom })
    }

    /// Reports network reachability. Offline pauses new requests; a long
    /// outage cancels in-flight ones.
    pub fn set_reachability(&self, online: bool) -> Result<(), ServiceError> {
        self.send(SchedulerCommand::Reachability(online))
    }

    /// Re-requests failed quads the retry policy allows.
    pub fn retry_failed(&self) -> Result<(), ServiceError> {
        self.send(SchedulerCommand::RetryFailed)
    }

    /// Reports tiles the render side evicted from the GPU on its own.
    pub fn report_gpu_evictions(&self, tiles: Vec<TileId>) -> Result<(), ServiceError> {
        if tiles.is_empty() {
            return Ok(());
        }
        self.send(SchedulerCommand::GpuEvicted(tiles))
    }

    /// Changes the GPU quad budget the scheduler targets. The render side
    /// must resize its [`TextureLayer`](crate::gpu::TextureLayer) to match.
    pub fn set_gpu_quad_limit(&self, quads: usize) -> Result<(), ServiceError> {
        self.send(SchedulerCommand::SetGpuQuadLimit(quads))
    }

    /// Takes the stream of GPU updates. Returns `None` after the first call.
    pub fn take_gpu_updates(&mut self) -> Option<mpsc::UnboundedReceiver<GpuTileUpdate>> {
        self.gpu_updates.take()
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token cancelled on shutdown; children may be handed to other tasks.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Stops both daemons and waits for them, including the final disk
    /// write of unpersisted quads.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Streaming daemon ended abnormally");
            }
        }
        info!("Streaming service stopped");
    }

    fn send(&self, command: SchedulerCommand) -> Result<(), ServiceError> {
        self.commands.send(command).map_err(|_| {
            debug!("Scheduler command dropped, service not running");
            ServiceError::ChannelClosed
        })
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::NullDiskCache;
    use crate::provider::SyntheticSource;

    #[test]
    fn test_start_requires_runtime() {
        let result = StreamingService::new(PipelineConfig::default())
            .start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache));
        assert!(matches!(result, Err(ServiceError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let config = PipelineConfig::default().with_max_in_flight(0);
        let result = StreamingService::new(config)
            .start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache));
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_camera_rejected() {
        let handle = StreamingService::new(PipelineConfig::default())
            .start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache))
            .unwrap();
        let result = handle.update_camera(&Camera::new(89.9, 0.0, 5, 1));
        assert!(matches!(result, Err(ServiceError::Camera(_))));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_out_of_range_draw_list_rejected() {
        let handle = StreamingService::new(PipelineConfig::default())
            .start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache))
            .unwrap();
        let result = handle.update_draw_list(vec![TileId::new(3, 1, 1), TileId::new(3, 9, 1)], 3);
        assert!(matches!(
            result,
            Err(ServiceError::InvalidTile(tile)) if tile == TileId::new(3, 9, 1)
        ));
        let result = handle.update_draw_list(vec![TileId::new(40, 0, 0)], 40);
        assert!(matches!(result, Err(ServiceError::InvalidTile(_))));
        assert!(handle.update_draw_list(vec![TileId::new(3, 1, 1)], 3).is_ok());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_gpu_updates_taken_once() {
        let mut handle = StreamingService::new(PipelineConfig::default())
            .start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache))
            .unwrap();
        assert!(handle.take_gpu_updates().is_some());
        assert!(handle.take_gpu_updates().is_none());
        assert!(handle.is_running());
        handle.shutdown().await;
    }
}
