//! Scheduler daemon: drives the [`Scheduler`] from channels and timers.
//!
//! ```text
//!  SchedulerCommand ─┐                      ┌──► FetchCommand ──► FetchDaemon
//!  Quad (assembled) ─┼──► SchedulerDaemon ──┼──► GpuTileUpdate ──► render side
//!  tick / persist   ─┘     (Scheduler)      └──► DiskCache (blocking pool)
//! ```
//!
//! The disk cache is read before the first command is handled, so quads on
//! disk are never requested from the network.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::residency::Scheduler;
use super::decoder::TileDecoder;
use crate::cache::{encode_quad, DiskCache};
use crate::gpu::GpuTileUpdate;
use crate::pipeline::FetchCommand;
use crate::telemetry::PipelineMetrics;
use crate::tile::{Quad, TileId};

/// Messages to the scheduler daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// New draw list in priority order, with the camera's zoom level.
    CameraUpdated { tiles: Vec<TileId>, zoom: u8 },
    /// External reachability signal.
    Reachability(bool),
    /// Re-request failed quads the retry policy allows.
    RetryFailed,
    /// Tiles the render side evicted on its own.
    GpuEvicted(Vec<TileId>),
    SetGpuQuadLimit(usize),
}

/// Timer settings of the daemon.
#[derive(Debug, Clone)]
pub struct SchedulerDaemonConfig {
    /// Reachability checks run at this interval.
    pub update_interval: Duration,
    /// Newly resident quads are written to disk at this interval.
    pub persist_interval: Duration,
}

impl Default for SchedulerDaemonConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(50),
            persist_interval: Duration::from_secs(30),
        }
    }
}

/// Channel ends the daemon uses.
pub struct SchedulerChannels {
    pub command_rx: mpsc::UnboundedReceiver<SchedulerCommand>,
    pub quad_rx: mpsc::UnboundedReceiver<Quad>,
    pub fetch_tx: mpsc::UnboundedSender<FetchCommand>,
    pub gpu_tx: mpsc::UnboundedSender<GpuTileUpdate>,
}

/// Long-running task owning the scheduler.
pub struct SchedulerDaemon<V: TileDecoder, D: DiskCache> {
    scheduler: Scheduler<V>,
    disk: Arc<D>,
    channels: SchedulerChannels,
    config: SchedulerDaemonConfig,
    metrics: Arc<PipelineMetrics>,
}

impl<V: TileDecoder, D: DiskCache> SchedulerDaemon<V, D> {
    pub fn new(
        scheduler: Scheduler<V>,
        disk: Arc<D>,
        channels: SchedulerChannels,
        config: SchedulerDaemonConfig,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            scheduler,
            disk,
            channels,
            config,
            metrics,
        }
    }

    /// Runs until shutdown is signalled or the command channel closes.
    ///
    /// On exit, quads not yet on disk are written before returning.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Scheduler daemon starting");
        self.load_disk_cache().await;

        let mut tick = tokio::time::interval(self.config.update_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut persist = tokio::time::interval(self.config.persist_interval);
        persist.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately
        persist.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Scheduler daemon shutting down");
                    break;
                }

                command = self.channels.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("Scheduler command channel closed");
                        break;
                    }
                },

                Some(quad) = self.channels.quad_rx.recv() => {
                    let now = now();
                    self.scheduler.receive_quad(quad, now);
                    while let Ok(quad) = self.channels.quad_rx.try_recv() {
                        self.scheduler.receive_quad(quad, now);
                    }
                }

                _ = tick.tick() => {
                    if let Some(command) = self.scheduler.check_reachability(now()) {
                        self.send_fetch(vec![command]);
                    }
                }

                _ = persist.tick() => self.persist().await,
            }

            self.flush();
        }

        self.persist().await;
        info!("Scheduler daemon stopped");
    }

    fn handle_command(&mut self, command: SchedulerCommand) {
        let commands = match command {
            SchedulerCommand::CameraUpdated { tiles, zoom } => {
                self.scheduler.update_desired(&tiles, zoom)
            }
            SchedulerCommand::Reachability(online) => {
                self.scheduler.set_network_reachability(online, now())
            }
            SchedulerCommand::RetryFailed => {
                self.scheduler.retry_failed(now()).into_iter().collect()
            }
            SchedulerCommand::GpuEvicted(tiles) => {
                self.metrics.gpu_evicted(tiles.len() as u64);
                self.scheduler.gpu_evicted(&tiles);
                Vec::new()
            }
            SchedulerCommand::SetGpuQuadLimit(limit) => {
                self.scheduler.set_gpu_quad_limit(limit);
                Vec::new()
            }
        };
        self.send_fetch(commands);
    }

    /// Pushes pending GPU changes and enforces the RAM limit.
    fn flush(&mut self) {
        if let Some(update) = self.scheduler.update_gpu_quads() {
            if self.channels.gpu_tx.send(update).is_err() {
                debug!("GPU update receiver dropped");
            }
        }
        self.scheduler.purge_ram_cache();
    }

    fn send_fetch(&self, commands: Vec<FetchCommand>) {
        for command in commands {
            if self.channels.fetch_tx.send(command).is_err() {
                debug!("Fetch daemon gone, dropping command");
            }
        }
    }

    async fn load_disk_cache(&mut self) {
        let disk = Arc::clone(&self.disk);
        match tokio::task::spawn_blocking(move || disk.read_all()).await {
            Ok(Ok(entries)) => {
                self.scheduler.load_disk_cache(entries);
                self.scheduler.purge_ram_cache();
            }
            Ok(Err(e)) => warn!(error = %e, "Failed to read disk cache, starting empty"),
            Err(e) => warn!(error = %e, "Disk cache reader task failed"),
        }
    }

    async fn persist(&mut self) {
        let batch = self.scheduler.take_persist_batch();
        if batch.is_empty() {
            return;
        }
        let disk = Arc::clone(&self.disk);
        let result = tokio::task::spawn_blocking(move || {
            let mut written = 0u64;
            for quad in &batch {
                let outcome = encode_quad(quad).and_then(|bytes| disk.write(quad.id, &bytes));
                match outcome {
                    Ok(()) => written += 1,
                    Err(e) => warn!(quad = %quad.id, error = %e, "Failed to persist quad"),
                }
            }
            written
        })
        .await;

        match result {
            Ok(written) => {
                self.metrics.disk_written(written);
                debug!(written, "Persisted quads to disk cache");
            }
            Err(e) => warn!(error = %e, "Disk cache writer task failed"),
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}
