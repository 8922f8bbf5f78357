//! Run command - stream tiles around a camera position.
//!
//! Drives the full pipeline headless: the GPU side is a [`TextureLayer`]
//! whose uploader only logs, so the run exercises slot allocation, eviction
//! feedback and layer resolution without a graphics device.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use quadstream::cache::NullDiskCache;
use quadstream::config::PipelineConfig;
use quadstream::draw_list::Camera;
use quadstream::gpu::{GpuTile, TextureLayer, TextureUploader, TileDictionary, NO_LAYER};
use quadstream::provider::SyntheticSource;
use quadstream::service::{ServiceHandle, StreamingService};
use quadstream::telemetry::TelemetrySnapshot;
use quadstream::tile::TileId;

use crate::error::CliError;
use crate::runner::CliRunner;

/// Interval between telemetry reports and retry passes.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Camera latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Camera longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Camera zoom level
    #[arg(long, default_value = "12")]
    pub zoom: u8,

    /// Draw-list radius in tiles around the camera
    #[arg(long, default_value = "3")]
    pub radius: u32,

    /// Stop after this many seconds (default: run until Ctrl+C)
    #[arg(long)]
    pub duration: Option<u64>,

    /// Use locally rendered tiles instead of the configured tile server
    #[arg(long)]
    pub synthetic: bool,

    /// Override the GPU budget in quads
    #[arg(long)]
    pub gpu_quads: Option<usize>,

    /// Override the RAM cache budget in quads
    #[arg(long)]
    pub ram_quads: Option<usize>,

    /// Override the number of quads fetched concurrently
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Print the final telemetry as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_overrides(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(quads) = self.gpu_quads {
            config = config.with_gpu_quad_limit(quads);
        }
        if let Some(quads) = self.ram_quads {
            config = config.with_ram_quad_limit(quads);
        }
        if let Some(max) = self.max_in_flight {
            config = config.with_max_in_flight(max);
        }
        config
    }

    fn camera(&self) -> Camera {
        Camera::new(self.lat, self.lon, self.zoom, self.radius)
    }
}

/// Uploader for headless runs that logs what a graphics backend would copy.
#[derive(Debug, Default)]
struct LoggingUploader {
    bytes_uploaded: u64,
}

impl TextureUploader for LoggingUploader {
    fn upload_layer(&mut self, slot: u16, tile: &GpuTile) {
        self.bytes_uploaded += tile.data.len() as u64;
        trace!(slot, tile = %tile.id, bytes = tile.data.len(), "Upload layer");
    }

    fn move_layer(&mut self, from: u16, to: u16) {
        trace!(from, to, "Move layer");
    }

    fn upload_dictionary(&mut self, dictionary: &TileDictionary) {
        trace!(entries = dictionary.len(), "Upload dictionary");
    }
}

/// Run the run command.
pub fn run(args: RunArgs, config_path: Option<PathBuf>) -> Result<(), CliError> {
    let runner = CliRunner::new(config_path)?;
    runner.log_startup("run");

    let config = args.apply_overrides(runner.config().pipeline.clone());
    config.validate()?;

    println!("QuadStream v{}", quadstream::VERSION);
    println!("================================");
    println!();
    println!("Camera:  {}, {} at zoom {}", args.lat, args.lon, args.zoom);
    println!("Radius:  {} tiles", args.radius);
    if args.synthetic {
        println!("Source:  synthetic");
    } else {
        println!("Source:  {}", config.url_template);
    }
    println!(
        "Budget:  {} GPU quads, {} RAM quads",
        config.gpu_quad_limit, config.ram_quad_limit
    );
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal.cancel();
    })
    .map_err(|e| CliError::Usage(format!("Failed to set signal handler: {}", e)))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let snapshot = runtime.block_on(start_and_stream(config, &args, shutdown))?;

    println!();
    if args.json {
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| CliError::Usage(format!("Failed to serialize telemetry: {}", e)))?;
        println!("{}", json);
    } else {
        print!("{}", snapshot);
    }
    Ok(())
}

async fn start_and_stream(
    config: PipelineConfig,
    args: &RunArgs,
    shutdown: CancellationToken,
) -> Result<TelemetrySnapshot, CliError> {
    let service = StreamingService::new(config);
    let handle = if args.synthetic {
        // Synthetic tiles are cheap to regenerate, nothing is persisted
        service.start(Arc::new(SyntheticSource::new()), Arc::new(NullDiskCache))?
    } else {
        service.start_http()?
    };
    stream(handle, args, shutdown).await
}

async fn stream(
    mut handle: ServiceHandle,
    args: &RunArgs,
    shutdown: CancellationToken,
) -> Result<TelemetrySnapshot, CliError> {
    let mut updates = handle
        .take_gpu_updates()
        .ok_or_else(|| CliError::Usage("GPU updates already taken".to_string()))?;
    let mut layer = TextureLayer::new(handle.config().gpu_quad_limit, LoggingUploader::default())
        .with_metrics(handle.metrics());

    let draw_list = handle.update_camera(&args.camera())?;
    info!(tiles = draw_list.len(), "Camera positioned");

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut report = tokio::time::interval(REPORT_INTERVAL);
    report.tick().await;

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = &mut deadline => {
                info!("Run duration elapsed");
                break;
            }

            update = updates.recv() => {
                let Some(update) = update else { break };
                let evicted = layer.update_gpu_tiles(&update);
                handle.report_gpu_evictions(evicted)?;
            }

            _ = report.tick() => {
                let (resolved, exact) = coverage(&layer, &draw_list);
                let snapshot = handle.telemetry();
                println!(
                    "[{:>5.0}s] quads: {} assembled, {} failed | tiles: {:.1}/s | GPU: {} tiles | coverage: {}/{} ({} exact)",
                    snapshot.uptime.as_secs_f64(),
                    snapshot.quads_assembled,
                    snapshot.quads_failed,
                    snapshot.tiles_per_second,
                    snapshot.gpu_tiles,
                    resolved,
                    draw_list.len(),
                    exact,
                );
                handle.retry_failed()?;
            }
        }
    }

    let (resolved, exact) = coverage(&layer, &draw_list);
    info!(
        resolved,
        exact,
        tiles = draw_list.len(),
        uploaded_bytes = layer.uploader().bytes_uploaded,
        "Stopping stream"
    );
    let metrics = handle.metrics();
    handle.shutdown().await;
    Ok(metrics.snapshot())
}

/// Counts draw-list tiles with any resident layer, and those resolved at
/// their own zoom.
fn coverage<U: TextureUploader>(layer: &TextureLayer<U>, draw_list: &[TileId]) -> (usize, usize) {
    let layers = layer.instance_layers(draw_list);
    let mut resolved = 0;
    let mut exact = 0;
    for (tile, (zoom, slot)) in draw_list
        .iter()
        .zip(layers.zoom_levels.iter().zip(&layers.slots))
    {
        if *slot == NO_LAYER {
            continue;
        }
        resolved += 1;
        if *zoom == tile.zoom {
            exact += 1;
        }
    }
    debug!(resolved, exact, "Draw-list coverage");
    (resolved, exact)
}
