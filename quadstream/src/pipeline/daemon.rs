//! Fetch daemon: the request-issuing half of the pipeline.
//!
//! The [`FetchDaemon`] owns the rate limiter, the slot limiter and the quad
//! assembler, and is the only place tile sources are called from. It runs as
//! one tokio task and talks to the scheduler purely through channels.
//!
//! ```text
//!               FetchCommand
//! Scheduler ───────────────────► ┌──────────────┐
//!                                │ RateLimiter  │  quads / window
//!                                └──────┬───────┘
//!                                       ▼
//!                                ┌──────────────┐
//!                                │ SlotLimiter  │  quads in flight
//!                                └──────┬───────┘
//!                                       ▼
//!                                ┌──────────────┐   fetch(child) x4
//!                                │QuadAssembler │ ◄──────────────► TileSource
//!                                └──────┬───────┘
//!                 Quad                  │
//! Scheduler ◄───────────────────────────┘
//! ```
//!
//! A slot is held from the moment a quad's children are dispatched until the
//! quad is emitted, whether every child succeeded, failed or timed out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{QuadAssembler, RateLimiter, SlotLimiter};
use crate::config::PipelineConfig;
use crate::provider::{into_tile_layer, TileSource};
use crate::telemetry::PipelineMetrics;
use crate::tile::{NetworkStatus, Quad, TileId, TileLayer};

/// Messages from the scheduler to the fetch daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchCommand {
    /// Queue quads for fetching. Quads already queued or in flight are ignored.
    Request(Vec<TileId>),
    /// Drop quads that are still waiting for admission or a slot.
    /// Quads already dispatched run to completion.
    Withdraw(Vec<TileId>),
    /// Stop (true) or resume (false) admitting new quads.
    Pause(bool),
    /// Abandon every queued and in-flight quad. Nothing is emitted for them.
    CancelAll,
}

/// Fetch daemon configuration.
#[derive(Debug, Clone)]
pub struct FetchDaemonConfig {
    /// Quads admitted per `rate_interval`.
    pub rate_limit: usize,
    pub rate_interval: Duration,
    /// Quads dispatched concurrently.
    pub max_in_flight: usize,
    /// Deadline for all children of a quad, from dispatch.
    pub assembly_timeout: Duration,
}

impl Default for FetchDaemonConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for FetchDaemonConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            rate_limit: config.rate_limit,
            rate_interval: config.rate_interval,
            max_in_flight: config.max_in_flight,
            assembly_timeout: config.assembly_timeout,
        }
    }
}

/// Long-running task that turns quad requests into assembled quads.
pub struct FetchDaemon<S: TileSource> {
    source: Arc<S>,
    rate: RateLimiter<TileId>,
    slots: SlotLimiter<TileId>,
    assembler: QuadAssembler,
    /// Quads queued in either limiter or being assembled.
    known: HashSet<TileId>,
    tasks: JoinSet<TileLayer>,
    /// Abort handles of child fetches still running, by child id.
    running: HashMap<TileId, AbortHandle>,
    paused: bool,
    metrics: Arc<PipelineMetrics>,
    command_rx: mpsc::UnboundedReceiver<FetchCommand>,
    quad_tx: mpsc::UnboundedSender<Quad>,
}

impl<S: TileSource> FetchDaemon<S> {
    /// Creates a daemon with its channels.
    ///
    /// Returns the daemon, the command sender and the receiver on which
    /// assembled quads are delivered.
    pub fn new(
        config: FetchDaemonConfig,
        source: Arc<S>,
        metrics: Arc<PipelineMetrics>,
    ) -> (
        Self,
        mpsc::UnboundedSender<FetchCommand>,
        mpsc::UnboundedReceiver<Quad>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (quad_tx, quad_rx) = mpsc::unbounded_channel();

        let daemon = Self {
            source,
            rate: RateLimiter::new(config.rate_limit, config.rate_interval),
            slots: SlotLimiter::new(config.max_in_flight),
            assembler: QuadAssembler::new(config.assembly_timeout),
            known: HashSet::new(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            paused: false,
            metrics,
            command_rx,
            quad_tx,
        };

        (daemon, command_tx, quad_rx)
    }

    /// Runs the daemon until shutdown is signalled or the command channel
    /// closes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            source = self.source.name(),
            rate = self.rate.limit(),
            max_in_flight = self.slots.limit(),
            "Fetch daemon starting"
        );

        loop {
            let wake_at = self.next_wake(now());

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Fetch daemon shutting down");
                    break;
                }

                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("Fetch command channel closed");
                        break;
                    }
                },

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    match joined {
                        Ok(tile) => self.handle_tile(tile),
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!(error = %e, "Tile fetch task panicked"),
                    }
                }

                _ = sleep_until(wake_at) => {}
            }

            self.pump(now());
        }

        self.discard_all();
        info!("Fetch daemon stopped");
    }

    fn handle_command(&mut self, command: FetchCommand) {
        match command {
            FetchCommand::Request(quads) => {
                let fresh: Vec<TileId> = quads
                    .into_iter()
                    .filter(|q| self.known.insert(*q))
                    .collect();
                if fresh.is_empty() {
                    return;
                }
                trace!(count = fresh.len(), "Queueing quad requests");
                self.rate.enqueue(fresh);
                if !self.paused {
                    let admitted = self.rate.release(now());
                    self.dispatch(admitted);
                }
            }
            FetchCommand::Withdraw(quads) => {
                let withdrawn: HashSet<TileId> = quads.into_iter().collect();
                self.rate.retain(|q| !withdrawn.contains(q));
                self.slots.retain_queued(|q| !withdrawn.contains(q));
                let slots = &self.slots;
                self.known
                    .retain(|q| !withdrawn.contains(q) || slots.is_in_flight(q));
            }
            FetchCommand::Pause(paused) => {
                if self.paused != paused {
                    info!(paused, "Fetch admission {}", if paused { "paused" } else { "resumed" });
                }
                self.paused = paused;
            }
            FetchCommand::CancelAll => {
                let dropped = self.discard_all();
                info!(dropped, "Cancelled all outstanding quad requests");
            }
        }
    }

    fn handle_tile(&mut self, tile: TileLayer) {
        self.running.remove(&tile.id);
        match tile.network_info.status {
            NetworkStatus::Good => self.metrics.tile_fetched(tile.data.len() as u64),
            NetworkStatus::Timeout => self.metrics.tile_timed_out(),
            _ => self.metrics.tile_failed(),
        }
        if let Some(quad) = self.assembler.deliver(tile) {
            self.finish(quad);
        }
    }

    /// Expires overdue quads and admits queued work.
    fn pump(&mut self, now: Instant) {
        for quad in self.assembler.expire(now) {
            for child in &quad.tiles {
                if let Some(handle) = self.running.remove(&child.id) {
                    handle.abort();
                    self.metrics.tile_timed_out();
                }
            }
            self.finish(quad);
        }

        if !self.paused {
            let admitted = self.rate.release(now);
            self.dispatch(admitted);
        }

        self.metrics.set_request_gauges(
            self.slots.in_flight_len(),
            self.rate.queued() + self.slots.queued_len(),
        );
    }

    fn dispatch(&mut self, admitted: Vec<TileId>) {
        if admitted.is_empty() {
            return;
        }
        let started = self.slots.request(admitted);
        self.start(started);
    }

    fn start(&mut self, quads: Vec<TileId>) {
        let now = now();
        for quad in quads {
            for child in self.assembler.load(quad, now) {
                let source = Arc::clone(&self.source);
                let handle = self
                    .tasks
                    .spawn(async move { into_tile_layer(child, source.fetch(child).await) });
                self.running.insert(child, handle);
            }
            debug!(quad = %quad, in_flight = self.slots.in_flight_len(), "Quad dispatched");
        }
    }

    fn finish(&mut self, quad: Quad) {
        self.known.remove(&quad.id);
        let next = self.slots.complete(&quad.id);
        self.start(next);

        trace!(quad = %quad.id, status = %quad.network_info().status, "Quad assembled");
        if self.quad_tx.send(quad).is_err() {
            debug!("Quad receiver dropped");
        }
    }

    fn discard_all(&mut self) -> usize {
        let dropped = self.known.len();
        self.rate.clear();
        self.slots.clear();
        self.assembler.abandon_all();
        self.tasks.abort_all();
        self.running.clear();
        self.known.clear();
        self.metrics.set_request_gauges(0, 0);
        dropped
    }

    fn next_wake(&self, now: Instant) -> Option<Instant> {
        let release = if self.paused {
            None
        } else {
            self.rate.next_release_at(now)
        };
        match (release, self.assembler.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Current time on the tokio clock, so paused-clock tests drive the limiters.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
