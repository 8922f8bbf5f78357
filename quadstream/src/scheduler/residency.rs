//! Scheduler core: the single owner of quad residency.
//!
//! The scheduler decides which quads are wanted for the current camera,
//! which of them must be requested, what the RAM cache keeps and which tiles
//! the GPU should hold. It is synchronous; [`SchedulerDaemon`] drives it from
//! channels and timers.
//!
//! [`SchedulerDaemon`]: super::SchedulerDaemon

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::decoder::{ImageHeaderDecoder, TileDecoder};
use super::policy::RetryPolicy;
use super::state::{QuadState, StateTable};
use crate::cache::{decode_quad, RamQuadCache};
use crate::config::PipelineConfig;
use crate::gpu::{GpuTile, GpuTileUpdate};
use crate::pipeline::FetchCommand;
use crate::telemetry::PipelineMetrics;
use crate::tile::{NetworkStatus, Quad, QuadCompleteness, Scheme, TileId, TileLayer};

/// Scheduler limits.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quads the GPU holds at most (four texture slots each).
    pub gpu_quad_limit: usize,
    /// Quads the RAM cache holds before unprotected ones are evicted.
    pub ram_quad_limit: usize,
    /// How long the network may be unreachable before in-flight requests
    /// are cancelled.
    pub reachability_grace: Duration,
    pub retry_policy: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for SchedulerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            gpu_quad_limit: config.gpu_quad_limit,
            ram_quad_limit: config.ram_quad_limit,
            reachability_grace: config.reachability_grace,
            retry_policy: config.retry_policy.clone(),
        }
    }
}

/// Retry bookkeeping for a resident quad with failed children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartialFailure {
    attempts: u32,
    failed_at: Instant,
}

#[derive(Debug)]
struct Reachability {
    online: bool,
    offline_since: Option<Instant>,
    /// In-flight work was cancelled during the current outage.
    cancelled: bool,
}

/// Residency bookkeeping for quads.
pub struct Scheduler<V: TileDecoder = ImageHeaderDecoder> {
    config: SchedulerConfig,
    decoder: V,
    ram: RamQuadCache,
    states: StateTable,
    /// Quads wanted by the current camera, coarse first.
    desired: Vec<TileId>,
    desired_set: HashSet<TileId>,
    camera_zoom: u8,
    /// Quads whose children the render side holds, as far as we know.
    gpu_quads: HashSet<TileId>,
    /// Quads the render side evicted some children of. Their remaining
    /// children are deleted or re-uploaded by the next GPU update.
    gpu_stale: HashSet<TileId>,
    gpu_dirty: bool,
    /// Resident quads not yet written to the disk cache.
    unpersisted: HashSet<TileId>,
    /// Unpersisted quads evicted before they were written.
    evicted_unpersisted: Vec<Quad>,
    /// Consecutive failed attempts per quad, cleared once it turns resident.
    failures: HashMap<TileId, u32>,
    /// Resident quads with failed children, retried like failed quads.
    partial: HashMap<TileId, PartialFailure>,
    reachability: Reachability,
    metrics: Arc<PipelineMetrics>,
}

impl Scheduler<ImageHeaderDecoder> {
    pub fn new(config: SchedulerConfig, metrics: Arc<PipelineMetrics>) -> Self {
        Self::with_decoder(config, ImageHeaderDecoder, metrics)
    }
}

impl<V: TileDecoder> Scheduler<V> {
    pub fn with_decoder(config: SchedulerConfig, decoder: V, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            config,
            decoder,
            ram: RamQuadCache::new(),
            states: StateTable::new(),
            desired: Vec::new(),
            desired_set: HashSet::new(),
            camera_zoom: 0,
            gpu_quads: HashSet::new(),
            gpu_stale: HashSet::new(),
            gpu_dirty: false,
            unpersisted: HashSet::new(),
            evicted_unpersisted: Vec::new(),
            failures: HashMap::new(),
            partial: HashMap::new(),
            reachability: Reachability {
                online: true,
                offline_since: None,
                cancelled: false,
            },
            metrics,
        }
    }

    // =========================================================================
    // Camera
    // =========================================================================

    /// Replaces the desired set from the camera's draw list.
    ///
    /// `tiles` are the tiles the renderer wants to draw, in priority order.
    /// Every ancestor of a drawn tile is a desired quad, so coarser data is
    /// available as fallback while finer quads load.
    ///
    /// Tiles outside the quad-tree (see [`TileId::is_valid`]) are skipped.
    ///
    /// Returns the commands for the fetch daemon.
    pub fn update_desired(&mut self, tiles: &[TileId], camera_zoom: u8) -> Vec<FetchCommand> {
        let mut desired = Vec::new();
        let mut desired_set = HashSet::new();
        for tile in tiles {
            if !tile.is_valid() {
                warn!(tile = %tile, "Skipping tile outside the quad-tree");
                continue;
            }
            let mut current = tile.to_scheme(Scheme::NorthUp).parent();
            while let Some(quad) = current {
                if !desired_set.insert(quad) {
                    break;
                }
                desired.push(quad);
                current = quad.parent();
            }
        }
        // Coarse first; stable, so draw-list priority holds within a level
        desired.sort_by_key(|q| q.zoom);

        let withdrawn: Vec<TileId> = self
            .desired
            .iter()
            .filter(|q| !desired_set.contains(q))
            .filter(|q| {
                matches!(
                    self.states.get(q),
                    QuadState::Requested | QuadState::Refreshing
                )
            })
            .copied()
            .collect();
        for quad in &withdrawn {
            self.cancel_request(*quad);
        }
        self.prune_failures(&desired_set);

        self.desired = desired;
        self.desired_set = desired_set;
        self.camera_zoom = camera_zoom;
        self.ram.touch(self.desired.iter());
        self.gpu_dirty = true;

        debug!(
            desired = self.desired.len(),
            withdrawn = withdrawn.len(),
            camera_zoom,
            "Desired quad set updated"
        );

        let mut commands = Vec::new();
        if !withdrawn.is_empty() {
            commands.push(FetchCommand::Withdraw(withdrawn));
        }
        commands.extend(self.send_quad_requests());
        commands
    }

    /// Returns an in-flight quad to where it was before the request: a
    /// refreshing quad is still resident, anything else was never loaded.
    fn cancel_request(&mut self, quad: TileId) {
        match self.states.get(&quad) {
            QuadState::Refreshing => {
                self.states.transition(quad, QuadState::Resident);
            }
            QuadState::Requested => {
                self.states.transition(quad, QuadState::NotRequested);
            }
            _ => {}
        }
    }

    /// Forgets failures of quads that left the desired set, once there are
    /// more of them than the RAM cache holds quads. Attempt counts are kept
    /// only for failed and requested quads.
    fn prune_failures(&mut self, desired_set: &HashSet<TileId>) {
        let forgotten = self
            .states
            .prune_failed(self.config.ram_quad_limit, |q| desired_set.contains(q));
        let states = &self.states;
        self.failures
            .retain(|q, _| matches!(states.get(q), QuadState::Failed { .. } | QuadState::Requested));
        if !forgotten.is_empty() {
            debug!(forgotten = forgotten.len(), "Pruned failed quads outside the view");
        }
    }

    /// Requests every desired quad that is neither resident, in flight nor
    /// failed. Nothing is requested while offline.
    pub fn send_quad_requests(&mut self) -> Option<FetchCommand> {
        if !self.reachability.online {
            return None;
        }
        let requests: Vec<TileId> = self
            .desired
            .iter()
            .filter(|q| self.states.get(q).wants_request())
            .copied()
            .collect();
        if requests.is_empty() {
            return None;
        }
        for quad in &requests {
            self.states.transition(*quad, QuadState::Requested);
            self.metrics.quad_requested();
        }
        debug!(count = requests.len(), "Requesting quads");
        Some(FetchCommand::Request(requests))
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Ingests an assembled quad.
    ///
    /// Quads that left the desired set while in flight are discarded. Each
    /// good child is validated; children that fail become
    /// [`NetworkStatus::DecodeError`]. A quad without any usable child is
    /// marked failed and reported once. A quad with some failed children is
    /// resident and remembered for [`Scheduler::retry_failed`].
    ///
    /// The result of a refresh is merged into the resident quad, so children
    /// that loaded earlier are kept.
    pub fn receive_quad(&mut self, quad: Quad, now: Instant) {
        let id = quad.id.to_scheme(Scheme::NorthUp);
        let state = self.states.get(&id);
        let in_flight = matches!(state, QuadState::Requested | QuadState::Refreshing);
        if !self.desired_set.contains(&id) || !in_flight {
            debug!(quad = %id, "Discarding quad that is no longer wanted");
            self.cancel_request(id);
            self.metrics.quad_discarded();
            return;
        }

        let tiles: Vec<TileLayer> = quad
            .tiles
            .into_iter()
            .map(|tile| self.validate(tile))
            .collect();
        let mut quad = Quad::new(id, tiles);
        if state == QuadState::Refreshing {
            if let Some(resident) = self.ram.get(&id) {
                quad = resident.merge(quad);
            }
            // Re-upload so refreshed children reach the GPU
            if self.gpu_quads.remove(&id) {
                self.gpu_stale.insert(id);
            }
        }

        match quad.completeness() {
            QuadCompleteness::Empty => {
                let attempts = self.record_failure(id);
                warn!(
                    quad = %id,
                    status = %quad.network_info().status,
                    attempts,
                    "Quad failed, no child could be loaded"
                );
                self.states.transition(
                    id,
                    QuadState::Failed {
                        attempts,
                        failed_at: now,
                    },
                );
                self.metrics.quad_failed();
            }
            QuadCompleteness::Partial => {
                let attempts = self.record_failure(id);
                debug!(
                    quad = %id,
                    status = %quad.network_info().status,
                    attempts,
                    "Quad resident with failed children"
                );
                self.metrics.quad_partial();
                self.insert_resident(quad);
                self.partial.insert(
                    id,
                    PartialFailure {
                        attempts,
                        failed_at: now,
                    },
                );
                self.unpersisted.insert(id);
            }
            QuadCompleteness::Full => {
                self.metrics.quad_assembled();
                self.insert_resident(quad);
                self.unpersisted.insert(id);
            }
        }
    }

    /// Counts one more incomplete attempt for `id`.
    fn record_failure(&mut self, id: TileId) -> u32 {
        let previous = self
            .partial
            .get(&id)
            .map(|p| p.attempts)
            .or_else(|| self.failures.get(&id).copied())
            .unwrap_or(0);
        self.failures.insert(id, previous + 1);
        previous + 1
    }

    fn validate(&self, tile: TileLayer) -> TileLayer {
        if !tile.is_good() {
            return tile;
        }
        match self.decoder.validate(tile.id, &tile.data) {
            Ok(()) => tile,
            Err(e) => {
                debug!(tile = %tile.id, error = %e, "Tile payload rejected");
                self.metrics.decode_failed();
                TileLayer::failed(tile.id, NetworkStatus::DecodeError)
            }
        }
    }

    fn insert_resident(&mut self, quad: Quad) {
        let id = quad.id;
        self.states.transition(id, QuadState::Resident);
        self.failures.remove(&id);
        self.partial.remove(&id);
        self.ram.insert(quad);
        self.metrics.set_ram_quads(self.ram.len());
        if self.desired_set.contains(&id) {
            self.gpu_dirty = true;
        }
    }

    /// Pre-populates the RAM cache from disk cache entries.
    ///
    /// Entries that do not decode are skipped. Returns how many were loaded.
    pub fn load_disk_cache<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (TileId, Bytes)>,
    {
        let mut loaded = 0;
        for (id, bytes) in entries {
            match decode_quad(&bytes) {
                Ok(quad) if quad.id.to_scheme(Scheme::NorthUp) == id.to_scheme(Scheme::NorthUp) => {
                    if quad.completeness() == QuadCompleteness::Empty {
                        continue;
                    }
                    let quad = Quad::new(id.to_scheme(Scheme::NorthUp), quad.tiles);
                    if self.states.get(&quad.id) == QuadState::NotRequested {
                        self.insert_resident(quad);
                        loaded += 1;
                    }
                }
                Ok(quad) => {
                    warn!(quad = %id, stored = %quad.id, "Disk cache entry under the wrong id")
                }
                Err(e) => warn!(quad = %id, error = %e, "Skipping unreadable disk cache entry"),
            }
        }
        self.metrics.disk_loaded(loaded as u64);
        info!(loaded, "Loaded quads from disk cache");
        loaded
    }

    // =========================================================================
    // Retry
    // =========================================================================

    /// Re-requests desired quads with failed children that the retry policy
    /// allows. Failed quads go back to requested; resident quads with failed
    /// children are refreshed and stay resident meanwhile. Returns the
    /// request command, if any.
    pub fn retry_failed(&mut self, now: Instant) -> Option<FetchCommand> {
        let policy = &self.config.retry_policy;
        let due: Vec<(TileId, QuadState)> = self
            .desired
            .iter()
            .filter_map(|q| {
                let state = self.states.get(q);
                let (attempts, failed_at) = match state {
                    QuadState::Failed {
                        attempts,
                        failed_at,
                    } => (attempts, failed_at),
                    QuadState::Resident => {
                        let partial = self.partial.get(q)?;
                        (partial.attempts, partial.failed_at)
                    }
                    _ => return None,
                };
                policy
                    .allows_retry(attempts, now.saturating_duration_since(failed_at))
                    .then_some((*q, state))
            })
            .collect();

        if due.is_empty() || !self.reachability.online {
            return None;
        }
        let due: Vec<TileId> = due
            .into_iter()
            .map(|(quad, state)| {
                let next = if state == QuadState::Resident {
                    QuadState::Refreshing
                } else {
                    QuadState::Requested
                };
                self.states.transition(quad, next);
                quad
            })
            .collect();
        for _ in &due {
            self.metrics.quad_retried();
            self.metrics.quad_requested();
        }
        info!(count = due.len(), "Retrying failed quads");
        Some(FetchCommand::Request(due))
    }

    // =========================================================================
    // Reachability
    // =========================================================================

    /// Applies a reachability change. Going offline pauses admission; coming
    /// back resumes it and re-requests whatever is still missing.
    pub fn set_network_reachability(&mut self, online: bool, now: Instant) -> Vec<FetchCommand> {
        if online == self.reachability.online {
            return Vec::new();
        }
        self.reachability.online = online;

        if !online {
            info!("Network unreachable, pausing quad requests");
            self.reachability.offline_since = Some(now);
            return vec![FetchCommand::Pause(true)];
        }

        info!(
            after_cancel = self.reachability.cancelled,
            "Network reachable again, resuming quad requests"
        );
        self.reachability.offline_since = None;
        self.reachability.cancelled = false;

        let mut commands = vec![FetchCommand::Pause(false)];
        commands.extend(self.send_quad_requests());
        commands
    }

    /// Cancels in-flight work once the network has been unreachable for
    /// longer than the grace period.
    pub fn check_reachability(&mut self, now: Instant) -> Option<FetchCommand> {
        let since = self.reachability.offline_since?;
        if self.reachability.cancelled
            || now.saturating_duration_since(since) < self.config.reachability_grace
        {
            return None;
        }
        self.reachability.cancelled = true;

        let requested = self
            .states
            .filter(|s| matches!(s, QuadState::Requested | QuadState::Refreshing));
        for quad in &requested {
            self.cancel_request(*quad);
        }
        warn!(
            cancelled = requested.len(),
            "Network unreachable beyond grace period, cancelling in-flight quads"
        );
        Some(FetchCommand::CancelAll)
    }

    pub fn is_online(&self) -> bool {
        self.reachability.online
    }

    // =========================================================================
    // GPU
    // =========================================================================

    /// Computes the GPU diff for the current desired set.
    ///
    /// The GPU receives the desired resident quads, coarse first, up to the
    /// GPU quad limit. Only good children are uploaded.
    pub fn update_gpu_quads(&mut self) -> Option<GpuTileUpdate> {
        if !self.gpu_dirty {
            return None;
        }
        self.gpu_dirty = false;

        let target: Vec<TileId> = self
            .desired
            .iter()
            .filter(|q| self.ram.contains(q))
            .take(self.config.gpu_quad_limit)
            .copied()
            .collect();
        let target_set: HashSet<TileId> = target.iter().copied().collect();

        // Stale quads in the target are uploaded again below like any quad
        // not on the GPU; the rest lose their remaining children.
        let stale = std::mem::take(&mut self.gpu_stale);
        let deleted: Vec<TileId> = self
            .gpu_quads
            .iter()
            .chain(stale.iter().filter(|q| !self.gpu_quads.contains(q)))
            .filter(|q| !target_set.contains(q))
            .flat_map(|q| q.children())
            .collect();

        let new: Vec<GpuTile> = target
            .iter()
            .filter(|q| !self.gpu_quads.contains(q))
            .filter_map(|q| self.ram.get(q))
            .flat_map(|quad| quad.good_tiles())
            .map(|tile| GpuTile {
                id: tile.id,
                data: tile.data.clone(),
            })
            .collect();

        self.gpu_quads = target_set;
        let update = GpuTileUpdate { deleted, new };
        if update.is_empty() {
            return None;
        }
        debug!(
            deleted = update.deleted.len(),
            new = update.new.len(),
            gpu_quads = self.gpu_quads.len(),
            "GPU tile update"
        );
        Some(update)
    }

    /// Records tiles the render side evicted on its own.
    ///
    /// Their quads are no longer considered GPU-resident. The next update
    /// uploads them again if they are still wanted, and otherwise deletes
    /// their remaining children. Until then they stay protected in RAM.
    pub fn gpu_evicted(&mut self, tiles: &[TileId]) {
        let mut dropped = 0;
        for tile in tiles {
            if let Some(quad) = tile.to_scheme(Scheme::NorthUp).parent() {
                if self.gpu_quads.remove(&quad) {
                    self.gpu_stale.insert(quad);
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            debug!(quads = dropped, "Render side evicted GPU quads");
            self.gpu_dirty = true;
        }
    }

    /// Changes the GPU quad budget.
    pub fn set_gpu_quad_limit(&mut self, limit: usize) {
        if limit != self.config.gpu_quad_limit {
            info!(from = self.config.gpu_quad_limit, to = limit, "GPU quad limit changed");
            self.config.gpu_quad_limit = limit;
            self.gpu_dirty = true;
        }
    }

    // =========================================================================
    // RAM cache
    // =========================================================================

    /// Evicts unprotected quads beyond the RAM limit. Desired quads and
    /// quads with children on the GPU are protected.
    ///
    /// Evicted quads that were never persisted are kept for the next
    /// [`Scheduler::take_persist_batch`].
    pub fn purge_ram_cache(&mut self) -> Vec<TileId> {
        if self.ram.len() <= self.config.ram_quad_limit {
            return Vec::new();
        }
        let protected: HashSet<TileId> = self
            .desired_set
            .iter()
            .chain(&self.gpu_quads)
            .chain(&self.gpu_stale)
            .copied()
            .collect();
        let evicted = self
            .ram
            .purge(self.config.ram_quad_limit, &protected, self.camera_zoom);

        let mut ids = Vec::with_capacity(evicted.len());
        for quad in evicted {
            self.states.transition(quad.id, QuadState::Evicted);
            self.partial.remove(&quad.id);
            ids.push(quad.id);
            if self.unpersisted.remove(&quad.id) {
                self.evicted_unpersisted.push(quad);
            }
        }
        self.states.prune_evicted(self.config.ram_quad_limit);

        if !ids.is_empty() {
            self.metrics.ram_evicted(ids.len() as u64);
            self.metrics.set_ram_quads(self.ram.len());
            debug!(evicted = ids.len(), ram = self.ram.len(), "Purged RAM quad cache");
        }
        ids
    }

    /// Quads that still need to be written to the disk cache.
    pub fn take_persist_batch(&mut self) -> Vec<Quad> {
        let mut batch = std::mem::take(&mut self.evicted_unpersisted);
        batch.extend(
            self.unpersisted
                .drain()
                .filter_map(|id| self.ram.get(&id).cloned()),
        );
        batch
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self, id: &TileId) -> QuadState {
        self.states.get(&id.to_scheme(Scheme::NorthUp))
    }

    pub fn ram_cache(&self) -> &RamQuadCache {
        &self.ram
    }

    pub fn desired_quads(&self) -> &[TileId] {
        &self.desired
    }

    pub fn is_desired(&self, id: &TileId) -> bool {
        self.desired_set.contains(&id.to_scheme(Scheme::NorthUp))
    }

    pub fn gpu_quads(&self) -> &HashSet<TileId> {
        &self.gpu_quads
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
