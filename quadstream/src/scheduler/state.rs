//! Per-quad bookkeeping state.
//!
//! ```text
//!                 ┌──────────────── cancel / withdraw ───────────────┐
//!                 ▼                                                  │
//!  NotRequested ──► Requested ──► Resident ──► Evicted ──► Requested ┘
//!       │              │           │  ▲
//!       │              │  (explicit retry, failed children)
//!       │              │           ▼  │
//!       │              │        Refreshing
//!       │              └──► Failed ──(explicit retry)──► Requested
//!       └──(disk cache)──► Resident
//! ```
//!
//! `NotRequested` is the implicit state of every quad the table has no entry
//! for.

use std::collections::HashMap;
use std::time::Instant;

use crate::tile::TileId;

/// Scheduling state of one quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadState {
    NotRequested,
    Requested,
    Resident,
    /// Every child failed. Only an explicit retry requests it again.
    Failed {
        attempts: u32,
        failed_at: Instant,
    },
    Evicted,
    /// Resident with failed children and re-requested by an explicit retry.
    /// The quad stays in RAM and on the GPU meanwhile.
    Refreshing,
}

impl QuadState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &QuadState) -> bool {
        use QuadState::*;
        matches!(
            (self, next),
            (NotRequested, Requested)
                | (NotRequested, Resident)
                | (Requested, Resident)
                | (Requested, Failed { .. })
                | (Requested, NotRequested)
                | (Resident, Resident)
                | (Resident, Evicted)
                | (Evicted, Requested)
                | (Evicted, Resident)
                | (Evicted, NotRequested)
                | (Failed { .. }, Requested)
                | (Resident, Refreshing)
                | (Refreshing, Resident)
                | (Refreshing, Failed { .. })
        )
    }

    /// Whether the scheduler should issue a request for this quad on its own.
    pub fn wants_request(&self) -> bool {
        matches!(self, QuadState::NotRequested | QuadState::Evicted)
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuadState::NotRequested => "not-requested",
            QuadState::Requested => "requested",
            QuadState::Resident => "resident",
            QuadState::Failed { .. } => "failed",
            QuadState::Evicted => "evicted",
            QuadState::Refreshing => "refreshing",
        }
    }
}

/// Sparse table of quad states.
#[derive(Debug, Default)]
pub struct StateTable {
    states: HashMap<TileId, QuadState>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &TileId) -> QuadState {
        self.states
            .get(id)
            .copied()
            .unwrap_or(QuadState::NotRequested)
    }

    /// Moves `id` to `next`. Illegal transitions are refused and logged.
    pub fn transition(&mut self, id: TileId, next: QuadState) -> bool {
        let current = self.get(&id);
        if !current.can_transition_to(&next) {
            tracing::warn!(
                quad = %id,
                from = current.name(),
                to = next.name(),
                "Refusing illegal quad state transition"
            );
            return false;
        }
        if next == QuadState::NotRequested {
            self.states.remove(&id);
        } else {
            self.states.insert(id, next);
        }
        true
    }

    /// Ids currently in states matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Vec<TileId>
    where
        F: Fn(&QuadState) -> bool,
    {
        self.states
            .iter()
            .filter(|(_, s)| predicate(s))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Forgets evicted entries once there are more than `limit` of them.
    /// Forgotten quads read as `NotRequested`, which schedules the same way.
    pub fn prune_evicted(&mut self, limit: usize) {
        let evicted = self
            .states
            .values()
            .filter(|s| **s == QuadState::Evicted)
            .count();
        if evicted > limit {
            self.states.retain(|_, s| *s != QuadState::Evicted);
        }
    }

    /// Forgets failed entries of quads for which `keep` is false, once there
    /// are more than `limit` of them. Returns the forgotten ids.
    pub fn prune_failed<F>(&mut self, limit: usize, keep: F) -> Vec<TileId>
    where
        F: Fn(&TileId) -> bool,
    {
        let stale = self.filter(|s| matches!(s, QuadState::Failed { .. }));
        let stale: Vec<TileId> = stale.into_iter().filter(|id| !keep(id)).collect();
        if stale.len() <= limit {
            return Vec::new();
        }
        for id in &stale {
            self.states.remove(id);
        }
        stale
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&QuadState) -> bool,
    {
        self.states.values().filter(|s| predicate(s)).count()
    }
}
