//! Groups per-tile fetch results into quads.
//!
//! A quad is loaded once with its expected children. Each delivered child is
//! a terminal outcome, good or failed. When the last expected child arrives
//! the quad is emitted exactly once and its state is dropped. Children still
//! missing when the deadline passes are recorded as timed out, which also
//! completes the quad.
//!
//! ```text
//!   load(Q) ──► pending{Q: expected=4, received=0}
//!   deliver(c0..c3) ──► received=4 ──► emit Quad(Q)
//!   expire(now ≥ requested_at + timeout) ──► fill Timeout ──► emit Quad(Q)
//! ```

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::tile::{NetworkStatus, Quad, TileId, TileLayer};

#[derive(Debug)]
struct PendingQuad {
    expected: Vec<TileId>,
    received: Vec<TileLayer>,
    requested_at: Instant,
}

impl PendingQuad {
    fn is_complete(&self) -> bool {
        self.received.len() == self.expected.len()
    }

    fn has(&self, id: &TileId) -> bool {
        self.received.iter().any(|t| t.id == *id)
    }
}

/// Collects children until each pending quad has a result for all of them.
#[derive(Debug)]
pub struct QuadAssembler {
    timeout: Duration,
    pending: HashMap<TileId, PendingQuad>,
}

impl QuadAssembler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Starts assembling `quad`. Returns the child tiles to fetch.
    ///
    /// Loading a quad that is already pending returns nothing; the running
    /// assembly keeps its original deadline.
    pub fn load(&mut self, quad: TileId, now: Instant) -> Vec<TileId> {
        if self.pending.contains_key(&quad) {
            return Vec::new();
        }
        let expected = quad.children().to_vec();
        self.pending.insert(
            quad,
            PendingQuad {
                expected: expected.clone(),
                received: Vec::with_capacity(expected.len()),
                requested_at: now,
            },
        );
        expected
    }

    /// Records one child outcome. Returns the quad if this completed it.
    ///
    /// Tiles whose quad is not pending (late after a timeout, or abandoned)
    /// and duplicate deliveries are dropped.
    pub fn deliver(&mut self, tile: TileLayer) -> Option<Quad> {
        let parent = tile.id.parent()?;
        let pending = self.pending.get_mut(&parent)?;
        if !pending.expected.contains(&tile.id) || pending.has(&tile.id) {
            tracing::trace!(tile = %tile.id, "Dropping duplicate tile delivery");
            return None;
        }
        pending.received.push(tile);
        if !pending.is_complete() {
            return None;
        }
        let done = self.pending.remove(&parent)?;
        Some(Quad::new(parent, done.received))
    }

    /// Completes every quad whose deadline has passed, filling the missing
    /// children with [`NetworkStatus::Timeout`].
    pub fn expire(&mut self, now: Instant) -> Vec<Quad> {
        let timeout = self.timeout;
        let overdue: Vec<TileId> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.requested_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();

        overdue
            .into_iter()
            .filter_map(|id| self.pending.remove(&id).map(|p| (id, p)))
            .map(|(id, mut pending)| {
                let missing: Vec<TileId> = pending
                    .expected
                    .iter()
                    .filter(|c| !pending.has(c))
                    .copied()
                    .collect();
                tracing::debug!(quad = %id, missing = missing.len(), "Quad assembly timed out");
                pending.received.extend(
                    missing
                        .into_iter()
                        .map(|c| TileLayer::failed(c, NetworkStatus::Timeout)),
                );
                Quad::new(id, pending.received)
            })
            .collect()
    }

    /// Children of pending quads that have not reported yet.
    pub fn outstanding_children(&self, quad: &TileId) -> Vec<TileId> {
        self.pending
            .get(quad)
            .map(|p| {
                p.expected
                    .iter()
                    .filter(|c| !p.has(c))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Earliest deadline among pending quads.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .map(|p| p.requested_at + self.timeout)
            .min()
    }

    /// Forgets every pending quad without emitting it.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn is_pending(&self, quad: &TileId) -> bool {
        self.pending.contains_key(quad)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::QuadCompleteness;
    use bytes::Bytes;
    use proptest::prelude::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn good(id: TileId) -> TileLayer {
        TileLayer::good(id, Bytes::from_static(b"px"))
    }

    #[test]
    fn test_load_returns_children() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let quad = TileId::new(4, 3, 5);
        assert_eq!(assembler.load(quad, Instant::now()), quad.children().to_vec());
        assert!(assembler.load(quad, Instant::now()).is_empty());
        assert_eq!(assembler.pending_len(), 1);
    }

    #[test]
    fn test_completes_after_last_child() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let quad = TileId::new(4, 3, 5);
        let children = assembler.load(quad, Instant::now());

        assert!(assembler.deliver(good(children[0])).is_none());
        assert!(assembler
            .deliver(TileLayer::failed(children[1], NetworkStatus::NotFound))
            .is_none());
        assert!(assembler.deliver(good(children[2])).is_none());
        let done = assembler.deliver(good(children[3])).unwrap();

        assert_eq!(done.id, quad);
        assert_eq!(done.completeness(), QuadCompleteness::Partial);
        assert_eq!(done.tiles[1].network_info.status, NetworkStatus::NotFound);
        assert!(!assembler.is_pending(&quad));
    }

    #[test]
    fn test_duplicate_and_unknown_tiles_ignored() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let quad = TileId::new(2, 1, 1);
        let children = assembler.load(quad, Instant::now());

        assert!(assembler.deliver(good(children[0])).is_none());
        assert!(assembler.deliver(good(children[0])).is_none());
        assert_eq!(assembler.outstanding_children(&quad).len(), 3);

        assert!(assembler.deliver(good(TileId::new(3, 0, 0))).is_none());
        assert!(assembler.deliver(good(TileId::new(0, 0, 0))).is_none());
    }

    #[test]
    fn test_expire_fills_timeouts() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let t0 = Instant::now();
        let quad = TileId::new(5, 8, 9);
        let children = assembler.load(quad, t0);
        assembler.deliver(good(children[2]));

        assert!(assembler.expire(t0 + Duration::from_secs(9)).is_empty());
        let expired = assembler.expire(t0 + TIMEOUT);
        assert_eq!(expired.len(), 1);

        let done = &expired[0];
        assert_eq!(done.tiles.len(), 4);
        assert!(done.tiles[2].is_good());
        for i in [0, 1, 3] {
            assert_eq!(done.tiles[i].network_info.status, NetworkStatus::Timeout);
        }

        // A straggler after the timeout does not emit again
        assert!(assembler.deliver(good(children[0])).is_none());
    }

    #[test]
    fn test_next_deadline() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let t0 = Instant::now();
        assert_eq!(assembler.next_deadline(), None);
        assembler.load(TileId::new(3, 0, 0), t0 + Duration::from_secs(2));
        assembler.load(TileId::new(3, 1, 0), t0);
        assert_eq!(assembler.next_deadline(), Some(t0 + TIMEOUT));
    }

    #[test]
    fn test_abandon_all() {
        let mut assembler = QuadAssembler::new(TIMEOUT);
        let quad = TileId::new(3, 0, 0);
        let children = assembler.load(quad, Instant::now());
        assert_eq!(assembler.abandon_all(), 1);
        assert!(assembler.deliver(good(children[0])).is_none());
    }

    proptest! {
        #[test]
        fn prop_completes_once_in_any_order(order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()) {
            let mut assembler = QuadAssembler::new(TIMEOUT);
            let quad = TileId::new(6, 20, 33);
            let children = assembler.load(quad, Instant::now());

            let mut emitted = Vec::new();
            for (n, i) in order.iter().enumerate() {
                let result = assembler.deliver(good(children[*i]));
                if n < 3 {
                    prop_assert!(result.is_none());
                }
                emitted.extend(result);
            }
            prop_assert_eq!(emitted.len(), 1);
            prop_assert_eq!(emitted[0].completeness(), QuadCompleteness::Full);
            // Children come back in canonical order
            let ids: Vec<TileId> = emitted[0].tiles.iter().map(|t| t.id).collect();
            prop_assert_eq!(ids, quad.children().to_vec());
        }
    }
}
