//! Concurrency ceiling for in-flight requests.
//!
//! Where the rate limiter bounds how fast requests are admitted, the slot
//! limiter bounds how many may be outstanding at once. Requests beyond the
//! ceiling wait in FIFO order; every completion (success, failure or timeout)
//! frees its slot and hands it to the oldest waiting request.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Bounded set of in-flight keys with a FIFO wait queue.
///
/// A key is either in flight, queued, or unknown. Requesting a key that is
/// already in flight or queued is a no-op, so callers get at most one
/// outstanding request per key.
#[derive(Debug)]
pub struct SlotLimiter<T>
where
    T: Eq + Hash + Clone,
{
    limit: usize,
    in_flight: HashSet<T>,
    queue: VecDeque<T>,
    queued: HashSet<T>,
}

impl<T> SlotLimiter<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates a limiter allowing `limit` concurrent requests.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero.
    pub fn new(limit: usize) -> Self {
        assert!(limit > 0, "slot limit must be > 0");
        Self {
            limit,
            in_flight: HashSet::with_capacity(limit),
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }
    }

    /// Requests slots for `items`. Returns the items that may start now.
    ///
    /// Items already in flight or already waiting are ignored.
    pub fn request<I>(&mut self, items: I) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        for item in items {
            if self.in_flight.contains(&item) || self.queued.contains(&item) {
                continue;
            }
            self.queued.insert(item.clone());
            self.queue.push_back(item);
        }
        self.fill()
    }

    /// Marks `item` as finished and returns the items started in its place.
    ///
    /// Completing an unknown item frees nothing.
    pub fn complete(&mut self, item: &T) -> Vec<T> {
        if !self.in_flight.remove(item) {
            return Vec::new();
        }
        self.fill()
    }

    /// Changes the ceiling. Lowering it never aborts running requests; new
    /// ones start only once the in-flight count drops below the new limit.
    pub fn set_limit(&mut self, limit: usize) -> Vec<T> {
        self.limit = limit.max(1);
        self.fill()
    }

    /// Drops every waiting item. Running requests keep their slots.
    pub fn cancel_queued(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        self.queued.clear();
        dropped
    }

    /// Forgets everything, running and waiting. Returns how many were running.
    pub fn clear(&mut self) -> usize {
        let running = self.in_flight.len();
        self.in_flight.clear();
        self.cancel_queued();
        running
    }

    /// Drops waiting items for which `keep` returns false.
    pub fn retain_queued<F>(&mut self, mut keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        let queued = &mut self.queued;
        self.queue.retain(|item| {
            let kept = keep(item);
            if !kept {
                queued.remove(item);
            }
            kept
        });
    }

    pub fn is_in_flight(&self, item: &T) -> bool {
        self.in_flight.contains(item)
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn fill(&mut self) -> Vec<T> {
        let mut started = Vec::new();
        while self.in_flight.len() < self.limit {
            let Some(item) = self.queue.pop_front() else {
                break;
            };
            self.queued.remove(&item);
            self.in_flight.insert(item.clone());
            started.push(item);
        }
        started
    }
}
