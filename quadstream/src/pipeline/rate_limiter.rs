//! Admission-rate limiter for outbound requests.
//!
//! Admits at most `limit` items per sliding window of length `period`.
//! Items beyond the budget wait in a FIFO queue and are released, in arrival
//! order, as older admissions age out of the window. Nothing is dropped
//! except by an explicit [`RateLimiter::clear`] (shutdown, cancellation).
//!
//! ```text
//! limit = 5, period = 1s, 12 items submitted at t=0
//!
//! t=0.0s  ■■■■■ □□□□□□□   (5 admitted, 7 queued)
//! t=1.0s  ■■■■■ □□        (5 more admitted)
//! t=2.0s  ■■              (last 2 admitted)
//! ```
//!
//! The limiter is a plain state machine: callers pass the current time, and
//! ask [`RateLimiter::next_release_at`] when to come back.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window rate limiter with a FIFO backlog.
#[derive(Debug)]
pub struct RateLimiter<T> {
    /// Maximum admissions per window.
    limit: usize,
    /// Window length.
    period: Duration,
    /// Admission times still inside the window, oldest first.
    admitted_at: VecDeque<Instant>,
    /// Items waiting for budget, oldest first.
    queue: VecDeque<T>,
}

impl<T> RateLimiter<T> {
    /// Creates a limiter admitting `limit` items per `period`.
    ///
    /// # Panics
    ///
    /// Panics if `limit` is zero or `period` is zero. Configuration is
    /// validated before the pipeline is built.
    pub fn new(limit: usize, period: Duration) -> Self {
        assert!(limit > 0, "rate limit must be > 0");
        assert!(!period.is_zero(), "rate period must be > 0");
        Self {
            limit,
            period,
            admitted_at: VecDeque::with_capacity(limit),
            queue: VecDeque::new(),
        }
    }

    /// Queues `items` behind any waiting items and returns those admitted now.
    pub fn submit<I>(&mut self, items: I, now: Instant) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
    {
        self.enqueue(items);
        self.release(now)
    }

    /// Queues `items` without admitting anything.
    pub fn enqueue<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.queue.extend(items);
    }

    /// Releases queued items as far as the current window allows.
    pub fn release(&mut self, now: Instant) -> Vec<T> {
        self.expire(now);

        let budget = self.limit.saturating_sub(self.admitted_at.len());
        let count = budget.min(self.queue.len());
        let released: Vec<T> = self.queue.drain(..count).collect();
        self.admitted_at
            .extend(std::iter::repeat(now).take(released.len()));
        released
    }

    /// Earliest time at which [`RateLimiter::release`] can admit something.
    ///
    /// `None` when nothing is queued.
    pub fn next_release_at(&self, now: Instant) -> Option<Instant> {
        if self.queue.is_empty() {
            return None;
        }
        let live = self
            .admitted_at
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < self.period)
            .count();
        if live < self.limit {
            return Some(now);
        }
        self.admitted_at
            .iter()
            .rev()
            .nth(self.limit - 1)
            .map(|oldest_needed| *oldest_needed + self.period)
    }

    /// Discards every queued item. Returns how many were dropped.
    ///
    /// Admission history is kept so a following burst still respects the
    /// window.
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    /// Removes queued items for which `keep` returns false.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.queue.retain(keep);
    }

    /// Number of items waiting for budget.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Configured admissions per window.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Configured window length.
    pub fn period(&self) -> Duration {
        self.period
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted_at.front() {
            if now.saturating_duration_since(*oldest) >= self.period {
                self.admitted_at.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn test_admits_up_to_limit_immediately() {
        let mut limiter = RateLimiter::new(3, SECOND);
        let now = Instant::now();
        assert_eq!(limiter.submit([1, 2], now), vec![1, 2]);
        assert_eq!(limiter.submit([3, 4], now), vec![3]);
        assert_eq!(limiter.queued(), 1);
    }

    #[test]
    fn test_twelve_requests_at_five_per_second() {
        let mut limiter = RateLimiter::new(5, SECOND);
        let t0 = Instant::now();

        let first = limiter.submit(1..=12, t0);
        assert_eq!(first, vec![1, 2, 3, 4, 5]);

        // Nothing more within the first second
        assert!(limiter.release(t0 + Duration::from_millis(500)).is_empty());
        assert!(limiter.release(t0 + Duration::from_millis(999)).is_empty());

        assert_eq!(limiter.release(t0 + SECOND), vec![6, 7, 8, 9, 10]);
        assert!(limiter.release(t0 + Duration::from_millis(1500)).is_empty());
        assert_eq!(limiter.release(t0 + 2 * SECOND), vec![11, 12]);
        assert_eq!(limiter.queued(), 0);
    }

    #[test]
    fn test_window_slides() {
        let mut limiter = RateLimiter::new(2, SECOND);
        let t0 = Instant::now();
        assert_eq!(limiter.submit(["a"], t0), vec!["a"]);
        assert_eq!(
            limiter.submit(["b", "c"], t0 + Duration::from_millis(600)),
            vec!["b"]
        );
        // "a" ages out at t0+1s, "b" is still inside the window
        assert_eq!(limiter.release(t0 + SECOND), vec!["c"]);
    }

    #[test]
    fn test_next_release_at() {
        let mut limiter = RateLimiter::new(2, SECOND);
        let t0 = Instant::now();
        assert_eq!(limiter.next_release_at(t0), None);

        limiter.submit([1, 2, 3], t0);
        assert_eq!(limiter.next_release_at(t0), Some(t0 + SECOND));

        limiter.release(t0 + SECOND);
        assert_eq!(limiter.next_release_at(t0 + SECOND), None);
    }

    #[test]
    fn test_next_release_now_when_budget_left() {
        let mut limiter = RateLimiter::new(2, SECOND);
        let t0 = Instant::now();
        limiter.submit([1, 2, 3], t0);
        let later = t0 + 2 * SECOND;
        assert_eq!(limiter.next_release_at(later), Some(later));
    }

    #[test]
    fn test_clear_discards_queue_without_resetting_window() {
        let mut limiter = RateLimiter::new(1, SECOND);
        let t0 = Instant::now();
        limiter.submit([1, 2, 3], t0);
        assert_eq!(limiter.clear(), 2);
        assert!(limiter.submit([4], t0).is_empty());
        assert_eq!(limiter.release(t0 + SECOND), vec![4]);
    }

    #[test]
    fn test_retain() {
        let mut limiter = RateLimiter::new(1, SECOND);
        let t0 = Instant::now();
        limiter.submit([1, 2, 3, 4], t0);
        limiter.retain(|v| v % 2 == 0);
        assert_eq!(limiter.release(t0 + SECOND), vec![2]);
        assert_eq!(limiter.queued(), 1);
    }

    #[test]
    #[should_panic(expected = "rate limit must be > 0")]
    fn test_zero_limit_panics() {
        let _ = RateLimiter::<u32>::new(0, SECOND);
    }
}
