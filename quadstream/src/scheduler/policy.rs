//! Retry policy for failed quads.
//!
//! Failed quads are never re-requested on their own. When a retry is
//! triggered from outside, the policy decides per quad whether another
//! attempt is allowed yet, based on how many attempts already failed and how
//! long ago the last one did.

use std::time::Duration;

/// Default first backoff delay (1 second).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Default backoff ceiling (5 minutes).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 300;

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Which failed quads a retry trigger may re-request.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// Failed quads stay failed.
    None,

    /// Up to `max_attempts` attempts in total, each at least `delay` after
    /// the previous failure.
    Fixed { max_attempts: u32, delay: Duration },

    /// Up to `max_attempts` attempts, waiting `initial_delay * multiplier^(n-1)`
    /// after the n-th failure, capped at `max_delay`.
    ExponentialBackoff {
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(4)
    }
}

impl RetryPolicy {
    /// Exponential backoff with the default delays.
    pub fn exponential(max_attempts: u32) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Minimum wait after `failed_attempts` failures before the next attempt,
    /// or `None` if no further attempt is allowed.
    pub fn delay_after(&self, failed_attempts: u32) -> Option<Duration> {
        if failed_attempts == 0 {
            return Some(Duration::ZERO);
        }
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (failed_attempts < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if failed_attempts >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(failed_attempts as i32 - 1);
                let millis = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(millis as u64).min(*max_delay))
            }
        }
    }

    /// Whether a quad that failed `failed_attempts` times, the last one
    /// `since_failure` ago, may be requested again.
    pub fn allows_retry(&self, failed_attempts: u32, since_failure: Duration) -> bool {
        self.delay_after(failed_attempts)
            .is_some_and(|delay| since_failure >= delay)
    }

    /// Total attempts allowed, the first one included.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } | Self::ExponentialBackoff { max_attempts, .. } => {
                *max_attempts
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_never_retries() {
        let policy = RetryPolicy::None;
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.allows_retry(1, Duration::from_secs(3600)));
    }

    #[test]
    fn test_fixed() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(2));
        assert!(!policy.allows_retry(1, Duration::from_secs(1)));
        assert!(policy.allows_retry(1, Duration::from_secs(2)));
        assert!(policy.allows_retry(2, Duration::from_secs(2)));
        assert!(!policy.allows_retry(3, Duration::from_secs(60)));
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_after(4), Some(Duration::from_millis(300)));
        assert_eq!(policy.delay_after(5), None);
    }

    #[test]
    fn test_default_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(
            policy.delay_after(1),
            Some(Duration::from_millis(DEFAULT_INITIAL_DELAY_MS))
        );
    }
}
