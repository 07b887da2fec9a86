// Retry backoff policy

use rand::Rng;

/// Base retry delay (1s)
pub const DEFAULT_BASE_DELAY_MS: i64 = 1000;

/// Retry delay ceiling (60s)
pub const DEFAULT_MAX_DELAY_MS: i64 = 60_000;

/// Upper bound on random jitter added to each delay (250ms)
pub const DEFAULT_JITTER_MS: i64 = 250;

/// Exponential backoff with a ceiling and random jitter.
///
/// delay = min(max_delay, base_delay * 2^retries) + jitter(0..jitter)
///
/// The jitter spreads retries across items and clients so a backend
/// recovering from an outage is not hit by synchronized replays.
/// There is no maximum retry count: a missed inspection submission is
/// worse than unbounded retry, so items stay queued until they deliver
/// or are explicitly removed.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_delay_ms: i64,
    max_delay_ms: i64,
    jitter_ms: i64,
}

impl BackoffPolicy {
    pub fn new(base_delay_ms: i64, max_delay_ms: i64, jitter_ms: i64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_ms,
        }
    }

    /// Delay before the attempt after `retries` failures.
    ///
    /// retries = 1 -> 2s, 2 -> 4s, 3 -> 8s, ... capped at the ceiling,
    /// plus jitter.
    pub fn delay_for(&self, retries: i32) -> i64 {
        let exponent = retries.clamp(0, 31) as u32;
        let exponential = self
            .base_delay_ms
            .saturating_mul(1i64 << exponent)
            .min(self.max_delay_ms);

        exponential + self.jitter()
    }

    fn jitter(&self) -> i64 {
        if self.jitter_ms <= 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..self.jitter_ms)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_JITTER_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy::new(DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, 0)
    }

    #[test]
    fn test_backoff_doubles_per_retry() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(1), 2000);
        assert_eq!(policy.delay_for(2), 4000);
        assert_eq!(policy.delay_for(3), 8000);
    }

    #[test]
    fn test_backoff_caps_at_ceiling() {
        let policy = no_jitter();
        assert_eq!(policy.delay_for(6), 60_000);
        assert_eq!(policy.delay_for(20), 60_000);
        assert_eq!(policy.delay_for(1000), 60_000);
        assert_eq!(policy.delay_for(i32::MAX), 60_000);
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = BackoffPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!((2000..2000 + DEFAULT_JITTER_MS).contains(&delay));
        }
    }

    #[test]
    fn test_delay_never_shrinks_with_more_retries() {
        let policy = no_jitter();
        let mut previous = 0;
        for retries in 0..64 {
            let delay = policy.delay_for(retries);
            assert!(delay >= previous, "delay shrank at retry {}", retries);
            previous = delay;
        }
    }
}
