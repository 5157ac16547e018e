//! Jittered exponential backoff for transient provider failures.
//!
//! The delay for attempt `n` is `min(base × multiplier^n × U(0.1, 1.0),
//! ceiling)`. Full-range jitter avoids the thundering-herd problem where
//! several workers that were denied together retry together and overwhelm
//! a recovering endpoint again.
//!
//! Only failures classified transient are ever retried; everything else is
//! raised immediately so a misconfigured API key fails fast instead of
//! burning the whole backoff budget.

use rand::Rng;
use std::time::Duration;

/// Hard ceiling on any single backoff delay, independent of configuration.
const DELAY_CEILING_SECS: f64 = 60.0;

/// Backoff parameters, taken from the rate-limiting section of the config.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Base delay in seconds for attempt 0.
    pub base_secs: f64,
    /// Configured ceiling in seconds (further clamped to 60 s).
    pub max_secs: f64,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Total attempts before the caller declares exhaustion.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 1.0,
            max_secs: 60.0,
            multiplier: 2.0,
            max_attempts: 3,
        }
    }
}

impl BackoffPolicy {
    /// Compute the jittered delay for the given 0-based attempt index.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter: f64 = rand::thread_rng().gen_range(0.1..=1.0);
        self.delay_with_jitter(attempt, jitter)
    }

    /// Deterministic core, exposed for the property tests.
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let raw = self.base_secs * self.multiplier.powi(attempt as i32) * jitter;
        let ceiling = self.max_secs.min(DELAY_CEILING_SECS);
        Duration::from_secs_f64(raw.min(ceiling).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_lies_within_the_jitter_envelope() {
        // For attempt n the delay must lie in
        // [base × 2^n × 0.1, min(base × 2^n, 60)].
        let policy = BackoffPolicy::default();
        for n in 0..=10u32 {
            let unjittered = policy.base_secs * 2f64.powi(n as i32);
            let lower = (unjittered * 0.1).min(60.0);
            let upper = unjittered.min(60.0);
            for _ in 0..1000 {
                let d = policy.delay_for_attempt(n).as_secs_f64();
                assert!(
                    d >= lower - 1e-9 && d <= upper + 1e-9,
                    "attempt {}: delay {} outside [{}, {}]",
                    n,
                    d,
                    lower,
                    upper
                );
            }
        }
    }

    #[test]
    fn ceiling_binds_large_attempts() {
        let policy = BackoffPolicy {
            base_secs: 10.0,
            max_secs: 120.0,
            multiplier: 2.0,
            max_attempts: 8,
        };
        // base × 2^6 = 640 s with jitter 1.0; the 60 s hard ceiling binds
        // even though the configured max is higher.
        let d = policy.delay_with_jitter(6, 1.0);
        assert_eq!(d.as_secs_f64(), 60.0);
    }

    #[test]
    fn jitter_scales_linearly() {
        let policy = BackoffPolicy::default();
        let full = policy.delay_with_jitter(2, 1.0).as_secs_f64();
        let tenth = policy.delay_with_jitter(2, 0.1).as_secs_f64();
        assert!((full - 4.0).abs() < 1e-9);
        assert!((tenth - 0.4).abs() < 1e-9);
    }
}
