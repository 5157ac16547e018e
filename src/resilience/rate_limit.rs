//! Token-bucket rate limiter with a sliding one-minute window.
//!
//! Two cooperating mechanisms bound provider traffic:
//!
//! * A **sliding window** of request instants caps sustained throughput at
//!   `requests_per_minute` over any trailing 60-second span.
//! * A **burst-token pool** caps short-term spikes at `burst_limit`,
//!   refilling one token every `60 / burst_limit` seconds.
//!
//! One limiter handle is shared by every provider caller in the process —
//! it is the only globally mutable state in the crate. All mutation happens
//! under a single mutex whose critical section is arithmetic and list
//! trimming only; callers never hold the lock across I/O or sleeps.
//!
//! Time is passed in explicitly (`acquire_at`) so property tests can drive
//! synthetic schedules without sleeping; [`RateLimiter::acquire`] is the
//! wall-clock entry point.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::trace;

const WINDOW: Duration = Duration::from_secs(60);

/// Snapshot of limiter occupancy, for logs and the CLI status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimiterStats {
    pub requests_last_minute: usize,
    pub requests_per_minute: usize,
    pub tokens_remaining: usize,
    pub burst_limit: usize,
    pub total_observed: u64,
}

struct LimiterState {
    /// Request instants within the trailing window, oldest first.
    window: VecDeque<Instant>,
    /// Burst tokens currently available.
    tokens: usize,
    /// When tokens were last replenished.
    last_replenish: Instant,
    total_observed: u64,
}

/// Shared process-wide rate limiter. Construct once at startup and clone
/// the handle (via `Arc`) into every worker; tests build their own.
pub struct RateLimiter {
    requests_per_minute: usize,
    burst_limit: usize,
    replenish_interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(requests_per_minute: usize, burst_limit: usize) -> Self {
        let requests_per_minute = requests_per_minute.max(1);
        let burst_limit = burst_limit.max(1);
        Self {
            requests_per_minute,
            burst_limit,
            replenish_interval: Duration::from_secs_f64(60.0 / burst_limit as f64),
            state: Mutex::new(LimiterState {
                window: VecDeque::new(),
                tokens: burst_limit,
                last_replenish: Instant::now(),
                total_observed: 0,
            }),
        }
    }

    /// Try to admit one request now.
    pub fn acquire(&self) -> bool {
        self.acquire_at(Instant::now())
    }

    /// Try to admit one request at the given instant. Exposed for property
    /// tests that simulate schedules; production code uses [`acquire`].
    ///
    /// Procedure: replenish due tokens, drop window entries older than
    /// 60 s, deny on a full window, deny on an empty token pool, otherwise
    /// record and grant.
    pub fn acquire_at(&self, now: Instant) -> bool {
        let mut s = self.state.lock();

        self.replenish(&mut s, now);
        Self::trim_window(&mut s, now);

        if s.window.len() >= self.requests_per_minute {
            trace!("limiter denied: window full ({} requests)", s.window.len());
            return false;
        }
        if s.tokens == 0 {
            trace!("limiter denied: burst tokens exhausted");
            return false;
        }

        s.window.push_back(now);
        s.tokens -= 1;
        s.total_observed += 1;
        true
    }

    /// Current occupancy. Trims the window first so the numbers reflect the
    /// trailing 60 seconds from `now`.
    pub fn stats(&self) -> RateLimiterStats {
        self.stats_at(Instant::now())
    }

    pub fn stats_at(&self, now: Instant) -> RateLimiterStats {
        let mut s = self.state.lock();
        self.replenish(&mut s, now);
        Self::trim_window(&mut s, now);
        RateLimiterStats {
            requests_last_minute: s.window.len(),
            requests_per_minute: self.requests_per_minute,
            tokens_remaining: s.tokens,
            burst_limit: self.burst_limit,
            total_observed: s.total_observed,
        }
    }

    /// Restore one token per elapsed `60 / burst_limit` interval, clamped
    /// to the pool size. `last_replenish` advances by whole intervals so
    /// fractional progress is never lost.
    fn replenish(&self, s: &mut LimiterState, now: Instant) {
        let elapsed = now.saturating_duration_since(s.last_replenish);
        let intervals = (elapsed.as_secs_f64() / self.replenish_interval.as_secs_f64()) as u32;
        if intervals == 0 {
            return;
        }
        s.tokens = (s.tokens + intervals as usize).min(self.burst_limit);
        s.last_replenish += self.replenish_interval * intervals;
    }

    fn trim_window(s: &mut LimiterState, now: Instant) {
        while let Some(front) = s.window.front() {
            if now.saturating_duration_since(*front) > WINDOW {
                s.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_limit_caps_instantaneous_requests() {
        let limiter = RateLimiter::new(50, 10);
        let now = Instant::now();

        let granted = (0..20).filter(|_| limiter.acquire_at(now)).count();
        assert_eq!(granted, 10);
    }

    #[test]
    fn window_caps_sustained_requests() {
        // Large burst pool so only the window binds.
        let limiter = RateLimiter::new(5, 100);
        let now = Instant::now();

        let granted = (0..10).filter(|_| limiter.acquire_at(now)).count();
        assert_eq!(granted, 5);

        // 61 seconds later the window has drained.
        assert!(limiter.acquire_at(now + Duration::from_secs(61)));
    }

    #[test]
    fn tokens_replenish_on_schedule() {
        let limiter = RateLimiter::new(50, 10);
        let now = Instant::now();

        for _ in 0..10 {
            assert!(limiter.acquire_at(now));
        }
        assert!(!limiter.acquire_at(now));

        // One token per 6 seconds at burst_limit = 10.
        assert!(limiter.acquire_at(now + Duration::from_secs(6)));
        assert!(!limiter.acquire_at(now + Duration::from_secs(6)));
    }

    #[test]
    fn window_bound_holds_under_random_schedule() {
        // Over any trailing 60 s window the limiter must grant no more
        // than requests_per_minute acquisitions. Drive a fixed
        // pseudo-random schedule and check every window position.
        let rpm = 8;
        let limiter = RateLimiter::new(rpm, 100);
        let start = Instant::now();

        let mut granted_at: Vec<u64> = Vec::new();
        let mut t_ms: u64 = 0;
        let mut seed: u64 = 0x5eed;
        for _ in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            t_ms += seed % 900;
            if limiter.acquire_at(start + Duration::from_millis(t_ms)) {
                granted_at.push(t_ms);
            }
        }

        for (i, &t) in granted_at.iter().enumerate() {
            let in_window = granted_at[..=i]
                .iter()
                .filter(|&&g| t - g <= 60_000)
                .count();
            assert!(
                in_window <= rpm,
                "window ending at {}ms holds {} grants (limit {})",
                t,
                in_window,
                rpm
            );
        }
    }

    #[test]
    fn stats_reflect_occupancy() {
        let limiter = RateLimiter::new(50, 10);
        let now = Instant::now();
        for _ in 0..3 {
            limiter.acquire_at(now);
        }

        let stats = limiter.stats_at(now);
        assert_eq!(stats.requests_last_minute, 3);
        assert_eq!(stats.tokens_remaining, 7);
        assert_eq!(stats.total_observed, 3);
        assert_eq!(stats.burst_limit, 10);
        assert_eq!(stats.requests_per_minute, 50);
    }
}
