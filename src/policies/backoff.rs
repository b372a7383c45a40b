//! # Reconnect delay policy.
//!
//! [`BackoffPolicy`] decides how long the connection retry loop sleeps after
//! the `n`-th consecutive failed construction attempt (0-indexed):
//!
//! ```text
//! delay(n) = jitter( min(first × factor^n, max) )
//! ```
//!
//! The base delay depends only on `n`, so a short jittered delay never makes
//! the following delays shorter.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use connvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy::exponential(Duration::from_millis(250), Duration::from_secs(5));
//! assert_eq!(backoff.next(0), Duration::from_millis(250));
//! assert_eq!(backoff.next(2), Duration::from_secs(1));
//! assert_eq!(backoff.next(9), Duration::from_secs(5));
//!
//! let spread = backoff.with_jitter(JitterPolicy::Equal);
//! assert!(spread.next(2) >= Duration::from_millis(500));
//! ```

use std::time::Duration;

use rand::Rng;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule between failed connection attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth per consecutive failure; `1.0` keeps the delay constant.
    pub factor: f64,
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Constant two seconds, no jitter.
    fn default() -> Self {
        Self::constant(Duration::from_secs(2))
    }
}

impl BackoffPolicy {
    /// The same `delay` after every failure.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Doubling delays starting at `first`, capped at `max`.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the attempt following the `attempt`-th consecutive failure.
    pub fn next(&self, attempt: u32) -> Duration {
        self.next_with(attempt, &mut rand::rng())
    }

    /// Like [`BackoffPolicy::next`] with a caller-supplied random source.
    pub fn next_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.jitter.spread(self.base(attempt), rng)
    }

    fn base(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if secs.is_finite() && secs >= 0.0 && secs < self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_default_is_constant_two_seconds() {
        let policy = BackoffPolicy::default();
        for attempt in [0, 1, 7, u32::MAX] {
            assert_eq!(policy.next(attempt), Duration::from_secs(2));
        }
    }

    #[test]
    fn test_exponential_doubles_until_capped() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(1));
        let delays: Vec<_> = (0..6).map(|n| policy.next(n).as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_overflow_and_oversized_first_clamp_to_max() {
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));

        let inverted = BackoffPolicy::exponential(Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(inverted.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_base() {
        let mut rng = StdRng::seed_from_u64(7);
        let full = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(30))
            .with_jitter(JitterPolicy::Full);
        let equal = full.with_jitter(JitterPolicy::Equal);

        for attempt in 0..12 {
            let base = full.base(attempt).as_millis();
            assert!(full.next_with(attempt, &mut rng).as_millis() <= base);
            let d = equal.next_with(attempt, &mut rng).as_millis();
            assert!(d >= base / 2 && d <= base, "attempt {attempt}: {d}ms against base {base}ms");
        }
    }

    #[test]
    fn test_jitter_does_not_shrink_later_bases() {
        let mut rng = StdRng::seed_from_u64(11);
        let policy = BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(60))
            .with_jitter(JitterPolicy::Equal);
        let early = policy.next_with(1, &mut rng);
        let late = policy.next_with(8, &mut rng);
        assert!(late > early);
    }
}
