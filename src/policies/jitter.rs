//! # Randomization of reconnect delays.
//!
//! Supervisors that lose the same broker at the same moment would otherwise
//! retry in lockstep. [`JitterPolicy`] spreads their attempts:
//!
//! - [`JitterPolicy::None`]: the base delay as is
//! - [`JitterPolicy::Full`]: uniform in `[0, base]`
//! - [`JitterPolicy::Equal`]: `base/2` plus uniform in `[0, base/2]`

use std::time::Duration;

use rand::Rng;

/// How a base delay is randomized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    #[default]
    None,
    /// Widest spread; a retry may happen immediately.
    Full,
    /// Keeps at least half of the base delay.
    Equal,
}

impl JitterPolicy {
    /// Randomizes `base` according to the policy.
    pub fn spread<R: Rng + ?Sized>(self, base: Duration, rng: &mut R) -> Duration {
        let ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
        match self {
            JitterPolicy::None => base,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(half + rng.random_range(0..=ms - half))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_zero_base_stays_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        for policy in [JitterPolicy::None, JitterPolicy::Full, JitterPolicy::Equal] {
            assert_eq!(policy.spread(Duration::ZERO, &mut rng), Duration::ZERO);
        }
    }

    #[test]
    fn test_equal_keeps_half() {
        let mut rng = StdRng::seed_from_u64(3);
        let base = Duration::from_millis(1001);
        for _ in 0..200 {
            let d = JitterPolicy::Equal.spread(base, &mut rng);
            assert!(d >= Duration::from_millis(500) && d <= base);
        }
    }
}
