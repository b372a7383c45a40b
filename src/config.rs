//! # Global runtime configuration.
//!
//! Provides [`Config`] centralized settings for the lifecycle components.
//!
//! Config is used in two ways:
//! 1. **Coordinator creation**: `Coordinator::builder(config)`
//! 2. **Overlay from a property map**: `Config::from_properties(&props)`
//!
//! ## Sentinel values
//! - `pool_size = 0` → default pool size (10)
//! - `drain_timeout = 0s` → graceful drain waits without bound

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::policies::BackoffPolicy;
use crate::properties::Properties;

/// Property key for the consumer worker-pool size.
pub const POOL_SIZE_KEY: &str = "connvisor.poolsize";
/// Property key for a constant reconnect delay in milliseconds.
pub const BACKOFF_MS_KEY: &str = "connvisor.backoff.ms";
/// Property key for the graceful-drain bound in milliseconds.
pub const DRAIN_TIMEOUT_MS_KEY: &str = "connvisor.drain.timeout.ms";

/// Default bound on concurrently running bind tasks.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Global configuration for the lifecycle components.
///
/// ## Field semantics
/// - `backoff`: Delay between failed connection attempts
/// - `pool_size`: Bind-task concurrency bound (`0` = default)
/// - `bind_poll`: How often a bind task re-checks for a connection
/// - `drain_poll`: How often graceful drain re-checks the registration set
/// - `drain_timeout`: Maximum graceful drain duration (`0s` = unbounded)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Retry delay policy of the connection retry loop.
    pub backoff: BackoffPolicy,

    /// Maximum number of bind tasks running at once per consumer pool.
    pub pool_size: usize,

    /// Poll interval of a bind task waiting for a connection.
    pub bind_poll: Duration,

    /// Poll interval of graceful drain.
    pub drain_poll: Duration,

    /// Upper bound of graceful drain.
    ///
    /// When exceeded, remaining registrations are force-unbound and
    /// `LifecycleError::DrainTimeout` is returned.
    pub drain_timeout: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the worker-pool size, substituting the default for `0`.
    #[inline]
    pub fn pool_size_or_default(&self) -> usize {
        if self.pool_size == 0 {
            DEFAULT_POOL_SIZE
        } else {
            self.pool_size
        }
    }

    /// Returns the drain bound as an `Option`.
    ///
    /// - `None` → wait until drained
    /// - `Some(d)` → give up after `d`
    #[inline]
    pub fn drain_limit(&self) -> Option<Duration> {
        if self.drain_timeout == Duration::ZERO {
            None
        } else {
            Some(self.drain_timeout)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Overlays recognized keys from a property map onto the defaults.
    ///
    /// Values that do not parse are ignored with a warning; this never fails.
    pub fn from_properties(props: &Properties) -> Self {
        let mut cfg = Self::default();
        if let Some(size) = parse_key::<usize>(props, POOL_SIZE_KEY) {
            if size == 0 {
                warn!(key = POOL_SIZE_KEY, "pool size must be positive, using default");
            } else {
                cfg.pool_size = size;
            }
        }
        if let Some(ms) = parse_key::<u64>(props, BACKOFF_MS_KEY) {
            cfg.backoff = BackoffPolicy::constant(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_key::<u64>(props, DRAIN_TIMEOUT_MS_KEY) {
            cfg.drain_timeout = Duration::from_millis(ms);
        }
        cfg
    }
}

fn parse_key<T: FromStr>(props: &Properties, key: &'static str) -> Option<T> {
    let raw = props.get_trimmed(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = raw, "can't parse property, using default");
            None
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `backoff = BackoffPolicy::default()` (constant 2s)
    /// - `pool_size = 10`
    /// - `bind_poll = 500ms`, `drain_poll = 500ms`
    /// - `drain_timeout = 60s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            pool_size: DEFAULT_POOL_SIZE,
            bind_poll: Duration::from_millis(500),
            drain_poll: Duration::from_millis(500),
            drain_timeout: Duration::from_secs(60),
            bus_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_recognized_keys() {
        let props = Properties::new()
            .with(POOL_SIZE_KEY, "4")
            .with(BACKOFF_MS_KEY, "250")
            .with(DRAIN_TIMEOUT_MS_KEY, "0");
        let cfg = Config::from_properties(&props);
        assert_eq!(cfg.pool_size_or_default(), 4);
        assert_eq!(cfg.backoff.next(3), Duration::from_millis(250));
        assert_eq!(cfg.drain_limit(), None);
    }

    #[test]
    fn test_invalid_pool_size_falls_back() {
        for raw in ["ten", "-1", "0"] {
            let cfg = Config::from_properties(&Properties::new().with(POOL_SIZE_KEY, raw));
            assert_eq!(cfg.pool_size_or_default(), DEFAULT_POOL_SIZE, "value {raw}");
        }
    }

    #[test]
    fn test_sentinels() {
        let cfg = Config {
            pool_size: 0,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.pool_size_or_default(), DEFAULT_POOL_SIZE);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(Config::default().drain_limit(), Some(Duration::from_secs(60)));
    }
}
