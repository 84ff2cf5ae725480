//! # Runtime configuration.
//!
//! Plain structs with public fields and [`Default`] impls. Loading them from
//! files or flags is left to the embedding agent.
//!
//! - [`ProbeConfig`] — node probe interval and timeout.
//! - [`RetryConfig`] — retry ceiling and backoff curve of a dispatcher.
//! - [`Config`] — everything above plus worker and event-bus sizing.
//!
//! ## Sentinel values
//! - `ProbeConfig::timeout = 0s` → no timeout
//! - `Config::workers = 0` → one worker
//! - `Config::bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Settings for [`NodeProbeController`](crate::NodeProbeController).
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeConfig {
    /// Pause between the end of one probe cycle and the start of the next.
    ///
    /// Must be non-zero.
    pub interval: Duration,

    /// Maximum time a cycle waits for the backend.
    ///
    /// - `Duration::ZERO` = wait until the probe returns or the controller stops
    /// - `> 0` = the cycle reports [`ProbeError::Timeout`](crate::ProbeError::Timeout)
    pub timeout: Duration,
}

impl ProbeConfig {
    /// Builds a config with an explicit timeout, rejecting zero values.
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        let cfg = Self {
            interval,
            timeout: match timeout {
                Some(Duration::ZERO) => return Err(ConfigError::ZeroTimeout),
                Some(t) => t,
                None => Duration::ZERO,
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Returns the probe timeout as an `Option`.
    #[inline]
    pub fn probe_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Checks the non-zero interval requirement.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == Duration::ZERO {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    /// `interval = 10s`, `timeout = 0s` (none).
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::ZERO,
        }
    }
}

/// Settings for [`Dispatcher`](crate::Dispatcher).
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Requeues allowed per failure episode before the key is abandoned.
    pub max_retries: u32,
    /// Delay curve between requeues.
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    /// `max_retries = 20`, `backoff = BackoffPolicy::default()`.
    fn default() -> Self {
        Self {
            max_retries: 20,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Aggregate configuration of a node agent's control loops.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Node probe settings.
    pub probe: ProbeConfig,
    /// Retry settings shared by dispatchers built from this config.
    pub retry: RetryConfig,
    /// Concurrent workers per dispatcher (`0` = one).
    pub workers: usize,
    /// Capacity of the event bus ring buffer (min 1).
    pub bus_capacity: usize,
}

impl Config {
    /// Returns the worker count, at least one.
    #[inline]
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// - `probe = ProbeConfig::default()`
    /// - `retry = RetryConfig::default()`
    /// - `workers = 1`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            retry: RetryConfig::default(),
            workers: 1,
            bus_capacity: 1024,
        }
    }
}
