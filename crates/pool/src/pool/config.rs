//! Pool configuration types

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for a connection pool
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Label attached to every log record of this pool
    pub name: String,
    /// Connections kept open even without demand (clamped to `max_size`)
    pub min_size: usize,
    /// Upper bound on pending + free + used connections
    pub max_size: usize,
    /// How long a free connection may sit unused before it is closed.
    /// `None` disables eviction.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub idle_timeout: Option<Duration>,
    /// Fixed delay before a failed connection is attempted again
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub retry_delay: Duration,
    /// How long `acquire` waits in the queue. `None` or zero waits forever.
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub acquire_timeout: Option<Duration>,
    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            min_size: 10,
            max_size: 50,
            idle_timeout: Some(Duration::from_secs(300)),
            retry_delay: Duration::from_secs(5),
            acquire_timeout: Some(Duration::from_secs(60)),
            event_buffer: 1024,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration, returning an error if invalid.
    ///
    /// `min_size > max_size` is not an error; see
    /// [`effective_min_size`](Self::effective_min_size).
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.idle_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration(
                "idle_timeout must be greater than zero (use None to disable eviction)",
            ));
        }
        Ok(())
    }

    /// `min_size` clamped to `max_size`.
    #[must_use]
    pub fn effective_min_size(&self) -> usize {
        self.min_size.min(self.max_size)
    }

    /// The acquire timeout, or `None` when waiting is unbounded.
    #[must_use]
    pub fn effective_acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout.filter(|t| !t.is_zero())
    }
}
