//! Error types for pool operations
//!
//! Only failures that belong to a specific caller are returned through
//! [`Error`]. Connection establishment, runtime and reset failures are
//! handled inside the pool and surface as [`PoolEvent`](crate::events::PoolEvent)s.
use thiserror::Error;

use crate::pool::SlotId;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers of [`Pool`](crate::pool::Pool)
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// No connection became available before the acquire timeout expired
    #[error("Acquire timeout exceeded after {timeout_ms}ms ({waiters} callers still waiting)")]
    AcquireTimeout {
        /// The configured acquire timeout in milliseconds
        timeout_ms: u64,
        /// Number of callers left in the waiting queue
        waiters: usize,
    },

    /// The pool has been drained and no longer hands out connections
    #[error("Pool has been drained")]
    Drained,

    /// `drain` was called on a pool that is already drained
    #[error("Pool already drained")]
    AlreadyDrained,

    /// A connection was released through a pool it was not acquired from
    #[error("Connection from slot {slot} is not part of this pool")]
    ForeignConnection {
        /// The slot the connection belongs to in its own pool
        slot: SlotId,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if retrying the same call later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AcquireTimeout { .. })
    }
}
