//! Per-attempt connect context with cancellation support

use tokio_util::sync::CancellationToken;

use crate::pool::SlotId;

/// Context for a single connect attempt.
///
/// Passed to [`ConnectionFactory::connect`](crate::connection::ConnectionFactory::connect)
/// so implementations can tag their logs and abort early when the pool is
/// drained.
#[derive(Debug, Clone)]
pub struct ConnectContext {
    /// The slot this connection is being created for.
    pub slot: SlotId,
    /// Zero for the first attempt, incremented on every retry.
    pub attempt: u32,
    /// Cancelled when the pool is drained. The pool stops waiting for the
    /// connect future at that point, but implementations holding sockets
    /// may want to watch it themselves.
    pub cancellation: CancellationToken,
}

impl ConnectContext {
    /// Create a new context for the given slot and attempt.
    pub fn new(slot: SlotId, attempt: u32, cancellation: CancellationToken) -> Self {
        Self {
            slot,
            attempt,
            cancellation,
        }
    }

    /// Whether this is a retry of a previously failed attempt.
    #[must_use]
    pub fn is_retry(&self) -> bool {
        self.attempt > 0
    }

    /// Check whether the pool has asked this attempt to stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
