//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted during slot lifecycle
//! transitions and an [`EventBus`] backed by `tokio::sync::broadcast`.
//! Connection failures are reported here (and only here): no caller is
//! blocked on a specific slot's creation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::pool::SlotId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool lifecycle operations.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// The fill scheduler created a new pending slot.
    SlotCreated {
        /// The new slot.
        slot: SlotId,
    },
    /// A connect attempt succeeded.
    Connected {
        /// The slot that now holds a connection.
        slot: SlotId,
        /// Zero for the first attempt.
        attempt: u32,
    },
    /// A connection was handed to a caller.
    Acquired {
        /// The slot that was checked out.
        slot: SlotId,
    },
    /// A connection was reset and returned to the pool.
    Released {
        /// The slot that was checked in.
        slot: SlotId,
        /// How long the connection was held by the caller.
        usage_duration: Duration,
    },
    /// No free connection was available and a caller joined the queue.
    Queued {
        /// Queue length after the caller was appended.
        waiters: usize,
    },
    /// A queued caller gave up after the acquire timeout.
    AcquireTimedOut {
        /// Queue length after the caller was removed.
        waiters: usize,
    },
    /// Establishing or using a connection failed.
    ConnectionFailed {
        /// The affected slot.
        slot: SlotId,
        /// The attempt that failed.
        attempt: u32,
        /// The underlying error.
        error: Arc<dyn std::error::Error + Send + Sync>,
    },
    /// A failed slot will try to connect again after `delay`.
    RetryScheduled {
        /// The slot waiting to retry.
        slot: SlotId,
        /// Fixed backoff before the next attempt.
        delay: Duration,
    },
    /// A slot was permanently removed from the pool.
    CleanedUp {
        /// The removed slot.
        slot: SlotId,
        /// Why it was removed.
        reason: CleanupReason,
    },
    /// Drain finished: every slot has closed.
    Drained,
}

// ---------------------------------------------------------------------------
// CleanupReason
// ---------------------------------------------------------------------------

/// Reason a slot was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupReason {
    /// The connection sat free longer than the idle timeout.
    IdleTimeout,
    /// Resetting the connection on release failed.
    ResetFailed,
    /// The connection ended on its own.
    Ended,
    /// The pool is draining.
    Drained,
}

impl std::fmt::Display for CleanupReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::IdleTimeout => "idle timeout",
            Self::ResetFailed => "reset failed",
            Self::Ended => "ended",
            Self::Drained => "drained",
        })
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool lifecycle events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are silently dropped (no backpressure on the
/// pool).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size.max(1));
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(PoolEvent::Drained);
    }

    #[test]
    fn zero_buffer_is_bumped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe();
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(PoolEvent::CleanedUp {
            slot: SlotId::new(7),
            reason: CleanupReason::IdleTimeout,
        });

        match rx.recv().await.expect("should receive event") {
            PoolEvent::CleanedUp { slot, reason } => {
                assert_eq!(slot, SlotId::new(7));
                assert_eq!(reason, CleanupReason::IdleTimeout);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(PoolEvent::ConnectionFailed {
            slot: SlotId::new(1),
            attempt: 0,
            error: Arc::from(Box::<dyn std::error::Error + Send + Sync>::from(
                "connection refused",
            )),
        });

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert!(matches!(e1, PoolEvent::ConnectionFailed { .. }));
        assert!(matches!(e2, PoolEvent::ConnectionFailed { .. }));
    }
}
