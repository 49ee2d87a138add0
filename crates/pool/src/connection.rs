//! Connection capability traits
//!
//! The pool never speaks a wire protocol itself. A [`ConnectionFactory`]
//! produces [`Connection`]s; the connection reports runtime errors and
//! unexpected disconnects back through the [`ConnectionMonitor`] it was
//! handed at connect time.

use std::sync::Weak;

use async_trait::async_trait;

use crate::context::ConnectContext;
use crate::pool::SlotId;

/// Boxed error produced by factories and connections.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A live connection owned by a pool slot.
///
/// Both methods take `&self`: the pool shares the handle with the caller
/// that checked it out and must be able to close it while the caller still
/// holds it (for example during drain).
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Clear server-side session state before the connection is reused.
    async fn reset(&self) -> Result<(), BoxError>;

    /// Terminate the underlying connection.
    ///
    /// Implementations should call [`ConnectionMonitor::ended`] once the
    /// connection is gone; the pool ignores the notification if it closed
    /// the connection itself.
    async fn close(&self);
}

/// Produces new connections for a pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connection parameters (server address, credentials, options).
    type Params: Send + Sync + 'static;

    /// The connection type produced by this factory.
    type Connection: Connection;

    /// Establish a new connection.
    ///
    /// `monitor` must be kept by the connection and used to report errors
    /// or disconnects that happen after this future resolves.
    async fn connect(
        &self,
        params: &Self::Params,
        ctx: &ConnectContext,
        monitor: ConnectionMonitor,
    ) -> Result<Self::Connection, BoxError>;
}

/// Receiver side of connection notifications, implemented by the pool.
pub(crate) trait SlotObserver: Send + Sync {
    fn connection_error(&self, slot: SlotId, attempt: u32, error: BoxError);
    fn connection_ended(&self, slot: SlotId, attempt: u32);
}

/// Handle a connection uses to tell its pool about runtime failures.
///
/// Holds only a weak reference to the pool, so a connection that outlives
/// its pool can keep reporting without keeping the pool alive. Notifications
/// from a connection the pool has already discarded are ignored.
///
/// Report from the connection's own tasks, never from its `Drop` impl: the
/// pool may drop a connection while holding its internal lock.
#[derive(Clone)]
pub struct ConnectionMonitor {
    observer: Weak<dyn SlotObserver>,
    slot: SlotId,
    attempt: u32,
}

impl ConnectionMonitor {
    pub(crate) fn new(observer: Weak<dyn SlotObserver>, slot: SlotId, attempt: u32) -> Self {
        Self {
            observer,
            slot,
            attempt,
        }
    }

    /// The slot this monitor reports for.
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Report a runtime error. The pool closes the connection and schedules
    /// a retry for the slot.
    pub fn error(&self, error: impl Into<BoxError>) {
        if let Some(observer) = self.observer.upgrade() {
            observer.connection_error(self.slot, self.attempt, error.into());
        }
    }

    /// Report that the connection has ended. The pool drops the slot and
    /// backfills capacity.
    pub fn ended(&self) {
        if let Some(observer) = self.observer.upgrade() {
            observer.connection_ended(self.slot, self.attempt);
        }
    }
}

impl std::fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("slot", &self.slot)
            .field("attempt", &self.attempt)
            .field("pool_alive", &(self.observer.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl SlotObserver for Recorder {
        fn connection_error(&self, slot: SlotId, attempt: u32, error: BoxError) {
            self.calls
                .lock()
                .push(format!("error {slot}/{attempt}: {error}"));
        }

        fn connection_ended(&self, slot: SlotId, attempt: u32) {
            self.calls.lock().push(format!("ended {slot}/{attempt}"));
        }
    }

    #[test]
    fn monitor_forwards_to_live_observer() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn SlotObserver> = Arc::downgrade(&recorder) as Weak<Recorder>;
        let monitor = ConnectionMonitor::new(weak, SlotId::new(4), 1);

        monitor.error("socket reset");
        monitor.ended();

        assert_eq!(
            *recorder.calls.lock(),
            vec!["error 4/1: socket reset".to_string(), "ended 4/1".to_string()]
        );
    }

    #[test]
    fn monitor_is_silent_after_observer_dropped() {
        let recorder = Arc::new(Recorder::default());
        let weak: Weak<dyn SlotObserver> = Arc::downgrade(&recorder) as Weak<Recorder>;
        let monitor = ConnectionMonitor::new(weak, SlotId::new(1), 0);
        drop(recorder);

        // Must not panic.
        monitor.error("late");
        monitor.ended();
        assert!(format!("{monitor:?}").contains("pool_alive: false"));
    }
}
