//! Testing utilities for pools
//!
//! [`MockFactory`] produces in-memory [`MockConnection`]s and lets a test
//! script connect failures, reset failures and connect latency, and inject
//! runtime errors or disconnects into live connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{BoxError, Connection, ConnectionFactory, ConnectionMonitor};
use crate::context::ConnectContext;
use crate::pool::SlotId;

#[derive(Default)]
struct MockState {
    connect_delay: Mutex<Duration>,
    failing_connects: AtomicUsize,
    refuse_connects: AtomicBool,
    fail_resets: AtomicBool,
    next_serial: AtomicU64,
    attempts: Mutex<Vec<(SlotId, u32)>>,
    connects: AtomicUsize,
    resets: AtomicUsize,
    closes: AtomicUsize,
    monitors: Mutex<HashMap<u64, ConnectionMonitor>>,
}

/// Connection factory for tests.
///
/// Cheap to clone; clones share their script and counters, so a test can
/// keep one while the pool owns the other.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect sleeps this long before resolving.
    #[must_use]
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *self.state.connect_delay.lock() = delay;
        self
    }

    /// Fail the next `n` connect attempts.
    #[must_use]
    pub fn failing(self, n: usize) -> Self {
        self.state.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    /// Refuse every connect until switched off again.
    pub fn set_refuse_connects(&self, refuse: bool) {
        self.state.refuse_connects.store(refuse, Ordering::SeqCst);
    }

    /// Make every reset fail until switched off again.
    pub fn set_fail_reset(&self, fail: bool) {
        self.state.fail_resets.store(fail, Ordering::SeqCst);
    }

    /// Successful connects so far.
    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Every `(slot, attempt)` a connect was started for, in order.
    pub fn attempts(&self) -> Vec<(SlotId, u32)> {
        self.state.attempts.lock().clone()
    }

    pub fn resets(&self) -> usize {
        self.state.resets.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Connections established and not yet closed.
    pub fn open(&self) -> usize {
        self.connects().saturating_sub(self.closes())
    }

    /// Report a runtime error on the connection with the given serial.
    pub fn break_connection(&self, serial: u64, error: impl Into<BoxError>) {
        if let Some(monitor) = self.monitor(serial) {
            monitor.error(error);
        }
    }

    /// Report that the connection with the given serial went away.
    pub fn end_connection(&self, serial: u64) {
        if let Some(monitor) = self.monitor(serial) {
            monitor.ended();
        }
    }

    fn monitor(&self, serial: u64) -> Option<ConnectionMonitor> {
        // Cloned out so the pool is never called with our lock held.
        self.state.monitors.lock().get(&serial).cloned()
    }
}

impl std::fmt::Debug for MockFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockFactory")
            .field("connects", &self.connects())
            .field("resets", &self.resets())
            .field("closes", &self.closes())
            .finish()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Params = String;
    type Connection = MockConnection;

    async fn connect(
        &self,
        params: &String,
        ctx: &ConnectContext,
        monitor: ConnectionMonitor,
    ) -> Result<MockConnection, BoxError> {
        self.state.attempts.lock().push((ctx.slot, ctx.attempt));

        let delay = *self.state.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.state.refuse_connects.load(Ordering::SeqCst) {
            return Err(format!("{params}: connection refused").into());
        }
        let scripted = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted {
            return Err(format!("{params}: login failed").into());
        }

        let serial = self.state.next_serial.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.monitors.lock().insert(serial, monitor.clone());
        self.state.connects.fetch_add(1, Ordering::SeqCst);

        Ok(MockConnection {
            serial,
            server: params.clone(),
            closed: AtomicBool::new(false),
            monitor,
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection produced by [`MockFactory`].
pub struct MockConnection {
    serial: u64,
    server: String,
    closed: AtomicBool,
    monitor: ConnectionMonitor,
    state: Arc<MockState>,
}

impl MockConnection {
    /// Unique per successful connect, starting at 1.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn reset(&self) -> Result<(), BoxError> {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_resets.load(Ordering::SeqCst) {
            return Err("reset rejected by server".into());
        }
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.monitors.lock().remove(&self.serial);
        self.monitor.ended();
    }
}

impl std::fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockConnection")
            .field("serial", &self.serial)
            .field("server", &self.server)
            .field("closed", &self.is_closed())
            .finish()
    }
}
