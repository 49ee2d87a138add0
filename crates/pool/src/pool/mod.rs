//! Connection pool: a bounded set of long-lived connections handed out to
//! concurrent callers.
//!
//! `Pool<F>` keeps every connection in one of three membership sets
//! (*pending*, *free*, *used*) plus a FIFO queue of callers waiting for one.
//! After every change in supply or demand it runs a fill pass that creates
//! just enough new connections for `min_size` and the queue, bounded by
//! `max_size`. Failed connections are retried after a fixed delay; idle ones
//! are closed after `idle_timeout`.
//!
//! All bookkeeping happens under one mutex and never awaits; factory
//! connects, resets and closes run in spawned tasks.

pub mod config;
mod lifecycle;
mod registry;
mod slot;

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connection::ConnectionFactory;
use crate::error::{Error, Result};
use crate::events::{EventBus, PoolEvent};
use crate::guard::PooledConnection;

pub use config::PoolConfig;
pub use registry::PoolStats;
pub use slot::{SlotId, SlotStatus};

use registry::{Checkout, Registry, Waiter, WaiterId};

/// Inner shared state for the pool.
pub(crate) struct Shared<F: ConnectionFactory> {
    me: Weak<Shared<F>>,
    factory: F,
    params: F::Params,
    config: PoolConfig,
    /// `config.min_size` clamped to `config.max_size`.
    min_size: usize,
    state: Mutex<Registry<F::Connection>>,
    events: EventBus,
    /// Cancelled by drain to abort in-flight connects.
    shutdown: CancellationToken,
}

// ---------------------------------------------------------------------------
// Pool<F>
// ---------------------------------------------------------------------------

/// Connection pool.
///
/// Cheap to clone; all clones share the same connections.
pub struct Pool<F: ConnectionFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for Pool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.shared.config.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create a pool and start filling it toward `min_size`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// Returns error if `config` is invalid (e.g. `max_size == 0`).
    pub fn new(factory: F, params: F::Params, config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let min_size = config.effective_min_size();
        let events = EventBus::new(config.event_buffer);
        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            factory,
            params,
            min_size,
            config,
            state: Mutex::new(Registry::new()),
            events,
            shutdown: CancellationToken::new(),
        });
        debug!(
            pool = %shared.config.name,
            min = shared.min_size,
            max = shared.config.max_size,
            "pool created"
        );

        {
            let mut reg = shared.state.lock();
            shared.fill(&mut reg);
        }
        Ok(Self { shared })
    }

    /// Check out a connection.
    ///
    /// Takes a free connection if there is one; otherwise joins the FIFO
    /// queue and triggers a fill. Dropping the returned future withdraws
    /// from the queue.
    ///
    /// # Errors
    /// [`Error::Drained`] if the pool is (or becomes) drained,
    /// [`Error::AcquireTimeout`] if no connection arrives in time.
    pub async fn acquire(&self) -> Result<PooledConnection<F>> {
        let shared = &self.shared;
        let mut ticket = {
            let mut reg = shared.state.lock();
            if reg.drained {
                return Err(Error::Drained);
            }

            if let Some(checkout) = reg.first_free().and_then(|slot| reg.check_out(slot)) {
                drop(reg);
                debug!(pool = %shared.config.name, slot = %checkout.slot, "acquired");
                shared.events.emit(PoolEvent::Acquired {
                    slot: checkout.slot,
                });
                return Ok(self.wrap(checkout));
            }

            let (tx, rx) = oneshot::channel();
            let waiter = reg.next_waiter_id();
            let timeout = shared
                .config
                .effective_acquire_timeout()
                .map(|delay| shared.arm_acquire_timeout(waiter, delay));
            reg.push_waiter(Waiter::new(waiter, tx, timeout));

            let waiters = reg.waiting_len();
            debug!(pool = %shared.config.name, waiters, "waiting for a connection");
            shared.events.emit(PoolEvent::Queued { waiters });
            shared.fill(&mut reg);

            WaitTicket {
                pool: self.clone(),
                waiter,
                rx,
                settled: false,
            }
        };

        ticket.wait().await
    }

    /// Return a connection to the pool.
    ///
    /// Equivalent to dropping it. The connection is reset in the background
    /// and handed to the next waiter, or parked as free.
    ///
    /// # Errors
    /// [`Error::ForeignConnection`] if `conn` was checked out from another
    /// pool. It is still returned to the pool it came from.
    pub fn release(&self, conn: PooledConnection<F>) -> Result<()> {
        if conn.belongs_to(self) {
            conn.release();
            Ok(())
        } else {
            let slot = conn.slot();
            drop(conn);
            Err(Error::ForeignConnection { slot })
        }
    }

    /// Shut the pool down.
    ///
    /// Stops accepting acquires, fails queued callers with
    /// [`Error::Drained`], closes every connection (including ones still
    /// checked out) and resolves once all of them have closed.
    ///
    /// # Errors
    /// [`Error::AlreadyDrained`] on a second call.
    pub async fn drain(&self) -> Result<()> {
        let done = {
            let mut reg = self.shared.state.lock();
            if reg.drained {
                return Err(Error::AlreadyDrained);
            }
            self.shared.begin_drain(&mut reg)
        };
        // The sender is dropped only with the registry, after it fired.
        let _ = done.await;
        Ok(())
    }

    /// Subscribe to lifecycle events, including connection failures.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.shared.events.subscribe()
    }

    /// Current occupancy and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats()
    }

    /// Whether [`drain`](Self::drain) has been called.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.shared.state.lock().drained
    }

    /// The configuration this pool was built with.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn wrap(&self, checkout: Checkout<F::Connection>) -> PooledConnection<F> {
        PooledConnection::new(self.clone(), checkout.slot, checkout.conn, checkout.at)
    }

    /// Start returning a connection. Runs in the background because the
    /// reset has to be awaited.
    pub(crate) fn check_in(&self, slot: SlotId, conn: Arc<F::Connection>) {
        let shared = Arc::clone(&self.shared);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => drop(runtime.spawn(async move {
                shared.reset_and_return(slot, conn).await;
            })),
            Err(_) => warn!(
                pool = %shared.config.name,
                %slot,
                "connection released outside a Tokio runtime; it stays checked out"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// WaitTicket
// ---------------------------------------------------------------------------

/// A queued acquire. Dropping it before it settles withdraws the waiter and
/// returns any connection that was already matched to it.
struct WaitTicket<F: ConnectionFactory> {
    pool: Pool<F>,
    waiter: WaiterId,
    rx: oneshot::Receiver<Result<Checkout<F::Connection>>>,
    settled: bool,
}

impl<F: ConnectionFactory> WaitTicket<F> {
    async fn wait(&mut self) -> Result<PooledConnection<F>> {
        let outcome = (&mut self.rx).await;
        self.settled = true;
        match outcome {
            Ok(Ok(checkout)) => Ok(self.pool.wrap(checkout)),
            Ok(Err(err)) => Err(err),
            // The waiter was dropped unanswered: only happens when the pool
            // is torn down.
            Err(_) => Err(Error::Drained),
        }
    }
}

impl<F: ConnectionFactory> Drop for WaitTicket<F> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let withdrawn = self.pool.shared.state.lock().remove_waiter(self.waiter);
        drop(withdrawn);

        self.rx.close();
        if let Ok(Ok(checkout)) = self.rx.try_recv() {
            self.pool.check_in(checkout.slot, checkout.conn);
        }
    }
}
