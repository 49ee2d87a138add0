//! Slot lifecycle transitions.
//!
//! Every handler here runs with the registry locked and finishes without
//! awaiting. Work that talks to the outside world (connect, reset, close)
//! is spawned and re-enters through another handler, which first checks
//! that the slot is still in the state the work was started for.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::registry::{Registry, WaiterId};
use super::slot::{SlotId, SlotStatus};
use super::Shared;
use crate::connection::{
    BoxError, Connection, ConnectionFactory, ConnectionMonitor, SlotObserver,
};
use crate::context::ConnectContext;
use crate::error::Error;
use crate::events::{CleanupReason, PoolEvent};
use crate::timer::{Timer, TimerId};

type Reg<F> = Registry<<F as ConnectionFactory>::Connection>;

impl<F: ConnectionFactory> Shared<F> {
    // -----------------------------------------------------------------------
    // Fill scheduler
    // -----------------------------------------------------------------------

    /// Create enough pending slots to reach `min_size` and cover queued
    /// demand, never exceeding `max_size`. Connects run in spawned tasks.
    pub(super) fn fill(&self, reg: &mut Reg<F>) {
        if reg.drained {
            return;
        }
        let amount = reg.fill_amount(self.min_size, self.config.max_size);
        if amount == 0 {
            return;
        }
        debug!(pool = %self.config.name, amount, "filling pool");
        for _ in 0..amount {
            let slot = reg.insert_pending();
            self.events.emit(PoolEvent::SlotCreated { slot });
            self.spawn_connect(slot, 0);
        }
    }

    fn spawn_connect(&self, slot: SlotId, attempt: u32) {
        let weak = self.me.clone();
        let observer: Weak<dyn SlotObserver> = self.me.clone();
        let monitor = ConnectionMonitor::new(observer, slot, attempt);
        let ctx = ConnectContext::new(slot, attempt, self.shutdown.child_token());

        drop(tokio::spawn(async move {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            debug!(pool = %shared.config.name, %slot, attempt, "creating connection");
            let outcome = tokio::select! {
                result = shared.factory.connect(&shared.params, &ctx, monitor) => Some(result),
                () = ctx.cancellation.cancelled() => None,
            };
            shared.on_connect_result(slot, attempt, outcome);
        }));
    }

    /// `outcome` is `None` when drain cancelled the attempt.
    fn on_connect_result(
        &self,
        slot: SlotId,
        attempt: u32,
        outcome: Option<Result<F::Connection, BoxError>>,
    ) {
        let mut reg = self.state.lock();
        let live = reg
            .slot(slot)
            .is_some_and(|s| s.status == SlotStatus::Pending && s.is_attempt(attempt));

        match outcome {
            Some(Ok(conn)) => {
                let conn = Arc::new(conn);
                let Some(entry) = reg.slot_mut(slot).filter(|_| live) else {
                    debug!(pool = %self.config.name, %slot, "slot gone while connecting, closing");
                    drop(reg);
                    self.spawn_close(conn, false);
                    return;
                };
                entry.conn = Some(conn);
                reg.counters.created += 1;

                if reg.drained {
                    debug!(pool = %self.config.name, %slot, "closing because pool has been drained");
                    self.teardown(&mut reg, slot, CleanupReason::Drained);
                    return;
                }

                debug!(pool = %self.config.name, %slot, attempt, "connected");
                self.events.emit(PoolEvent::Connected { slot, attempt });
                self.make_available(&mut reg, slot);
            }
            Some(Err(error)) => {
                if live {
                    self.fail(&mut reg, slot, error);
                }
            }
            None => {
                if live {
                    self.teardown(&mut reg, slot, CleanupReason::Drained);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Hand-off
    // -----------------------------------------------------------------------

    /// Give the slot to the oldest waiter still listening, or park it as
    /// free with an idle timer.
    pub(super) fn make_available(&self, reg: &mut Reg<F>, slot: SlotId) {
        while let Some(waiter) = reg.pop_waiter() {
            let Some(checkout) = reg.checkout(slot) else {
                return;
            };
            if waiter.deliver(Ok(checkout)).is_ok() {
                reg.mark_used(slot);
                debug!(pool = %self.config.name, %slot, "acquired");
                self.events.emit(PoolEvent::Acquired { slot });
                return;
            }
            // The caller dropped its acquire future; try the next one.
        }

        let idle_timer = self.arm_idle_timer(slot);
        reg.set_free(slot, idle_timer);
    }

    // -----------------------------------------------------------------------
    // Idle reaper
    // -----------------------------------------------------------------------

    fn arm_idle_timer(&self, slot: SlotId) -> Option<Timer> {
        let delay = self.config.idle_timeout?;
        let weak = self.me.clone();
        Some(Timer::start(delay, move |timer| {
            if let Some(shared) = weak.upgrade() {
                shared.on_idle_timeout(slot, timer);
            }
        }))
    }

    fn on_idle_timeout(&self, slot: SlotId, timer: TimerId) {
        let mut reg = self.state.lock();
        let armed = reg
            .slot(slot)
            .is_some_and(|s| s.status == SlotStatus::Free && s.idle_timer_is(timer));
        if !armed {
            return;
        }
        debug!(pool = %self.config.name, %slot, "closing idle connection");
        self.teardown(&mut reg, slot, CleanupReason::IdleTimeout);
        self.fill(&mut reg);
    }

    // -----------------------------------------------------------------------
    // Retry / backoff
    // -----------------------------------------------------------------------

    /// Report a connect or runtime failure and put the slot into fixed-delay
    /// retry. While draining the slot is dropped instead.
    fn fail(&self, reg: &mut Reg<F>, slot: SlotId, error: BoxError) {
        let attempt = reg.slot(slot).map_or(0, |s| s.attempt);
        warn!(pool = %self.config.name, %slot, attempt, %error, "closing because of error");
        reg.counters.failures += 1;
        self.events.emit(PoolEvent::ConnectionFailed {
            slot,
            attempt,
            error: Arc::from(error),
        });

        if reg.drained {
            self.teardown(reg, slot, CleanupReason::Drained);
            return;
        }

        let delay = self.config.retry_delay;
        let timer = self.arm_retry_timer(slot, delay);
        if let Some(conn) = reg.set_retrying(slot, timer) {
            self.spawn_close(conn, false);
        }
        debug!(pool = %self.config.name, %slot, ?delay, "retry scheduled");
        self.events.emit(PoolEvent::RetryScheduled { slot, delay });
    }

    fn arm_retry_timer(&self, slot: SlotId, delay: Duration) -> Timer {
        let weak = self.me.clone();
        Timer::start(delay, move |timer| {
            if let Some(shared) = weak.upgrade() {
                shared.on_retry(slot, timer);
            }
        })
    }

    fn on_retry(&self, slot: SlotId, timer: TimerId) {
        let mut reg = self.state.lock();
        let armed = reg
            .slot(slot)
            .is_some_and(|s| s.status == SlotStatus::Retrying && s.retry_timer_is(timer));
        if !armed || reg.drained {
            return;
        }
        if let Some(attempt) = reg.set_pending_retry(slot) {
            self.spawn_connect(slot, attempt);
        }
        self.fill(&mut reg);
    }

    // -----------------------------------------------------------------------
    // Release
    // -----------------------------------------------------------------------

    /// Reset a returned connection and hand it on, or discard it if the
    /// reset fails.
    pub(super) async fn reset_and_return(&self, slot: SlotId, conn: Arc<F::Connection>) {
        {
            let reg = self.state.lock();
            if reg.drained {
                return;
            }
            if !reg.is_checked_out(slot, &conn) {
                debug!(pool = %self.config.name, %slot, "ignoring release of connection no longer in pool");
                return;
            }
        }

        let outcome = conn.reset().await;

        let mut reg = self.state.lock();
        // Errored, ended or drained while resetting.
        if !reg.is_checked_out(slot, &conn) {
            return;
        }
        match outcome {
            Ok(()) => {
                let usage_duration = reg
                    .slot(slot)
                    .and_then(|s| s.checked_out_at)
                    .map(|at| at.elapsed())
                    .unwrap_or_default();
                reg.counters.releases += 1;
                debug!(pool = %self.config.name, %slot, "released");
                self.events.emit(PoolEvent::Released {
                    slot,
                    usage_duration,
                });
                self.make_available(&mut reg, slot);
            }
            Err(error) => {
                warn!(pool = %self.config.name, %slot, %error, "reset failed, closing connection");
                self.teardown(&mut reg, slot, CleanupReason::ResetFailed);
                self.fill(&mut reg);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Acquire timeout
    // -----------------------------------------------------------------------

    pub(super) fn arm_acquire_timeout(&self, waiter: WaiterId, delay: Duration) -> Timer {
        let weak = self.me.clone();
        Timer::start(delay, move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.on_acquire_timeout(waiter, delay);
            }
        })
    }

    fn on_acquire_timeout(&self, waiter: WaiterId, delay: Duration) {
        let mut reg = self.state.lock();
        let Some(waiter) = reg.remove_waiter(waiter) else {
            return;
        };
        reg.counters.timeouts += 1;
        let waiters = reg.waiting_len();
        warn!(pool = %self.config.name, waiters, "acquire timeout exceeded");
        self.events.emit(PoolEvent::AcquireTimedOut { waiters });
        let _ = waiter.deliver(Err(Error::AcquireTimeout {
            timeout_ms: delay.as_millis() as u64,
            waiters,
        }));
    }

    // -----------------------------------------------------------------------
    // Teardown and drain
    // -----------------------------------------------------------------------

    /// Remove a slot for good, closing its connection unless it already
    /// ended.
    fn teardown(&self, reg: &mut Reg<F>, slot: SlotId, reason: CleanupReason) {
        let Some(removed) = reg.remove(slot) else {
            return;
        };
        debug!(pool = %self.config.name, %slot, %reason, "removing connection");
        self.events.emit(PoolEvent::CleanedUp { slot, reason });

        if let Some(conn) = removed.conn {
            if reason != CleanupReason::Ended {
                reg.begin_close();
                self.spawn_close(conn, true);
            }
        }
        self.finish_drain_if_empty(reg);
    }

    /// Close a connection in the background. `counted` closes hold up drain
    /// completion until they finish.
    fn spawn_close(&self, conn: Arc<F::Connection>, counted: bool) {
        let weak = self.me.clone();
        drop(tokio::spawn(async move {
            conn.close().await;
            if !counted {
                return;
            }
            if let Some(shared) = weak.upgrade() {
                let mut reg = shared.state.lock();
                reg.finish_close();
                shared.finish_drain_if_empty(&mut reg);
            }
        }));
    }

    pub(super) fn begin_drain(&self, reg: &mut Reg<F>) -> oneshot::Receiver<()> {
        info!(pool = %self.config.name, "draining");
        reg.drained = true;
        self.shutdown.cancel();

        let (done, rx) = oneshot::channel();
        reg.set_drain_signal(done);

        for waiter in reg.take_waiters() {
            let _ = waiter.deliver(Err(Error::Drained));
        }

        for slot in reg.slot_ids() {
            // Pending slots finish through their cancelled connect task.
            let in_flight = reg
                .slot(slot)
                .is_some_and(|s| s.status == SlotStatus::Pending);
            if !in_flight {
                self.teardown(reg, slot, CleanupReason::Drained);
            }
        }

        self.finish_drain_if_empty(reg);
        rx
    }

    fn finish_drain_if_empty(&self, reg: &mut Reg<F>) {
        if let Some(done) = reg.take_drain_signal_if_empty() {
            info!(pool = %self.config.name, "drained");
            self.events.emit(PoolEvent::Drained);
            let _ = done.send(());
        }
    }
}

impl<F: ConnectionFactory> SlotObserver for Shared<F> {
    fn connection_error(&self, slot: SlotId, attempt: u32, error: BoxError) {
        let mut reg = self.state.lock();
        let live = reg
            .slot(slot)
            .is_some_and(|s| s.is_attempt(attempt) && s.conn.is_some());
        if live {
            self.fail(&mut reg, slot, error);
        }
    }

    fn connection_ended(&self, slot: SlotId, attempt: u32) {
        let mut reg = self.state.lock();
        let live = reg
            .slot(slot)
            .is_some_and(|s| s.is_attempt(attempt) && s.status != SlotStatus::Retrying);
        if !live {
            return;
        }
        debug!(pool = %self.config.name, %slot, "ended");
        self.teardown(&mut reg, slot, CleanupReason::Ended);
        self.fill(&mut reg);
    }
}
