//! Slot registry: membership sets, waiting queue and fill arithmetic.
//!
//! A live slot is in exactly one of *pending*, *free* or *used*. Retrying
//! slots stay in *pending*: they still count toward capacity and will
//! become supply once their retry fires.
//!
//! The registry is plain data. It never spawns or awaits anything; the pool
//! drives it under its mutex and performs the side effects.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::slot::{Slot, SlotId, SlotStatus};
use crate::error::Result;
use crate::timer::Timer;

/// A connection handed out of the registry, before it is wrapped into a
/// [`PooledConnection`](crate::guard::PooledConnection).
pub(crate) struct Checkout<C> {
    pub(crate) slot: SlotId,
    pub(crate) conn: Arc<C>,
    pub(crate) at: Instant,
}

pub(crate) type WaiterId = u64;

/// A queued acquire request.
pub(crate) struct Waiter<C> {
    pub(crate) id: WaiterId,
    tx: oneshot::Sender<Result<Checkout<C>>>,
    timeout: Option<Timer>,
}

impl<C> Waiter<C> {
    pub(crate) fn new(
        id: WaiterId,
        tx: oneshot::Sender<Result<Checkout<C>>>,
        timeout: Option<Timer>,
    ) -> Self {
        Self { id, tx, timeout }
    }

    /// Answer the waiter, disarming its timeout. Hands the outcome back if
    /// the caller is gone.
    pub(crate) fn deliver(
        self,
        outcome: Result<Checkout<C>>,
    ) -> std::result::Result<(), Result<Checkout<C>>> {
        let Self { tx, timeout, .. } = self;
        drop(timeout);
        tx.send(outcome)
    }
}

/// Snapshot of pool occupancy and lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots in the pending set (connecting or retrying).
    pub pending: usize,
    /// Pending slots that are waiting for a retry.
    pub retrying: usize,
    /// Slots holding an idle connection.
    pub free: usize,
    /// Slots checked out to callers.
    pub used: usize,
    /// Callers waiting for a connection.
    pub waiting: usize,
    /// Removed connections whose close has not completed yet.
    pub closing: usize,
    /// Connections successfully established.
    pub created: u64,
    /// Slots permanently removed.
    pub destroyed: u64,
    /// Connect attempts or live connections that failed.
    pub failures: u64,
    /// Connections handed to callers.
    pub acquisitions: u64,
    /// Connections reset and returned by callers.
    pub releases: u64,
    /// Callers that gave up after the acquire timeout.
    pub timeouts: u64,
}

impl PoolStats {
    /// `pending + free + used`.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.free + self.used
    }
}

pub(crate) struct Registry<C> {
    slots: HashMap<SlotId, Slot<C>>,
    pending: BTreeSet<SlotId>,
    free: BTreeSet<SlotId>,
    used: BTreeSet<SlotId>,
    waiting: VecDeque<Waiter<C>>,
    closing: usize,
    pub(crate) drained: bool,
    drain_done: Option<oneshot::Sender<()>>,
    next_slot: u64,
    next_waiter: WaiterId,
    pub(crate) counters: PoolStats,
}

impl<C> Registry<C> {
    pub(crate) fn new() -> Self {
        Self {
            slots: HashMap::new(),
            pending: BTreeSet::new(),
            free: BTreeSet::new(),
            used: BTreeSet::new(),
            waiting: VecDeque::new(),
            closing: 0,
            drained: false,
            drain_done: None,
            next_slot: 0,
            next_waiter: 0,
            counters: PoolStats::default(),
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.pending.len() + self.free.len() + self.used.len()
    }

    /// Number of new slots needed to reach `min` and cover queued demand
    /// without exceeding `max`.
    pub(crate) fn fill_amount(&self, min: usize, max: usize) -> usize {
        let total = self.total();
        let supply = self.pending.len() + self.free.len();
        let demand_gap = self.waiting.len().saturating_sub(supply);
        let by_demand = max.saturating_sub(total).min(demand_gap);
        let by_minimum = min.saturating_sub(total);
        by_minimum.max(by_demand)
    }

    // -- slots --------------------------------------------------------------

    pub(crate) fn insert_pending(&mut self) -> SlotId {
        self.next_slot += 1;
        let id = SlotId::new(self.next_slot);
        self.slots.insert(id, Slot::pending(id));
        self.pending.insert(id);
        id
    }

    pub(crate) fn slot(&self, id: SlotId) -> Option<&Slot<C>> {
        self.slots.get(&id)
    }

    pub(crate) fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot<C>> {
        self.slots.get_mut(&id)
    }

    pub(crate) fn slot_ids(&self) -> Vec<SlotId> {
        self.slots.keys().copied().collect()
    }

    /// The slot is checked out and still holds exactly `conn`.
    pub(crate) fn is_checked_out(&self, id: SlotId, conn: &Arc<C>) -> bool {
        self.slots
            .get(&id)
            .is_some_and(|s| s.status == SlotStatus::Used && s.holds(conn))
    }

    fn relocate(&mut self, id: SlotId, to: SlotStatus) {
        self.pending.remove(&id);
        self.free.remove(&id);
        self.used.remove(&id);
        match to {
            SlotStatus::Pending | SlotStatus::Retrying => self.pending.insert(id),
            SlotStatus::Free => self.free.insert(id),
            SlotStatus::Used => self.used.insert(id),
        };
    }

    /// Pending/Used -> Free with the given idle timer.
    pub(crate) fn set_free(&mut self, id: SlotId, idle_timer: Option<Timer>) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.status = SlotStatus::Free;
            slot.idle_timer = idle_timer;
            slot.checked_out_at = None;
            self.relocate(id, SlotStatus::Free);
        }
    }

    /// Pending/Free/Used -> Used, cancelling any idle timer.
    pub(crate) fn mark_used(&mut self, id: SlotId) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        if slot.conn.is_none() {
            return false;
        }
        slot.status = SlotStatus::Used;
        slot.idle_timer = None;
        slot.checked_out_at = Some(Instant::now());
        self.relocate(id, SlotStatus::Used);
        self.counters.acquisitions += 1;
        true
    }

    /// A checkout for the slot's current connection, without changing state.
    pub(crate) fn checkout(&self, id: SlotId) -> Option<Checkout<C>> {
        let conn = self.slots.get(&id)?.conn.clone()?;
        Some(Checkout {
            slot: id,
            conn,
            at: Instant::now(),
        })
    }

    /// [`mark_used`](Self::mark_used) and hand out the connection.
    pub(crate) fn check_out(&mut self, id: SlotId) -> Option<Checkout<C>> {
        let checkout = self.checkout(id)?;
        self.mark_used(id).then_some(checkout)
    }

    /// Any -> Retrying. Returns the discarded connection, if any.
    pub(crate) fn set_retrying(&mut self, id: SlotId, retry_timer: Timer) -> Option<Arc<C>> {
        let slot = self.slots.get_mut(&id)?;
        slot.status = SlotStatus::Retrying;
        slot.idle_timer = None;
        slot.retry_timer = Some(retry_timer);
        slot.checked_out_at = None;
        let conn = slot.conn.take();
        self.relocate(id, SlotStatus::Retrying);
        conn
    }

    /// Retrying -> Pending. Returns the new attempt number.
    pub(crate) fn set_pending_retry(&mut self, id: SlotId) -> Option<u32> {
        let slot = self.slots.get_mut(&id)?;
        slot.status = SlotStatus::Pending;
        slot.retry_timer = None;
        slot.attempt += 1;
        Some(slot.attempt)
    }

    /// Drop a slot from every set. Its timers are cancelled with it.
    pub(crate) fn remove(&mut self, id: SlotId) -> Option<Slot<C>> {
        let slot = self.slots.remove(&id)?;
        self.pending.remove(&id);
        self.free.remove(&id);
        self.used.remove(&id);
        self.counters.destroyed += 1;
        Some(slot)
    }

    /// Lowest-id free slot, if any.
    pub(crate) fn first_free(&self) -> Option<SlotId> {
        self.free.first().copied()
    }

    // -- waiters ------------------------------------------------------------

    pub(crate) fn next_waiter_id(&mut self) -> WaiterId {
        self.next_waiter += 1;
        self.next_waiter
    }

    pub(crate) fn push_waiter(&mut self, waiter: Waiter<C>) {
        self.waiting.push_back(waiter);
    }

    pub(crate) fn pop_waiter(&mut self) -> Option<Waiter<C>> {
        self.waiting.pop_front()
    }

    pub(crate) fn remove_waiter(&mut self, id: WaiterId) -> Option<Waiter<C>> {
        let index = self.waiting.iter().position(|w| w.id == id)?;
        self.waiting.remove(index)
    }

    pub(crate) fn take_waiters(&mut self) -> Vec<Waiter<C>> {
        self.waiting.drain(..).collect()
    }

    pub(crate) fn waiting_len(&self) -> usize {
        self.waiting.len()
    }

    // -- closing and drain --------------------------------------------------

    pub(crate) fn begin_close(&mut self) {
        self.closing += 1;
    }

    pub(crate) fn finish_close(&mut self) {
        self.closing = self.closing.saturating_sub(1);
    }

    pub(crate) fn set_drain_signal(&mut self, done: oneshot::Sender<()>) {
        self.drain_done = Some(done);
    }

    /// Hand out the drain completion signal once nothing is left open.
    pub(crate) fn take_drain_signal_if_empty(&mut self) -> Option<oneshot::Sender<()>> {
        if self.drained && self.slots.is_empty() && self.closing == 0 {
            self.drain_done.take()
        } else {
            None
        }
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            pending: self.pending.len(),
            retrying: self
                .slots
                .values()
                .filter(|s| s.status == SlotStatus::Retrying)
                .count(),
            free: self.free.len(),
            used: self.used.len(),
            waiting: self.waiting.len(),
            closing: self.closing,
            ..self.counters
        }
    }
}

impl<C> std::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("pending", &self.pending)
            .field("free", &self.free)
            .field("used", &self.used)
            .field("waiting", &self.waiting.len())
            .field("closing", &self.closing)
            .field("drained", &self.drained)
            .finish()
    }
}
