//! Pooled slot: one connection attempt or instance plus its timers.

use std::sync::Arc;

use tokio::time::Instant;

use crate::timer::{Timer, TimerId};

/// Identifies a slot within its pool. Ids increase monotonically and are
/// never reused; a retry keeps the slot's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u64);

impl SlotId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a live slot. Removed slots are dropped from the
/// registry, so there is no `Removed` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    /// A connect attempt is in flight.
    Pending,
    /// Holds an idle connection.
    Free,
    /// Checked out to a caller.
    Used,
    /// The last attempt failed; waiting for the retry timer.
    Retrying,
}

pub(crate) struct Slot<C> {
    pub(crate) id: SlotId,
    pub(crate) status: SlotStatus,
    pub(crate) attempt: u32,
    /// Present while Free or Used.
    pub(crate) conn: Option<Arc<C>>,
    /// Armed only while Free.
    pub(crate) idle_timer: Option<Timer>,
    /// Armed only while Retrying.
    pub(crate) retry_timer: Option<Timer>,
    pub(crate) checked_out_at: Option<Instant>,
}

impl<C> Slot<C> {
    pub(crate) fn pending(id: SlotId) -> Self {
        Self {
            id,
            status: SlotStatus::Pending,
            attempt: 0,
            conn: None,
            idle_timer: None,
            retry_timer: None,
            checked_out_at: None,
        }
    }

    /// Whether a notification or completion tagged with `attempt` still
    /// refers to this slot's current connection.
    pub(crate) fn is_attempt(&self, attempt: u32) -> bool {
        self.attempt == attempt
    }

    pub(crate) fn holds(&self, conn: &Arc<C>) -> bool {
        self.conn.as_ref().is_some_and(|own| Arc::ptr_eq(own, conn))
    }

    pub(crate) fn idle_timer_is(&self, id: TimerId) -> bool {
        self.idle_timer.as_ref().is_some_and(|t| t.id() == id)
    }

    pub(crate) fn retry_timer_is(&self, id: TimerId) -> bool {
        self.retry_timer.as_ref().is_some_and(|t| t.id() == id)
    }
}

impl<C> std::fmt::Debug for Slot<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("attempt", &self.attempt)
            .field("connected", &self.conn.is_some())
            .field("idle_timer", &self.idle_timer)
            .field("retry_timer", &self.retry_timer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_starts_pending_without_connection() {
        let slot: Slot<u8> = Slot::pending(SlotId::new(1));
        assert_eq!(slot.status, SlotStatus::Pending);
        assert!(slot.conn.is_none());
        assert!(slot.is_attempt(0));
    }

    #[test]
    fn holds_compares_identity_not_value() {
        let mut slot = Slot::pending(SlotId::new(2));
        let conn = Arc::new(5u8);
        slot.conn = Some(conn.clone());

        assert!(slot.holds(&conn));
        assert!(!slot.holds(&Arc::new(5u8)));
    }

    #[test]
    fn slot_id_orders_and_displays() {
        assert!(SlotId::new(1) < SlotId::new(2));
        assert_eq!(SlotId::new(42).to_string(), "42");
        assert_eq!(SlotId::new(42).get(), 42);
    }
}
