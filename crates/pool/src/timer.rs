//! Cancellable one-shot timers.
//!
//! Every timer the pool arms (idle eviction, retry backoff, acquire timeout)
//! is owned by the slot or waiter that armed it. Dropping the [`Timer`]
//! aborts the sleeping task, so leaving a state automatically disarms its
//! timer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::AbortHandle;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one arming of a timer.
pub(crate) type TimerId = u64;

pub(crate) struct Timer {
    id: TimerId,
    handle: AbortHandle,
}

impl Timer {
    /// Run `on_fire` after `delay` unless the returned handle is dropped
    /// first.
    ///
    /// The handler still has to check that the timer it was armed for is the
    /// one currently installed: a timer can fire and then wait on the pool
    /// lock while the owning slot moves on.
    pub(crate) fn start<F>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(id);
        })
        .abort_handle();
        Self { id, handle }
    }

    pub(crate) fn id(&self) -> TimerId {
        self.id
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let _timer = Timer::start(Duration::from_millis(100), move |_| {
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(!fired.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        let timer = Timer::start(Duration::from_millis(10), move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        drop(timer);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let a = Timer::start(Duration::from_secs(60), |_| {});
        let b = Timer::start(Duration::from_secs(60), |_| {});
        assert_ne!(a.id(), b.id());
    }
}
