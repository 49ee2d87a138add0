//! RAII handle for a checked-out connection

use std::sync::Arc;

use tokio::time::Instant;

use crate::connection::ConnectionFactory;
use crate::pool::{Pool, SlotId};

/// A connection checked out of a [`Pool`].
///
/// Dereferences to the factory's connection type. Dropping the handle (or
/// calling [`release`](Self::release)) resets the connection and returns it
/// to the pool in the background. Releasing consumes the handle, so a
/// connection cannot be returned twice.
pub struct PooledConnection<F: ConnectionFactory> {
    pool: Pool<F>,
    slot: SlotId,
    acquired_at: Instant,
    conn: Option<Arc<F::Connection>>,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    pub(crate) fn new(
        pool: Pool<F>,
        slot: SlotId,
        conn: Arc<F::Connection>,
        acquired_at: Instant,
    ) -> Self {
        Self {
            pool,
            slot,
            acquired_at,
            conn: Some(conn),
        }
    }

    /// The slot this connection belongs to.
    #[must_use]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// When the connection was handed out.
    #[must_use]
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Return the connection to its pool.
    pub fn release(self) {
        drop(self);
    }

    pub(crate) fn belongs_to(&self, pool: &Pool<F>) -> bool {
        self.pool.ptr_eq(pool)
    }
}

impl<F: ConnectionFactory> std::ops::Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `Drop` takes the connection out.
        self.conn
            .as_deref()
            .expect("pooled connection used after release")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.check_in(self.slot, conn);
        }
    }
}

impl<F: ConnectionFactory> std::fmt::Debug for PooledConnection<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("slot", &self.slot)
            .field("held_for", &self.acquired_at.elapsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::pool::{Pool, PoolConfig};
    use crate::testing::MockFactory;

    fn pool(factory: &MockFactory) -> Pool<MockFactory> {
        let config = PoolConfig {
            min_size: 0,
            max_size: 1,
            idle_timeout: None,
            ..Default::default()
        };
        Pool::new(factory.clone(), "db".into(), config).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn derefs_to_the_connection() {
        let factory = MockFactory::new();
        let pool = pool(&factory);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(conn.serial(), 1);
        assert_eq!(conn.server(), "db");
        assert!(conn.belongs_to(&pool));
        assert!(conn.belongs_to(&pool.clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn release_and_drop_both_return_the_connection() {
        let factory = MockFactory::new();
        let pool = pool(&factory);

        pool.acquire().await.unwrap().release();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(pool.stats().free, 1);

        drop(pool.acquire().await.unwrap());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(pool.stats().free, 1);
        assert_eq!(factory.resets(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn handle_from_other_pool_does_not_belong() {
        let factory = MockFactory::new();
        let first = pool(&factory);
        let second = pool(&factory);

        let conn = first.acquire().await.unwrap();
        assert!(!conn.belongs_to(&second));
    }
}
