//! Idle eviction tests.

use std::time::Duration;

use nebula_pool::testing::MockFactory;
use nebula_pool::{CleanupReason, Pool, PoolConfig, PoolEvent};
use pretty_assertions::assert_eq;

const IDLE: Duration = Duration::from_secs(30);

fn config(min_size: usize) -> PoolConfig {
    PoolConfig {
        name: "idle".to_string(),
        min_size,
        max_size: 4,
        idle_timeout: Some(IDLE),
        acquire_timeout: None,
        ..Default::default()
    }
}

async fn advance(by: Duration) {
    tokio::time::sleep(by).await;
}

#[tokio::test(start_paused = true)]
async fn free_connection_is_closed_after_idle_timeout() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), "db".into(), config(0)).unwrap();
    let mut events = pool.subscribe();

    drop(pool.acquire().await.unwrap());
    advance(Duration::from_millis(1)).await;
    assert_eq!(pool.stats().free, 1);

    advance(IDLE - Duration::from_secs(1)).await;
    assert_eq!(pool.stats().free, 1);
    assert_eq!(factory.closes(), 0);

    advance(Duration::from_secs(2)).await;
    assert_eq!(pool.stats().total(), 0);
    assert_eq!(factory.closes(), 1);

    let mut evicted = false;
    while let Ok(event) = events.try_recv() {
        evicted |= matches!(
            event,
            PoolEvent::CleanedUp {
                reason: CleanupReason::IdleTimeout,
                ..
            }
        );
    }
    assert!(evicted);
}

#[tokio::test(start_paused = true)]
async fn evicted_connections_are_replaced_up_to_min_size() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), "db".into(), config(2)).unwrap();
    advance(Duration::from_millis(1)).await;
    assert_eq!(factory.connects(), 2);

    advance(IDLE + Duration::from_secs(1)).await;

    assert_eq!(factory.closes(), 2);
    assert_eq!(factory.connects(), 4);
    assert_eq!(pool.stats().free, 2);
}

#[tokio::test(start_paused = true)]
async fn checked_out_connections_are_never_evicted() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), "db".into(), config(0)).unwrap();

    let conn = pool.acquire().await.unwrap();
    advance(IDLE * 3).await;

    assert_eq!(pool.stats().used, 1);
    assert_eq!(factory.closes(), 0);
    assert!(!conn.is_closed());
}

#[tokio::test(start_paused = true)]
async fn reuse_restarts_the_idle_clock() {
    let factory = MockFactory::new();
    let pool = Pool::new(factory.clone(), "db".into(), config(0)).unwrap();

    drop(pool.acquire().await.unwrap());
    advance(Duration::from_secs(20)).await;

    // Idle timer re-armed at t=20s.
    drop(pool.acquire().await.unwrap());
    advance(Duration::from_secs(20)).await;
    assert_eq!(pool.stats().free, 1);

    advance(Duration::from_secs(11)).await;
    assert_eq!(pool.stats().free, 0);
    assert_eq!(factory.connects(), 1);
    assert_eq!(factory.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_idle_timeout_keeps_connections() {
    let factory = MockFactory::new();
    let config = PoolConfig {
        idle_timeout: None,
        ..config(0)
    };
    let pool = Pool::new(factory.clone(), "db".into(), config).unwrap();

    drop(pool.acquire().await.unwrap());
    advance(Duration::from_secs(24 * 3600)).await;

    assert_eq!(pool.stats().free, 1);
    assert_eq!(factory.closes(), 0);
}
