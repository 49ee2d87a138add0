//! Simple pooling example
//!
//! Runs a small pool against the in-memory mock factory, with a few
//! concurrent workers, one flaky connect and a final drain.
//!
//! ```text
//! RUST_LOG=nebula_pool=debug cargo run -p nebula-pool --example simple_pool
//! ```

use std::time::Duration;

use nebula_pool::prelude::*;
use nebula_pool::testing::MockFactory;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> nebula_pool::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PoolConfig {
        name: "orders-db".to_string(),
        min_size: 2,
        max_size: 4,
        retry_delay: Duration::from_millis(200),
        acquire_timeout: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let factory = MockFactory::new()
        .with_connect_delay(Duration::from_millis(20))
        .failing(1);
    let pool = Pool::new(factory.clone(), "sql.internal:1433".to_string(), config)?;

    let mut events = pool.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let PoolEvent::ConnectionFailed { slot, error, .. } = event {
                println!("slot {slot} failed to connect: {error}");
            }
        }
    });

    let mut workers = Vec::new();
    for worker in 0..8 {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            let conn = pool.acquire().await?;
            println!(
                "worker {worker} using connection {} to {}",
                conn.serial(),
                conn.server()
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
            pool.release(conn)
        }));
    }
    for worker in workers {
        if let Ok(Err(err)) = worker.await {
            println!("worker failed: {err}");
        }
    }

    println!("{:#?}", pool.stats());
    pool.drain().await?;
    println!("drained; {} connections opened, {} closed", factory.connects(), factory.closes());
    Ok(())
}
