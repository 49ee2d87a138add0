// Pool throughput benchmarks.
//
// Measures raw acquire/release overhead with a connection that does no I/O
// (instant connect, reset and close).

use std::hint::black_box;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{Criterion, criterion_group, criterion_main};
use nebula_pool::{BoxError, ConnectContext, Connection, ConnectionFactory, ConnectionMonitor};
use nebula_pool::{Pool, PoolConfig};

// -- Minimal no-op connection for benchmarking pool overhead only --

struct NoOpConnection;

#[async_trait]
impl Connection for NoOpConnection {
    async fn reset(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn close(&self) {}
}

struct NoOpFactory;

#[async_trait]
impl ConnectionFactory for NoOpFactory {
    type Params = ();
    type Connection = NoOpConnection;

    async fn connect(
        &self,
        _params: &(),
        _ctx: &ConnectContext,
        _monitor: ConnectionMonitor,
    ) -> Result<NoOpConnection, BoxError> {
        Ok(NoOpConnection)
    }
}

fn pool_config(max_size: usize) -> PoolConfig {
    PoolConfig {
        name: "bench".to_string(),
        min_size: 0,
        max_size,
        acquire_timeout: Some(Duration::from_secs(5)),
        idle_timeout: Some(Duration::from_secs(3600)),
        ..Default::default()
    }
}

fn bench_acquire_release(c: &mut Criterion, name: &str, rt: &tokio::runtime::Runtime, max: usize) {
    let pool = {
        let _enter = rt.enter();
        Pool::new(NoOpFactory, (), pool_config(max)).expect("failed to create pool")
    };

    // Warm up: open a few connections so subsequent acquires reuse them.
    rt.block_on(async {
        let mut held = Vec::new();
        for _ in 0..max.min(8) {
            held.push(pool.acquire().await.unwrap());
        }
        drop(held);
        tokio::time::sleep(Duration::from_millis(20)).await;
    });

    c.bench_function(name, |b| {
        b.to_async(rt).iter(|| {
            let pool = pool.clone();
            async move {
                let conn = pool.acquire().await.unwrap();
                drop(conn);
                // Yield so the spawned reset-and-return task runs.
                tokio::task::yield_now().await;
                black_box(())
            }
        });
    });
}

fn single_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");
    bench_acquire_release(c, "single_thread_acquire_release", &rt, 64);
}

fn multi_thread_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");
    bench_acquire_release(c, "multi_thread_acquire_release", &rt, 64);
}

fn concurrent_contention(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build runtime");
    // Small pool to create queueing.
    bench_acquire_release(c, "contended_acquire_release_4slots", &rt, 4);
}

criterion_group!(
    benches,
    single_thread_throughput,
    multi_thread_throughput,
    concurrent_contention,
);
criterion_main!(benches);
