//! Integration tests for `WorkerPool` concurrency bounds and shutdown
//! behavior, exercised through the public crate API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chronoforge::config::ThreadPoolConfig;
use chronoforge::jobs::WorkerPool;

fn pool_config(size: usize) -> ThreadPoolConfig {
    ThreadPoolConfig {
        size,
        thread_priority: 5,
        daemon: true,
    }
}

#[tokio::test]
async fn never_exceeds_configured_concurrency() {
    let pool = Arc::new(WorkerPool::new("bounded", &pool_config(3)));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..20 {
        pool.block_for_available_threads().await;
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        pool.run_in_thread(async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            active.fetch_sub(1, Ordering::SeqCst);
        })
        .await;
    }

    pool.shutdown(true).await;
    assert!(peak.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_work_when_requested() {
    let pool = Arc::new(WorkerPool::new("draining", &pool_config(2)));
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let completed = Arc::clone(&completed);
        pool.run_in_thread(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            completed.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    }

    pool.shutdown(true).await;
    assert_eq!(completed.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn run_in_thread_rejects_once_shut_down() {
    let pool = WorkerPool::new("rejecting", &pool_config(4));
    pool.shutdown(false).await;
    assert!(!pool.run_in_thread(async {}).await);
}

#[tokio::test]
async fn block_for_available_threads_reflects_released_slots() {
    let pool = Arc::new(WorkerPool::new("reflecting", &pool_config(1)));
    assert_eq!(pool.block_for_available_threads().await, 1);

    pool.run_in_thread(async {
        tokio::time::sleep(Duration::from_millis(20)).await;
    })
    .await;

    // The single slot is busy; a fresh wait must not return until it's freed.
    let started = tokio::time::Instant::now();
    let available = pool.block_for_available_threads().await;
    assert_eq!(available, 1);
    assert!(started.elapsed() >= Duration::from_millis(5));

    pool.shutdown(true).await;
}
