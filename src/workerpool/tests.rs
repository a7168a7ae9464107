//! Tests for the bounded worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::rstest;

use super::WorkerPool;

#[rstest]
#[case(1)]
#[case(3)]
#[tokio::test]
async fn never_runs_more_than_size_jobs(#[case] size: usize) {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut pool: WorkerPool<String> = WorkerPool::new(size);

    for _ in 0..10 {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        pool.submit(async move {
            let now = running.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }

    assert!(pool.close().await.is_empty());
    assert!(peak.load(Ordering::SeqCst) <= size);
}

#[rstest]
#[tokio::test]
async fn failures_are_returned_on_close() {
    let done = Arc::new(AtomicUsize::new(0));
    let mut pool = WorkerPool::new(2);

    for index in 0..5_usize {
        let done = Arc::clone(&done);
        pool.submit(async move {
            done.fetch_add(1, Ordering::SeqCst);
            if [0, 2, 4].contains(&index) {
                Err(format!("job {index} failed"))
            } else {
                Ok(())
            }
        });
    }

    let mut errors = pool.close().await;
    errors.sort();
    assert_eq!(errors, ["job 0 failed", "job 2 failed", "job 4 failed"]);
    assert_eq!(done.load(Ordering::SeqCst), 5);
}

#[rstest]
#[tokio::test]
async fn an_empty_pool_closes_cleanly() {
    let pool: WorkerPool<String> = WorkerPool::new(0);

    assert_eq!(pool.pending(), 0);
    assert!(pool.close().await.is_empty());
}
