//! Bounded fan-out over an index range
//!
//! Runs one async job per index with at most `workers` jobs in flight.
//! A job that panics is logged and reported as a missing result; it never
//! stalls the remaining indices.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Invoke `work` exactly once for every index in `0..pieces`, with at most
/// `workers` invocations running concurrently, and wait for all of them.
///
/// The returned vector is indexed like the input range. An entry is `None`
/// when its job panicked or was cancelled. A worker count of zero is treated
/// as one.
pub async fn parallelize<F, Fut, T>(workers: usize, pieces: usize, work: F) -> Vec<Option<T>>
where
    F: Fn(usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let mut results: Vec<Option<T>> = (0..pieces).map(|_| None).collect();
    if pieces == 0 {
        return results;
    }

    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let work = Arc::new(work);
    let mut join_set = JoinSet::new();

    for index in 0..pieces {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                // The semaphore is never closed while we hold it
                error!(error = %e, "Worker pool closed unexpectedly");
                break;
            }
        };

        let work = Arc::clone(&work);
        join_set.spawn(async move {
            // The permit is released when the job finishes, panicked or not
            let _permit = permit;
            let job = tokio::spawn(async move { work(index).await });
            (index, job.await)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, Ok(value))) => results[index] = Some(value),
            Ok((index, Err(e))) if e.is_panic() => {
                error!(index, error = %e, "Parallel work item panicked");
            }
            Ok((index, Err(e))) => {
                warn!(index, error = %e, "Parallel work item cancelled");
            }
            Err(e) => {
                error!(error = %e, "Parallel work supervisor failed");
            }
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_every_index_runs_once() {
        let calls = Arc::new((0..20).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
        let tracker = Arc::clone(&calls);

        let results = parallelize(4, 20, move |i| {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker[i].fetch_add(1, Ordering::SeqCst);
                i * 2
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(*result, Some(i * 2));
            assert_eq!(calls[i].load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (in_flight_c, peak_c) = (Arc::clone(&in_flight), Arc::clone(&peak));

        parallelize(3, 12, move |_| {
            let in_flight = Arc::clone(&in_flight_c);
            let peak = Arc::clone(&peak_c);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let results = parallelize(1, 5, |i| async move {
            if i == 2 {
                panic!("boom");
            }
            i
        })
        .await;

        assert_eq!(results, vec![Some(0), Some(1), None, Some(3), Some(4)]);
    }

    #[tokio::test]
    async fn test_zero_workers_still_progresses() {
        let results = parallelize(0, 3, |i| async move { i + 1 }).await;
        assert_eq!(results, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_zero_pieces() {
        let results: Vec<Option<usize>> = parallelize(8, 0, |i| async move { i }).await;
        assert!(results.is_empty());
    }
}
