//! Bounded worker pool used by the training phases.
//!
//! A counting semaphore with one permit per worker bounds the number of
//! outstanding tasks. Submitting blocks while the pool is saturated, and
//! [`WorkerPool::await_all`] drains every permit to form a join barrier
//! before the next phase starts. The first failing task is reported to the
//! awaiting caller and aborts the training run.

use std::ops::Range;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use rayon::prelude::*;

use crate::ranklib::RankLibError;

// =============================================================================
// Semaphore
// =============================================================================

#[derive(Debug)]
struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self, n: usize) {
        let mut permits = self.lock();
        while *permits < n {
            permits = self
                .available
                .wait(permits)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *permits -= n;
    }

    fn release(&self, n: usize) {
        *self.lock() += n;
        self.available.notify_all();
    }
}

/// Releases one permit when dropped, so a panicking task cannot leak it.
struct Permit<'a>(&'a Semaphore);

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.0.release(1);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

// =============================================================================
// WorkerPool
// =============================================================================

type Failure = Arc<Mutex<Option<RankLibError>>>;

/// Fixed-size pool of training workers.
///
/// Constructed once by the training entry point and passed by reference to
/// the phases that fan out. A pool of size 1 runs every task inline on the
/// calling thread.
pub struct WorkerPool {
    size: usize,
    threads: Option<rayon::ThreadPool>,
    permits: Arc<Semaphore>,
    failure: Failure,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("size", &self.size).finish()
    }
}

impl WorkerPool {
    /// Create a pool with `n_threads` workers; `0` uses the available parallelism.
    pub fn new(n_threads: usize) -> Result<Self, RankLibError> {
        let size = if n_threads == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            n_threads
        };
        let threads = if size > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(size)
                .thread_name(|i| format!("ltrkit-worker-{i}"))
                .build()
                .map_err(|e| RankLibError::Worker(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        tracing::debug!(size, "worker pool started");
        Ok(Self {
            size,
            threads,
            permits: Arc::new(Semaphore::new(size)),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    /// Single-threaded pool; every task runs inline.
    pub fn sequential() -> Self {
        Self {
            size: 1,
            threads: None,
            permits: Arc::new(Semaphore::new(1)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Split `0..n` into `min(n, size)` contiguous chunks of near-equal length.
    ///
    /// Returns the chunk boundaries: chunk `i` is `bounds[i]..bounds[i + 1]`.
    /// The remainder of the division goes to the earliest chunks.
    pub fn partition(&self, n: usize) -> Vec<usize> {
        partition(n, self.size)
    }

    /// Map over a slice on the pool's workers, preserving order.
    ///
    /// Runs inline when the pool has a single worker.
    pub fn map<T, B, F>(&self, items: &[T], f: F) -> Vec<B>
    where
        T: Sync,
        B: Send,
        F: Fn(&T) -> B + Sync + Send,
    {
        match &self.threads {
            None => items.iter().map(f).collect(),
            Some(threads) => threads.install(|| items.par_iter().map(f).collect()),
        }
    }

    /// Submit a detached task, blocking while every worker is busy.
    ///
    /// Errors are collected and returned by the next [`await_all`](Self::await_all).
    /// Training phases borrow their inputs and go through
    /// [`run_partitioned`](Self::run_partitioned) or [`map`](Self::map) instead.
    #[cfg(test)]
    pub(crate) fn execute<F>(&self, task: F)
    where
        F: FnOnce() -> Result<(), RankLibError> + Send + 'static,
    {
        match &self.threads {
            None => {
                if let Err(e) = run_guarded(task) {
                    record_failure(&self.failure, e);
                }
            }
            Some(threads) => {
                self.permits.acquire(1);
                let permits = Arc::clone(&self.permits);
                let failure = Arc::clone(&self.failure);
                threads.spawn(move || {
                    let _permit = Permit(&permits);
                    if let Err(e) = run_guarded(task) {
                        record_failure(&failure, e);
                    }
                });
            }
        }
    }

    /// Block until every submitted task has finished.
    ///
    /// Drains all permits and hands them back, so the pool is reusable for
    /// the next phase. Returns the first task failure, if any.
    pub fn await_all(&self) -> Result<(), RankLibError> {
        self.permits.acquire(self.size);
        self.permits.release(self.size);
        let failure = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Run `task` over the partition of `0..n` and collect the chunk results in order.
    ///
    /// This is the scoped form of `execute` + `await_all`: the closure may
    /// borrow from the caller's stack.
    pub fn run_partitioned<T, F>(&self, n: usize, task: F) -> Result<Vec<T>, RankLibError>
    where
        T: Send,
        F: Fn(Range<usize>) -> Result<T, RankLibError> + Sync,
    {
        let bounds = self.partition(n);
        let ranges: Vec<Range<usize>> = bounds.windows(2).map(|w| w[0]..w[1]).collect();

        let threads = match &self.threads {
            Some(threads) if ranges.len() > 1 => threads,
            _ => return ranges.into_iter().map(|r| run_guarded(|| task(r))).collect(),
        };

        let mut slots: Vec<Option<Result<T, RankLibError>>> = ranges.iter().map(|_| None).collect();
        let permits = &self.permits;
        let task = &task;
        threads.in_place_scope(|scope| {
            for (range, slot) in ranges.into_iter().zip(slots.iter_mut()) {
                permits.acquire(1);
                scope.spawn(move |_| {
                    let _permit = Permit(permits);
                    *slot = Some(run_guarded(|| task(range)));
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| Err(RankLibError::Worker("task did not run".into())))
            })
            .collect()
    }

    /// Wait for outstanding work and release the worker threads.
    pub fn shutdown(self) -> Result<(), RankLibError> {
        let result = self.await_all();
        tracing::debug!(size = self.size, "worker pool shut down");
        result
    }
}

fn run_guarded<T>(task: impl FnOnce() -> Result<T, RankLibError>) -> Result<T, RankLibError> {
    match catch_unwind(AssertUnwindSafe(task)) {
        Ok(result) => result,
        Err(payload) => Err(RankLibError::Worker(panic_message(payload.as_ref()))),
    }
}

#[cfg(test)]
fn record_failure(failure: &Failure, error: RankLibError) {
    let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.is_none() {
        tracing::warn!(%error, "worker task failed");
        *slot = Some(error);
    }
}

/// Chunk boundaries for `n` items over `workers` workers.
pub fn partition(n: usize, workers: usize) -> Vec<usize> {
    let chunks = n.min(workers.max(1));
    if chunks == 0 {
        return vec![0];
    }
    let base = n / chunks;
    let remainder = n % chunks;
    let mut bounds = Vec::with_capacity(chunks + 1);
    bounds.push(0);
    let mut end = 0;
    for i in 0..chunks {
        end += base + usize::from(i < remainder);
        bounds.push(end);
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn partition_spreads_remainder_first() {
        assert_eq!(partition(10, 4), vec![0, 3, 6, 8, 10]);
        assert_eq!(partition(3, 8), vec![0, 1, 2, 3]);
        assert_eq!(partition(0, 4), vec![0]);
    }

    #[test]
    fn execute_then_await() {
        let pool = WorkerPool::new(3).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        pool.await_all().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[test]
    fn failure_reaches_awaiting_caller() {
        let pool = WorkerPool::new(2).unwrap();
        pool.execute(|| Err(RankLibError::InvalidData("boom".into())));
        pool.execute(|| Ok(()));
        let err = pool.await_all().unwrap_err();
        assert!(err.to_string().contains("boom"));
        // The barrier resets after reporting.
        assert!(pool.await_all().is_ok());
    }

    #[test]
    fn panics_become_worker_errors() {
        let pool = WorkerPool::sequential();
        pool.execute(|| panic!("bad split"));
        let err = pool.await_all().unwrap_err();
        assert!(matches!(err, RankLibError::Worker(ref m) if m.contains("bad split")));
    }

    #[test]
    fn map_runs_on_the_pool_workers() {
        let items: Vec<usize> = (0..64).collect();
        let pool = WorkerPool::new(3).unwrap();
        let seen = pool.map(&items, |_| rayon::current_num_threads());
        assert!(seen.iter().all(|&n| n == 3), "{seen:?}");

        let doubled = pool.map(&items, |i| i * 2);
        assert_eq!(doubled, WorkerPool::sequential().map(&items, |i| i * 2));
        assert_eq!(doubled[10], 20);
    }

    #[test]
    fn run_partitioned_borrows_and_orders() {
        let data: Vec<u64> = (1..=100).collect();
        for size in [1, 4] {
            let pool = WorkerPool::new(size).unwrap();
            let sums = pool
                .run_partitioned(data.len(), |r| Ok(data[r].iter().sum::<u64>()))
                .unwrap();
            assert_eq!(sums.len(), size);
            assert_eq!(sums.iter().sum::<u64>(), 5050);
        }
    }

    proptest! {
        #[test]
        fn partition_covers_range(n in 0usize..500, workers in 1usize..32) {
            let bounds = partition(n, workers);
            prop_assert_eq!(*bounds.first().unwrap(), 0);
            prop_assert_eq!(*bounds.last().unwrap(), n);
            let sizes: Vec<usize> = bounds.windows(2).map(|w| w[1] - w[0]).collect();
            if let (Some(max), Some(min)) = (sizes.iter().max(), sizes.iter().min()) {
                prop_assert!(max - min <= 1);
                prop_assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
            }
        }
    }
}
