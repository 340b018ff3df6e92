//! Process-wide worker pool facade.
//!
//! The worker count is a global setting read once per parallel region. With a
//! single worker every region runs sequentially on the calling thread, which is
//! also the deterministic mode used by tests that compare traces.

use crate::error::SlopeError;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

static WORKERS: LazyLock<AtomicUsize> = LazyLock::new(|| AtomicUsize::new(default_workers()));
static POOL: Mutex<Option<(usize, Arc<ThreadPool>)>> = Mutex::new(None);

/// Half of the reported hardware threads, since hyperthreads slow down the
/// memory-bound column loops rather than speed them up.
fn default_workers() -> usize {
    (num_cpus::get() / 2).max(1)
}

/// Sets the number of workers used by every subsequent parallel region.
pub fn set(n: usize) -> Result<(), SlopeError> {
    if n == 0 {
        return Err(SlopeError::invalid("number of threads must be positive"));
    }
    WORKERS.store(n, Ordering::Relaxed);
    Ok(())
}

pub fn get() -> usize {
    WORKERS.load(Ordering::Relaxed)
}

/// Returns a pool with exactly `n` workers, rebuilding the cached one when the
/// requested size changed. `None` means the pool could not be built and the
/// caller should run sequentially.
fn pool(n: usize) -> Option<Arc<ThreadPool>> {
    let mut cached = match POOL.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some((size, existing)) = cached.as_ref() {
        if *size == n {
            return Some(Arc::clone(existing));
        }
    }
    match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
        Ok(built) => {
            let built = Arc::new(built);
            *cached = Some((n, Arc::clone(&built)));
            Some(built)
        }
        Err(e) => {
            log::warn!("Failed to build a worker pool with {n} threads, running sequentially: {e}");
            None
        }
    }
}

/// Runs `body(i)` for every `i` in `0..len`.
pub fn parallel_for<F>(len: usize, body: F)
where
    F: Fn(usize) + Send + Sync,
{
    let n = get();
    match (n > 1 && len > 1).then(|| pool(n)).flatten() {
        Some(workers) => workers.install(|| (0..len).into_par_iter().for_each(&body)),
        None => (0..len).for_each(body),
    }
}

/// Maps `body` over `0..len` and returns the results in index order, so the
/// output never depends on scheduling.
pub fn parallel_map<T, F>(len: usize, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Send + Sync,
{
    let n = get();
    match (n > 1 && len > 1).then(|| pool(n)).flatten() {
        Some(workers) => workers.install(|| (0..len).into_par_iter().map(&body).collect()),
        None => (0..len).map(body).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn zero_threads_is_rejected() {
        assert!(set(0).is_err());
        assert!(get() >= 1);
    }

    #[test]
    fn parallel_map_preserves_index_order() {
        let squares = parallel_map(100, |i| i * i);
        assert_eq!(squares.len(), 100);
        assert!(squares.iter().enumerate().all(|(i, &v)| v == i * i));
    }

    #[test]
    fn parallel_for_visits_every_index_once() {
        let total = AtomicU64::new(0);
        parallel_for(50, |i| {
            total.fetch_add(i as u64, Ordering::Relaxed);
        });
        assert_eq!(total.load(Ordering::Relaxed), (0..50).sum::<u64>());
    }
}
