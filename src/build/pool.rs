//! Fixed-size worker pool for the parallel build phases
//!
//! Flat index ranges are handed to a dedicated rayon pool; every call joins
//! all work before returning, so results are visible to the orchestrating
//! thread without further synchronization.
//!
//! Author: Moroya Sakamoto

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Worker pool with join-all semantics
pub struct WorkerPool {
    pool: ThreadPool,
    threads: usize,
}

impl WorkerPool {
    /// Create a pool with `threads` workers
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("alice-nanite-worker-{}", i))
            .build()?;
        Ok(Self { pool, threads })
    }

    /// Number of workers
    #[inline]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `f(i)` for every `i in 0..count`, returning after all finish
    pub fn for_each_index<F>(&self, count: usize, f: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        self.pool.install(|| (0..count).into_par_iter().for_each(|i| f(i)));
    }

    /// Collect `f(i)` for every `i in 0..count` into a vector indexed by `i`
    pub fn map_indices<T, F>(&self, count: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        self.pool.install(|| (0..count).into_par_iter().map(|i| f(i)).collect())
    }

    /// Like [`map_indices`](Self::map_indices) but stops at the first error
    pub fn try_map_indices<T, E, F>(&self, count: usize, f: F) -> Result<Vec<T>, E>
    where
        T: Send,
        E: Send,
        F: Fn(usize) -> Result<T, E> + Send + Sync,
    {
        self.pool.install(|| (0..count).into_par_iter().map(|i| f(i)).collect())
    }

    /// Run `f` inside the pool (nested rayon calls use these workers)
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool").field("threads", &self.threads).finish()
    }
}
