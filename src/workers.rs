//! Fixed-size worker pool running pure tasks over disjoint shards.
//!
//! Each shard is owned by exactly one task and every task returns its own
//! partial result, so the parallel phase needs no locks. Callers merge the
//! partials with [`reduce`] once `map_shards` has returned; that return is
//! the barrier.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Result, StandardizeError};

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(StandardizeError::InvalidConfig(
                "worker count must be positive".to_string(),
            ));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("script-worker-{}", i))
            .build()
            .map_err(|e| StandardizeError::InvalidConfig(format!("cannot start workers: {}", e)))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Split `items` into at most `workers` contiguous, non-empty shards.
    pub fn shards<'a, T>(&self, items: &'a [T]) -> Vec<&'a [T]> {
        if items.is_empty() {
            return Vec::new();
        }
        let shard_len = items.len().div_ceil(self.workers);
        items.chunks(shard_len).collect()
    }

    /// Run `task` on every shard in parallel. Results come back in shard
    /// order; the first failing shard's error aborts the whole call.
    pub fn map_shards<T, R, F>(&self, items: &[T], task: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&[T]) -> Result<R> + Sync,
    {
        let shards = self.shards(items);
        debug!("Dispatching {} items over {} shards", items.len(), shards.len());
        self.pool
            .install(|| shards.par_iter().map(|&shard| task(shard)).collect())
    }
}

/// Fold shard partials into one value, in shard order.
pub fn reduce<R, A, F>(partials: Vec<R>, init: A, mut merge: F) -> Result<A>
where
    F: FnMut(A, R) -> Result<A>,
{
    partials.into_iter().try_fold(init, |acc, partial| merge(acc, partial))
}
