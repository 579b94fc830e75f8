//! Parallel execution helpers, falling back to sequential execution without the `parallel`
//! feature.

/// Number of primitives processed by one task of a parallel pass.
pub(crate) const GRAIN_SIZE: usize = 4096;

#[cfg(feature = "parallel")]
pub(crate) use rayon::join;

/// Runs both closures one after the other.
#[cfg(not(feature = "parallel"))]
#[inline]
pub(crate) fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    (a(), b())
}

/// Folds chunks of `items` into per-task accumulators and reduces them.
#[inline]
pub(crate) fn fold_chunks<T, A, ID, F, R>(items: &[T], identity: ID, fold: F, reduce: R) -> A
where
    T: Sync,
    A: Send,
    ID: Fn() -> A + Sync + Send,
    F: Fn(A, &[T]) -> A + Sync + Send,
    R: Fn(A, A) -> A + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        items
            .par_chunks(GRAIN_SIZE)
            .fold(&identity, &fold)
            .reduce(&identity, &reduce)
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = reduce;
        items.chunks(GRAIN_SIZE).fold(identity(), fold)
    }
}

/// Maps chunks of `items`, keeping the results in chunk order.
#[inline]
pub(crate) fn map_chunks<T, R, F>(items: &[T], map: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&[T]) -> R + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        items.par_chunks(GRAIN_SIZE).map(map).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        items.chunks(GRAIN_SIZE).map(map).collect()
    }
}

/// Returns the number of worker threads of the current pool.
#[inline]
pub(crate) fn worker_count() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_num_threads()
    }

    #[cfg(not(feature = "parallel"))]
    {
        1
    }
}

/// Returns the index of the current worker thread, or `worker_count()` outside of the pool.
#[inline]
pub(crate) fn worker_index() -> usize {
    #[cfg(feature = "parallel")]
    {
        rayon::current_thread_index().unwrap_or_else(worker_count)
    }

    #[cfg(not(feature = "parallel"))]
    {
        worker_count()
    }
}
