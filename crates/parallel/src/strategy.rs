//! Processing modes for the task graph and other coarse-grained work

use rayon::prelude::*;
use tracing::warn;

/// How independent units of work are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// Single-threaded, in submission order
    #[default]
    Sequential,
    /// Parallel processing using all available cores
    Parallel,
    /// Parallel with specified number of threads
    ParallelWith(usize),
}

impl ProcessingMode {
    /// Mode for a worker count as given on the command line.
    ///
    /// Absent or negative selects sequential execution, `0` uses every core
    /// and `n` uses a pool of `n` threads.
    pub fn from_workers(n_workers: Option<i64>) -> Self {
        match n_workers {
            None => ProcessingMode::Sequential,
            Some(n) if n < 0 => ProcessingMode::Sequential,
            Some(0) => ProcessingMode::Parallel,
            Some(n) => ProcessingMode::ParallelWith(n as usize),
        }
    }

    /// Number of threads this mode runs on
    pub fn threads(&self) -> usize {
        match self {
            ProcessingMode::Sequential => 1,
            ProcessingMode::Parallel => num_cpus(),
            ProcessingMode::ParallelWith(n) => *n,
        }
    }

    fn with_pool<R, F>(threads: usize, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(f),
            Err(e) => {
                warn!("could not build a {}-thread pool ({}), using the global pool", threads, e);
                f()
            }
        }
    }
}

/// Strategy for parallel execution
pub trait ParallelStrategy {
    /// Execute a function over indices
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send;

    /// Map a function over owned items and collect results in item order
    fn par_map<I, T, F>(&self, items: Vec<I>, f: F) -> Vec<T>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send;
}

impl ParallelStrategy for ProcessingMode {
    fn par_for_each<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => range.for_each(f),
            ProcessingMode::Parallel => range.into_par_iter().for_each(f),
            ProcessingMode::ParallelWith(threads) => {
                Self::with_pool(*threads, || range.into_par_iter().for_each(f))
            }
        }
    }

    fn par_map<I, T, F>(&self, items: Vec<I>, f: F) -> Vec<T>
    where
        I: Send,
        T: Send,
        F: Fn(I) -> T + Sync + Send,
    {
        match self {
            ProcessingMode::Sequential => items.into_iter().map(f).collect(),
            ProcessingMode::Parallel => items.into_par_iter().map(f).collect(),
            ProcessingMode::ParallelWith(threads) => {
                Self::with_pool(*threads, || items.into_par_iter().map(f).collect())
            }
        }
    }
}

/// Get the number of available CPU cores
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}
