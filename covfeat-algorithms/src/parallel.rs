//! Parallel processing utilities
//!
//! Work is split into balanced contiguous ranges and each range runs as one
//! task on a dedicated rayon thread pool sized by configuration.

use covfeat_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;

/// Thread pool configuration for parallel processing
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            thread_name_prefix: "covfeat-worker".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }
}

/// Build a thread pool with exactly `config.num_threads` workers
pub fn build_thread_pool(config: &ThreadPoolConfig) -> Result<ThreadPool> {
    if config.num_threads == 0 {
        return Err(Error::Configuration(
            "Thread pool needs at least one thread".to_string(),
        ));
    }

    let mut builder = ThreadPoolBuilder::new().num_threads(config.num_threads);

    if !config.thread_name_prefix.is_empty() {
        let prefix = config.thread_name_prefix.clone();
        builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
    }

    builder
        .build()
        .map_err(|e| Error::Algorithm(format!("Failed to create thread pool: {}", e)))
}

/// Split `0..len` into `parts` contiguous ranges whose sizes differ by at most one
///
/// Range `t` is `t * len / parts .. (t + 1) * len / parts`, so the last range
/// always ends at `len`. Ranges are empty when `parts > len`.
pub fn partition_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    if parts == 0 {
        return Vec::new();
    }

    (0..parts)
        .map(|t| (t * len / parts)..((t + 1) * len / parts))
        .collect()
}

/// Run `worker` once per partition on `pool` and wait for all of them
///
/// Every partition runs to completion or to its own error; a failure in one
/// does not cancel the others. Once all have been joined, the first error in
/// partition order is returned, otherwise every worker output in order.
pub fn run_partitions<P, R, F>(pool: &ThreadPool, partitions: Vec<P>, worker: F) -> Result<Vec<R>>
where
    P: Send,
    R: Send,
    F: Fn(P) -> Result<R> + Sync + Send,
{
    let results: Vec<Result<R>> =
        pool.install(|| partitions.into_par_iter().map(&worker).collect());

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default().with_threads(4);
        assert_eq!(config.num_threads, 4);
        assert_eq!(config.thread_name_prefix, "covfeat-worker");

        let pool = build_thread_pool(&config).unwrap();
        assert_eq!(pool.current_num_threads(), 4);
        let name = pool.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.unwrap().starts_with("covfeat-worker-"));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = ThreadPoolConfig::default().with_threads(0);
        assert!(matches!(build_thread_pool(&config), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_partition_ranges_balanced() {
        for len in [0usize, 1, 7, 10, 100, 1001] {
            for parts in 1..=9 {
                let ranges = partition_ranges(len, parts);
                assert_eq!(ranges.len(), parts);
                assert_eq!(ranges[0].start, 0);
                assert_eq!(ranges[parts - 1].end, len);
                for pair in ranges.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                let min = ranges.iter().map(|r| r.len()).min().unwrap();
                let max = ranges.iter().map(|r| r.len()).max().unwrap();
                assert!(max - min <= 1, "len {} parts {}", len, parts);
            }
        }
        assert_eq!(partition_ranges(10, 3), vec![0..3, 3..6, 6..10]);
        assert!(partition_ranges(10, 0).is_empty());
    }

    #[test]
    fn test_run_partitions_preserves_order() {
        let pool = build_thread_pool(&ThreadPoolConfig::default().with_threads(3)).unwrap();
        let sums = run_partitions(&pool, partition_ranges(30, 3), |range| {
            Ok(range.sum::<usize>())
        })
        .unwrap();
        assert_eq!(sums, vec![45, 145, 245]);
    }

    #[test]
    fn test_error_surfaces_after_all_partitions_finish() {
        let pool = build_thread_pool(&ThreadPoolConfig::default().with_threads(4)).unwrap();
        let finished = AtomicUsize::new(0);

        let result = run_partitions(&pool, partition_ranges(40, 4), |range| {
            let failing = range.contains(&5);
            finished.fetch_add(1, Ordering::SeqCst);
            if failing {
                Err(Error::DegenerateGeometry { point_id: 5 })
            } else {
                Ok(())
            }
        });

        assert!(matches!(result, Err(Error::DegenerateGeometry { point_id: 5 })));
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }
}
