//! Shared-memory backend on a rayon thread pool.

use rayon::prelude::*;
use tracing::debug;

use super::{Backend, PartitionTask};
use crate::collector::TopK;
use crate::error::{QuiverError, Result};

/// Runs partitions as rayon tasks on a dedicated pool.
pub struct ThreadPool {
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    /// Builds a pool with `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| QuiverError::invalid_parameter(format!("thread pool: {e}")))?;
        Ok(Self { pool })
    }
}

impl Backend for ThreadPool {
    fn execute(
        &self,
        partitions: &[Vec<u32>],
        _capacity: usize,
        task: &dyn PartitionTask,
    ) -> Result<Vec<TopK>> {
        debug!(
            partitions = partitions.len(),
            threads = self.pool.current_num_threads(),
            "dispatching scan to thread pool"
        );

        let collectors = self.pool.install(|| {
            partitions
                .par_iter()
                .map(|clusters| task.run(clusters))
                .collect::<Vec<TopK>>()
        });

        Ok(collectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Candidate;

    struct EchoTask;

    impl PartitionTask for EchoTask {
        fn run(&self, clusters: &[u32]) -> TopK {
            let mut topk = TopK::new(8);
            for &c in clusters {
                topk.offer(Candidate::new(c as f32, c));
            }
            topk
        }
    }

    #[test]
    fn test_collectors_in_partition_order() {
        let backend = ThreadPool::new(2).unwrap();
        let partitions = vec![vec![7u32], vec![1, 2], vec![9]];

        let collectors = backend.execute(&partitions, 8, &EchoTask).unwrap();
        assert_eq!(collectors.len(), 3);
        assert_eq!(collectors[0].clone().drain()[0].id, 7);
        assert_eq!(collectors[1].len(), 2);
        assert_eq!(collectors[2].clone().drain()[0].id, 9);
    }
}
