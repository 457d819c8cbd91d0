//! Parallel execution of scan/rerank work.
//!
//! The partitioning unit is a cluster, never an individual vector, so each
//! worker walks cluster-contiguous memory. Backends only see "run this task
//! over these partitions and hand back one collector per worker"; the
//! pipeline algorithm does not change when the backend does.

pub mod batch;
pub mod process_group;
pub mod thread_pool;

pub use batch::AcceleratorBatch;
pub use process_group::ProcessGroup;
pub use thread_pool::ThreadPool;

use crate::collector::TopK;
use crate::config::BackendKind;
use crate::error::Result;

/// One query's scan/rerank over one set of clusters. Implementations read
/// only shared immutable structures and write only their own collector.
pub trait PartitionTask: Sync {
    /// Scans the given clusters and returns a collector of capacity `k`.
    fn run(&self, clusters: &[u32]) -> TopK;
}

/// Executes a task over disjoint cluster partitions.
pub trait Backend {
    /// Runs `task` once per partition and returns the workers' collectors in
    /// partition order. `capacity` is the collectors' capacity; backends
    /// that move results over a transport use it to size their batches.
    fn execute(
        &self,
        partitions: &[Vec<u32>],
        capacity: usize,
        task: &dyn PartitionTask,
    ) -> Result<Vec<TopK>>;
}

/// Instantiates the backend selected by the configuration.
pub fn create_backend(kind: BackendKind, workers: usize) -> Result<Box<dyn Backend>> {
    Ok(match kind {
        BackendKind::ThreadPool => Box::new(ThreadPool::new(workers)?),
        BackendKind::ProcessGroup => Box::new(ProcessGroup::new(workers)),
        BackendKind::AcceleratorBatch => Box::new(AcceleratorBatch::new()),
    })
}

/// Assigns clusters to `workers` partitions by greedy bin-packing: clusters
/// sorted by member count descending, each placed on the currently
/// least-loaded worker. Cluster sizes are highly skewed, so round-robin
/// would routinely overload one worker.
///
/// Empty partitions are dropped; the union of the returned partitions is
/// exactly `clusters`, each id once. Deterministic for a given input.
pub fn partition_clusters(
    clusters: &[u32],
    cluster_size: impl Fn(u32) -> usize,
    workers: usize,
) -> Vec<Vec<u32>> {
    if clusters.is_empty() || workers == 0 {
        return Vec::new();
    }

    let mut ordered: Vec<u32> = clusters.to_vec();
    // Descending by size; equal sizes keep ascending cluster id.
    ordered.sort_by(|&a, &b| {
        cluster_size(b)
            .cmp(&cluster_size(a))
            .then_with(|| a.cmp(&b))
    });

    let workers = workers.min(clusters.len());
    let mut partitions: Vec<Vec<u32>> = vec![Vec::new(); workers];
    let mut loads = vec![0usize; workers];

    for cluster in ordered {
        let lightest = loads
            .iter()
            .enumerate()
            .min_by_key(|&(_, &load)| load)
            .map(|(i, _)| i)
            .unwrap_or(0);
        loads[lightest] += cluster_size(cluster);
        partitions[lightest].push(cluster);
    }

    partitions.retain(|p| !p.is_empty());
    partitions
}
