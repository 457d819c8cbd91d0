//! Message-passing backend: cooperating workers exchanging serialized,
//! fixed-size result batches.
//!
//! Workers never share mutable state; each scans its partition against the
//! read-only structures, pads its candidates to exactly `capacity` entries
//! with the [`NO_CANDIDATE`] sentinel, serializes the batch, and ships it to
//! the orchestrator. The orchestrator is the sole reader and rebuilds one
//! collector per worker, dropping sentinels on the way in.

use std::sync::mpsc;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Backend, PartitionTask};
use crate::collector::{Candidate, TopK, NO_CANDIDATE};
use crate::error::{QuiverError, Result};

/// Self-contained result batch crossing the transport boundary.
#[derive(Serialize, Deserialize)]
struct ResultBatch {
    worker: usize,
    candidates: Vec<Candidate>,
}

impl ResultBatch {
    /// Drains a collector into exactly `capacity` entries, sentinel-padded.
    fn from_collector(worker: usize, collector: TopK, capacity: usize) -> Self {
        let mut candidates = collector.drain();
        candidates.resize(capacity, NO_CANDIDATE);
        Self { worker, candidates }
    }

    fn into_collector(self, capacity: usize) -> TopK {
        let mut topk = TopK::new(capacity);
        for candidate in self.candidates {
            // offer drops sentinels itself
            topk.offer(candidate);
        }
        topk
    }
}

/// Backend modeling a group of independent processes gathered by rank 0.
pub struct ProcessGroup {
    workers: usize,
}

impl ProcessGroup {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

impl Backend for ProcessGroup {
    fn execute(
        &self,
        partitions: &[Vec<u32>],
        capacity: usize,
        task: &dyn PartitionTask,
    ) -> Result<Vec<TopK>> {
        debug!(
            partitions = partitions.len(),
            workers = self.workers,
            "dispatching scan to process group"
        );

        let (tx, rx) = mpsc::channel::<(usize, Vec<u8>)>();

        let wire: Vec<(usize, Vec<u8>)> = thread::scope(|scope| -> Result<Vec<(usize, Vec<u8>)>> {
            for (worker, clusters) in partitions.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let collector = task.run(clusters);
                    let batch = ResultBatch::from_collector(worker, collector, capacity);
                    let bytes = bincode::serialize(&batch).unwrap_or_default();
                    trace!(worker, bytes = bytes.len(), "worker batch serialized");
                    // A closed receiver means the orchestrator already gave
                    // up on this query; nothing left to do.
                    let _ = tx.send((worker, bytes));
                });
            }
            drop(tx);

            let mut received = Vec::with_capacity(partitions.len());
            for _ in 0..partitions.len() {
                let msg = rx
                    .recv()
                    .map_err(|_| QuiverError::WorkerLost(received.len()))?;
                received.push(msg);
            }
            Ok(received)
        })?;

        let mut collectors: Vec<Option<TopK>> = (0..partitions.len()).map(|_| None).collect();
        for (worker, bytes) in wire {
            if bytes.is_empty() {
                return Err(QuiverError::WorkerLost(worker));
            }
            let batch: ResultBatch = bincode::deserialize(&bytes)?;
            let slot = batch.worker;
            collectors[slot] = Some(batch.into_collector(capacity));
        }

        collectors
            .into_iter()
            .enumerate()
            .map(|(worker, c)| c.ok_or(QuiverError::WorkerLost(worker)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTask;

    impl PartitionTask for EchoTask {
        fn run(&self, clusters: &[u32]) -> TopK {
            let mut topk = TopK::new(3);
            for &c in clusters {
                topk.offer(Candidate::new(c as f32 * 0.1, c));
            }
            topk
        }
    }

    #[test]
    fn test_batch_round_trip_strips_padding() {
        let mut collector = TopK::new(5);
        collector.offer(Candidate::new(0.3, 1));
        collector.offer(Candidate::new(0.1, 2));

        let batch = ResultBatch::from_collector(0, collector, 5);
        assert_eq!(batch.candidates.len(), 5);
        assert!(batch.candidates[2].is_sentinel());

        let bytes = bincode::serialize(&batch).unwrap();
        let decoded: ResultBatch = bincode::deserialize(&bytes).unwrap();
        let rebuilt = decoded.into_collector(5);
        assert_eq!(rebuilt.len(), 2);
    }

    #[test]
    fn test_execute_gathers_all_workers() {
        let backend = ProcessGroup::new(3);
        let partitions = vec![vec![4u32, 8], vec![2], vec![6, 0]];

        let collectors = backend.execute(&partitions, 3, &EchoTask).unwrap();
        assert_eq!(collectors.len(), 3);
        assert_eq!(collectors[1].clone().drain()[0].id, 2);

        let mut merged = TopK::new(3);
        for c in collectors {
            merged.merge(c);
        }
        let ids: Vec<u32> = merged.drain().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 2, 4]);
    }

    #[test]
    fn test_empty_partition_yields_only_padding() {
        let backend = ProcessGroup::new(1);
        let collectors = backend.execute(&[Vec::new()], 4, &EchoTask).unwrap();
        assert_eq!(collectors.len(), 1);
        assert!(collectors[0].is_empty());
    }
}
