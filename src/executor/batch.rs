//! Bulk accelerator-style backend.
//!
//! Models an offload device: all partition work is submitted as one bulk
//! job, and the device hands back a single flat buffer of fixed-size
//! (distance, id) rows, one row of `capacity` entries per partition,
//! sentinel-padded. The host side then converts rows back into collectors.
//! No state crosses the boundary except the self-contained result buffer.

use tracing::debug;

use super::{Backend, PartitionTask};
use crate::collector::{Candidate, TopK, NO_CANDIDATE};
use crate::error::Result;

/// Backend producing one fixed-size result array per partition.
#[derive(Default)]
pub struct AcceleratorBatch;

impl AcceleratorBatch {
    pub fn new() -> Self {
        Self
    }
}

impl Backend for AcceleratorBatch {
    fn execute(
        &self,
        partitions: &[Vec<u32>],
        capacity: usize,
        task: &dyn PartitionTask,
    ) -> Result<Vec<TopK>> {
        debug!(
            partitions = partitions.len(),
            capacity, "dispatching scan as accelerator batch"
        );

        // Bulk phase: one flat result buffer, partitions.len() rows of
        // `capacity` entries each.
        let mut results: Vec<Candidate> = Vec::with_capacity(partitions.len() * capacity);
        for clusters in partitions {
            let mut row = task.run(clusters).drain();
            row.resize(capacity, NO_CANDIDATE);
            results.extend_from_slice(&row);
        }

        // Host phase: rows back into collectors.
        let collectors = results
            .chunks(capacity)
            .map(|row| {
                let mut topk = TopK::new(capacity);
                for &candidate in row {
                    topk.offer(candidate);
                }
                topk
            })
            .collect();

        Ok(collectors)
    }
}
