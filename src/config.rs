//! Per-query search configuration.
//!
//! The configuration is an explicit value threaded through the pipeline for
//! each query; there is no ambient/global tuning state.

use crate::error::{QuiverError, Result};
use serde::{Deserialize, Serialize};

/// Which index structures a search uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SearchMode {
    /// Exhaustive exact scan of the whole base collection.
    #[default]
    Flat,
    /// Coarse probe, then exact scan of the selected clusters.
    Ivf,
    /// Coarse probe, product-quantized scan, exact rerank.
    IvfPq,
    /// Coarse probe, byte-quantized scan, exact rerank.
    IvfSq,
}

impl SearchMode {
    /// True if the scan stage uses approximate (quantized) distances.
    pub const fn is_quantized(&self) -> bool {
        matches!(self, Self::IvfPq | Self::IvfSq)
    }

    /// True if the mode probes a coarse index before scanning.
    pub const fn uses_coarse(&self) -> bool {
        !matches!(self, Self::Flat)
    }

    /// Parses from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "flat" => Some(Self::Flat),
            "ivf" => Some(Self::Ivf),
            "ivf+pq" | "ivfpq" => Some(Self::IvfPq),
            "ivf+sq" | "ivfsq" => Some(Self::IvfSq),
            _ => None,
        }
    }
}

/// Which executor runs the scan/rerank workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// In-process rayon thread pool.
    #[default]
    ThreadPool,
    /// Cooperating workers exchanging serialized result batches.
    ProcessGroup,
    /// Bulk execution returning fixed-size result arrays per partition.
    AcceleratorBatch,
}

/// Per-query tuning knobs for [`Searcher::search`](crate::Searcher::search).
///
/// `rerank_factor` is the dominant recall/latency knob for quantized modes:
/// the scan stage keeps `ceil(k * rerank_factor)` candidates before the exact
/// rerank narrows them back to `k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Index structures to use.
    pub mode: SearchMode,
    /// Number of coarse clusters probed per query (ivf modes).
    pub nprobe: usize,
    /// Widening ratio for the candidate set before rerank (quantized modes).
    pub rerank_factor: f32,
    /// Number of parallel workers; 0 means one per available core.
    pub worker_count: usize,
    /// Executor backend.
    pub backend: BackendKind,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Flat,
            nprobe: 1,
            rerank_factor: 15.0,
            worker_count: 0,
            backend: BackendKind::ThreadPool,
        }
    }
}

impl SearchConfig {
    /// Configuration for exhaustive exact search.
    pub fn flat() -> Self {
        Self::default()
    }

    /// Configuration for exact IVF search probing `nprobe` clusters.
    pub fn ivf(nprobe: usize) -> Self {
        Self {
            mode: SearchMode::Ivf,
            nprobe,
            ..Self::default()
        }
    }

    /// Configuration for PQ-accelerated IVF search.
    pub fn ivf_pq(nprobe: usize, rerank_factor: f32) -> Self {
        Self {
            mode: SearchMode::IvfPq,
            nprobe,
            rerank_factor,
            ..Self::default()
        }
    }

    /// Configuration for SQ-accelerated IVF search.
    pub fn ivf_sq(nprobe: usize, rerank_factor: f32) -> Self {
        Self {
            mode: SearchMode::IvfSq,
            nprobe,
            rerank_factor,
            ..Self::default()
        }
    }

    /// Sets the worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers;
        self
    }

    /// Sets the executor backend.
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Checks internal consistency of the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.mode.uses_coarse() && self.nprobe == 0 {
            return Err(QuiverError::invalid_parameter("nprobe must be at least 1"));
        }
        if self.mode.is_quantized() && !(self.rerank_factor >= 1.0) {
            return Err(QuiverError::invalid_parameter(
                "rerank_factor must be >= 1.0",
            ));
        }
        Ok(())
    }

    /// Worker count with the "0 = all cores" default resolved.
    pub fn resolved_workers(&self) -> usize {
        if self.worker_count > 0 {
            self.worker_count
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
