//! Coarse inverted-file index: centroid table plus cluster-contiguous layout.
//!
//! The layout is produced offline together with the centroids. It is
//! validated once here at load time; every later access assumes it is sound.

use smallvec::SmallVec;

use crate::error::{QuiverError, Result};
use crate::kernel;
use crate::vector::VectorStore;

/// Probed cluster lists are tiny in practice; keep them off the heap.
pub type ProbedClusters = SmallVec<[u32; 16]>;

/// Permutation from cluster-contiguous storage order back to original ids,
/// plus per-cluster offsets into that order.
///
/// Cluster `c` occupies storage rows `offsets[c]..offsets[c+1]`.
#[derive(Clone, Debug)]
pub struct ClusterLayout {
    new_to_old: Vec<u32>,
    offsets: Vec<u32>,
}

impl ClusterLayout {
    /// Validates and wraps a loaded layout.
    ///
    /// Checks that offsets are monotone and cover `new_to_old` exactly, and
    /// that `new_to_old` is a bijection on `0..n`. These checks run once;
    /// per-query code trusts the layout afterwards.
    pub fn new(new_to_old: Vec<u32>, offsets: Vec<u32>) -> Result<Self> {
        if offsets.len() < 2 {
            return Err(QuiverError::corrupt_layout(
                "offsets must cover at least one cluster",
            ));
        }
        if offsets[0] != 0 {
            return Err(QuiverError::corrupt_layout("offsets must start at 0"));
        }
        for pair in offsets.windows(2) {
            if pair[1] < pair[0] {
                return Err(QuiverError::corrupt_layout(format!(
                    "offsets decrease: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        let n = new_to_old.len();
        if *offsets.last().unwrap() as usize != n {
            return Err(QuiverError::corrupt_layout(format!(
                "offsets end at {} but the permutation has {} entries",
                offsets.last().unwrap(),
                n
            )));
        }

        let mut seen = vec![false; n];
        for &old in &new_to_old {
            let old = old as usize;
            if old >= n {
                return Err(QuiverError::corrupt_layout(format!(
                    "permutation entry {old} out of range for {n} vectors"
                )));
            }
            if seen[old] {
                return Err(QuiverError::corrupt_layout(format!(
                    "permutation maps id {old} twice"
                )));
            }
            seen[old] = true;
        }

        Ok(Self { new_to_old, offsets })
    }

    /// Number of clusters.
    #[inline]
    pub fn n_clusters(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of vectors covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.new_to_old.len()
    }

    /// True when the layout covers no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.new_to_old.is_empty()
    }

    /// Storage row range of cluster `c`.
    #[inline]
    pub fn cluster_range(&self, c: usize) -> std::ops::Range<usize> {
        self.offsets[c] as usize..self.offsets[c + 1] as usize
    }

    /// Member count of cluster `c`.
    #[inline]
    pub fn cluster_size(&self, c: usize) -> usize {
        (self.offsets[c + 1] - self.offsets[c]) as usize
    }

    /// Original id of the vector stored at cluster-contiguous row `row`.
    #[inline]
    pub fn original_id(&self, row: usize) -> u32 {
        self.new_to_old[row]
    }

    /// The full storage-order permutation.
    #[inline]
    pub fn permutation(&self) -> &[u32] {
        &self.new_to_old
    }
}

/// Centroid table plus layout; answers "which clusters should this query
/// look at".
#[derive(Clone, Debug)]
pub struct CoarseIndex {
    centroids: VectorStore,
    layout: ClusterLayout,
}

impl CoarseIndex {
    /// Pairs a loaded centroid table with its layout.
    pub fn new(centroids: VectorStore, layout: ClusterLayout) -> Result<Self> {
        if centroids.len() != layout.n_clusters() {
            return Err(QuiverError::corrupt_layout(format!(
                "{} centroids but layout describes {} clusters",
                centroids.len(),
                layout.n_clusters()
            )));
        }
        Ok(Self { centroids, layout })
    }

    #[inline]
    pub fn layout(&self) -> &ClusterLayout {
        &self.layout
    }

    #[inline]
    pub fn n_clusters(&self) -> usize {
        self.layout.n_clusters()
    }

    /// Selects the `nprobe` clusters whose centroids are closest to the
    /// query, ascending by distance with ties broken by ascending cluster id.
    ///
    /// O(n_clusters * d) distance evaluation plus a partial select.
    pub fn probe(&self, query: &[f32], nprobe: usize) -> Result<ProbedClusters> {
        let n_clusters = self.n_clusters();
        if nprobe > n_clusters {
            return Err(QuiverError::insufficient_clusters(nprobe, n_clusters));
        }
        if nprobe == 0 {
            return Ok(ProbedClusters::new());
        }

        let mut scored: Vec<(f32, u32)> = (0..n_clusters)
            .map(|c| {
                let dist = 1.0 - kernel::inner_product(query, self.centroids.row(c));
                (dist, c as u32)
            })
            .collect();

        let cmp = |a: &(f32, u32), b: &(f32, u32)| {
            a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1))
        };
        if nprobe < n_clusters {
            scored.select_nth_unstable_by(nprobe - 1, cmp);
        }
        let mut selected = scored[..nprobe].to_vec();
        selected.sort_unstable_by(cmp);

        Ok(selected.into_iter().map(|(_, c)| c).collect())
    }
}
