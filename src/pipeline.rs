//! Coarse-to-fine search pipeline.
//!
//! A query moves through probe, scan, rerank, and merge in a straight line;
//! any stage failure aborts the query. The scan stage runs partitioned
//! across workers through the executor; rerank is colocated with scan on
//! each worker so only final-k collectors cross the merge barrier.

use tracing::debug;

use crate::collector::{Candidate, TopK};
use crate::config::{SearchConfig, SearchMode};
use crate::error::{QuiverError, Result};
use crate::executor::{self, PartitionTask};
use crate::ivf::{ClusterLayout, CoarseIndex};
use crate::kernel::{self, F32_LANES, U8_LANES};
use crate::quant::{PackedQueryTable, PqCodebook, QueryTable, SqParams, PACKED_CENTERS};
use crate::vector::VectorStore;
use serde::{Deserialize, Serialize};

/// One search hit: original vector id and exact-or-approximate distance,
/// depending on the mode's final stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: u32,
    pub distance: f32,
}

/// Assembles a [`Searcher`] from externally built parts.
///
/// The base collection is mandatory; a coarse index enables the ivf modes,
/// and a PQ codebook or SQ parameters enable the corresponding quantized
/// scans. All structural validation happens in [`Self::build`].
pub struct SearcherBuilder {
    base: VectorStore,
    coarse: Option<CoarseIndex>,
    pq: Option<(PqCodebook, Vec<u8>)>,
    sq: Option<SqParams>,
}

impl SearcherBuilder {
    pub fn new(base: VectorStore) -> Self {
        Self {
            base,
            coarse: None,
            pq: None,
            sq: None,
        }
    }

    /// Attaches a loaded centroid table and cluster layout.
    pub fn coarse_index(mut self, centroids: VectorStore, layout: ClusterLayout) -> Result<Self> {
        self.coarse = Some(CoarseIndex::new(centroids, layout)?);
        Ok(self)
    }

    /// Attaches PQ codebooks and the base collection's codes, row-major in
    /// original id order (`n * m` bytes).
    pub fn pq(mut self, codebook: PqCodebook, codes: Vec<u8>) -> Self {
        self.pq = Some((codebook, codes));
        self
    }

    /// Attaches the scalar-quantization range the base was quantized with
    /// offline. Byte codes for the base are derived here at load time.
    pub fn sq(mut self, params: SqParams) -> Self {
        self.sq = Some(params);
        self
    }

    /// Validates dimensions and layout agreement, then materializes the
    /// cluster-contiguous arenas.
    pub fn build(self) -> Result<Searcher> {
        let base = self.base;
        let d = base.dim();
        let n = base.len();

        if d % F32_LANES != 0 {
            return Err(QuiverError::not_lane_aligned(d, F32_LANES));
        }
        if self.sq.is_some() && d % U8_LANES != 0 {
            return Err(QuiverError::not_lane_aligned(d, U8_LANES));
        }

        if let Some(coarse) = &self.coarse {
            if coarse.layout().len() != n {
                return Err(QuiverError::corrupt_layout(format!(
                    "layout covers {} vectors but the base holds {}",
                    coarse.layout().len(),
                    n
                )));
            }
        }

        // Cluster-contiguous arenas, built once. Without a coarse index the
        // identity ordering stands in so flat scans use the same access path.
        let permutation: Vec<u32> = match &self.coarse {
            Some(coarse) => coarse.layout().permutation().to_vec(),
            None => (0..n as u32).collect(),
        };
        let sorted_base = base.permuted(&permutation);

        let pq = match self.pq {
            Some((codebook, codes)) => {
                if codebook.dim() != d {
                    return Err(QuiverError::dimension_mismatch(d, codebook.dim()));
                }
                if codes.len() != n * codebook.m() {
                    return Err(QuiverError::invalid_parameter(format!(
                        "code array holds {} bytes for {} vectors of {} segments",
                        codes.len(),
                        n,
                        codebook.m()
                    )));
                }
                let m = codebook.m();
                let mut sorted_codes = Vec::with_capacity(codes.len());
                for &old in &permutation {
                    let start = old as usize * m;
                    sorted_codes.extend_from_slice(&codes[start..start + m]);
                }
                Some(PqParts {
                    codebook,
                    sorted_codes,
                })
            }
            None => None,
        };

        let sq = match self.sq {
            Some(params) => {
                let mut sorted_bytes = Vec::with_capacity(n * d);
                for row in 0..n {
                    sorted_bytes.extend(params.quantize(sorted_base.row(row)));
                }
                Some(SqParts {
                    params,
                    sorted_bytes,
                })
            }
            None => None,
        };

        debug!(n, d, clusters = self.coarse.as_ref().map(|c| c.n_clusters()), "searcher built");

        Ok(Searcher {
            base,
            sorted_base,
            coarse: self.coarse,
            pq,
            sq,
        })
    }
}

#[derive(Debug)]
struct PqParts {
    codebook: PqCodebook,
    sorted_codes: Vec<u8>,
}

#[derive(Debug)]
struct SqParts {
    params: SqParams,
    sorted_bytes: Vec<u8>,
}

/// Read-only search service over a loaded index.
#[derive(Debug)]
pub struct Searcher {
    /// Original id order; rerank reads exact vectors from here.
    base: VectorStore,
    /// Cluster-contiguous order; scans walk this arena.
    sorted_base: VectorStore,
    coarse: Option<CoarseIndex>,
    pq: Option<PqParts>,
    sq: Option<SqParts>,
}

impl Searcher {
    #[inline]
    pub fn dim(&self) -> usize {
        self.base.dim()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.base.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// Top-k search, ascending by distance with ties toward smaller ids.
    ///
    /// Returns at most `k` hits; fewer when the collection (or the probed
    /// portion of it) holds fewer vectors. `k == 0` and an empty collection
    /// both yield an empty result rather than an error.
    pub fn search(&self, query: &[f32], k: usize, config: &SearchConfig) -> Result<Vec<SearchResult>> {
        config.validate()?;
        if query.len() != self.dim() {
            return Err(QuiverError::dimension_mismatch(self.dim(), query.len()));
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let workers = config.resolved_workers();
        let rerank_width = (k as f32 * config.rerank_factor).ceil() as usize;

        // PROBE, or a synthetic row-range partition for flat mode.
        let mut flat_chunks = 0;
        let partitions = if config.mode.uses_coarse() {
            let coarse = self.coarse.as_ref().ok_or_else(|| {
                QuiverError::invalid_parameter("ivf modes require a coarse index")
            })?;
            let probed = coarse.probe(query, config.nprobe)?;
            debug!(nprobe = probed.len(), "probe selected clusters");
            executor::partition_clusters(
                &probed,
                |c| coarse.layout().cluster_size(c as usize),
                workers,
            )
        } else {
            let partitions = self.flat_partitions(workers);
            flat_chunks = partitions.len();
            partitions
        };

        if partitions.is_empty() {
            return Ok(Vec::new());
        }

        // Per-query tables, shared read-only across workers.
        let scan = self.prepare_scan(query, config.mode)?;
        let task = QueryTask {
            searcher: self,
            query,
            k,
            rerank_width,
            flat_chunks,
            scan,
        };

        // SCAN and colocated RERANK on the workers, then MERGE.
        let backend = executor::create_backend(config.backend, workers)?;
        let collectors = backend.execute(&partitions, k, &task)?;

        let mut merged = TopK::new(k);
        for collector in collectors {
            merged.merge(collector);
        }

        Ok(merged
            .drain()
            .into_iter()
            .map(|c| SearchResult {
                id: c.id,
                distance: c.distance,
            })
            .collect())
    }

    /// Independent searches over a batch of queries, flattened row-major
    /// into `queries` (`queries.len() / dim` rows).
    pub fn search_batch(
        &self,
        queries: &[f32],
        k: usize,
        config: &SearchConfig,
    ) -> Result<Vec<Vec<SearchResult>>> {
        if queries.len() % self.dim() != 0 {
            return Err(QuiverError::dimension_mismatch(
                self.dim(),
                queries.len() % self.dim(),
            ));
        }
        queries
            .chunks(self.dim())
            .map(|query| self.search(query, k, config))
            .collect()
    }

    /// Splits the row space into contiguous chunks, one synthetic "cluster"
    /// per chunk, so flat mode reuses the cluster-partitioned executor path.
    fn flat_partitions(&self, workers: usize) -> Vec<Vec<u32>> {
        let n = self.len();
        let workers = workers.clamp(1, n);
        (0..workers as u32).map(|w| vec![w]).collect()
    }

    fn flat_chunk_range(&self, chunk: u32, chunks: usize) -> std::ops::Range<usize> {
        let n = self.len();
        let per = n.div_ceil(chunks);
        let start = (chunk as usize * per).min(n);
        start..((chunk as usize + 1) * per).min(n)
    }

    fn layout(&self) -> Result<&ClusterLayout> {
        self.coarse
            .as_ref()
            .map(|c| c.layout())
            .ok_or_else(|| QuiverError::invalid_parameter("ivf modes require a coarse index"))
    }

    fn prepare_scan(&self, query: &[f32], mode: SearchMode) -> Result<ScanPlan<'_>> {
        Ok(match mode {
            SearchMode::Flat => ScanPlan::Flat,
            SearchMode::Ivf => ScanPlan::Exact {
                layout: self.layout()?,
            },
            SearchMode::IvfPq => {
                let parts = self.pq.as_ref().ok_or_else(|| {
                    QuiverError::invalid_parameter("ivf+pq mode requires a loaded PQ codebook")
                })?;
                let table = parts.codebook.build_query_table(query);
                let packed = if parts.codebook.center_num() == PACKED_CENTERS {
                    PackedQueryTable::build(&table)
                } else {
                    None
                };
                ScanPlan::Pq {
                    layout: self.layout()?,
                    m: parts.codebook.m(),
                    codes: &parts.sorted_codes,
                    table,
                    packed,
                }
            }
            SearchMode::IvfSq => {
                let parts = self.sq.as_ref().ok_or_else(|| {
                    QuiverError::invalid_parameter(
                        "ivf+sq mode requires scalar quantization parameters",
                    )
                })?;
                ScanPlan::Sq {
                    layout: self.layout()?,
                    bytes: &parts.sorted_bytes,
                    scale: parts.params.scale(),
                    offset: parts.params.offset(),
                    query_bytes: parts.params.quantize(query),
                }
            }
        })
    }
}

/// Per-query scan state computed once and read by every worker.
enum ScanPlan<'a> {
    Flat,
    Exact {
        layout: &'a ClusterLayout,
    },
    Pq {
        layout: &'a ClusterLayout,
        m: usize,
        codes: &'a [u8],
        table: QueryTable,
        packed: Option<PackedQueryTable>,
    },
    Sq {
        layout: &'a ClusterLayout,
        bytes: &'a [u8],
        scale: f32,
        offset: f32,
        query_bytes: Vec<u8>,
    },
}

/// One query bound to its searcher; executed by the backend once per
/// partition. Reads only shared immutable structures.
struct QueryTask<'a> {
    searcher: &'a Searcher,
    query: &'a [f32],
    k: usize,
    rerank_width: usize,
    /// Number of synthetic row-range chunks in flat mode; 0 otherwise.
    flat_chunks: usize,
    scan: ScanPlan<'a>,
}

impl PartitionTask for QueryTask<'_> {
    fn run(&self, clusters: &[u32]) -> TopK {
        match &self.scan {
            ScanPlan::Flat => self.scan_flat(clusters),
            ScanPlan::Exact { layout } => self.scan_exact(clusters, layout),
            ScanPlan::Pq {
                layout,
                m,
                codes,
                table,
                packed,
            } => {
                let survivors = match packed {
                    Some(packed) => self.scan_pq_packed(clusters, layout, *m, codes, packed),
                    None => self.scan_pq(clusters, layout, *m, codes, table),
                };
                self.rerank(survivors)
            }
            ScanPlan::Sq {
                layout,
                bytes,
                scale,
                offset,
                query_bytes,
            } => {
                let survivors =
                    self.scan_sq(clusters, layout, bytes, *scale, *offset, query_bytes);
                self.rerank(survivors)
            }
        }
    }
}

impl QueryTask<'_> {
    /// Exhaustive exact scan of one row-range chunk, in original id order.
    fn scan_flat(&self, chunks: &[u32]) -> TopK {
        let total_chunks = self.flat_chunks.max(1);
        let mut topk = TopK::new(self.k);
        for &chunk in chunks {
            for row in self.searcher.flat_chunk_range(chunk, total_chunks) {
                let dist = 1.0 - kernel::inner_product(self.query, self.searcher.base.row(row));
                topk.offer(Candidate::new(dist, row as u32));
            }
        }
        topk
    }

    /// Exact scan of the selected clusters; no rerank stage follows.
    fn scan_exact(&self, clusters: &[u32], layout: &ClusterLayout) -> TopK {
        let mut topk = TopK::new(self.k);
        for row in cluster_rows(clusters, layout) {
            let dist = 1.0 - kernel::inner_product(self.query, self.searcher.sorted_base.row(row));
            topk.offer(Candidate::new(dist, layout.original_id(row)));
        }
        topk
    }

    /// Table-lookup scan over PQ codes.
    fn scan_pq(
        &self,
        clusters: &[u32],
        layout: &ClusterLayout,
        m: usize,
        codes: &[u8],
        table: &QueryTable,
    ) -> TopK {
        let mut topk = TopK::new(self.rerank_width);
        for row in cluster_rows(clusters, layout) {
            let code = &codes[row * m..(row + 1) * m];
            topk.offer(Candidate::new(
                table.approx_distance(code),
                layout.original_id(row),
            ));
        }
        topk
    }

    /// Register-resident 16-centroid scan, 16 vectors per batch. Ranking
    /// happens in the packed byte range; rerank restores exact distances.
    fn scan_pq_packed(
        &self,
        clusters: &[u32],
        layout: &ClusterLayout,
        m: usize,
        codes: &[u8],
        packed: &PackedQueryTable,
    ) -> TopK {
        let mut topk = TopK::new(self.rerank_width);
        let mut sums = [0u16; 16];

        for &cluster in clusters {
            let range = layout.cluster_range(cluster as usize);
            let mut row = range.start;
            while row < range.end {
                let count = (range.end - row).min(16);
                let batch = &codes[row * m..(row + count) * m];
                packed.score_batch(batch, count, &mut sums);
                for (v, &sum) in sums.iter().enumerate().take(count) {
                    topk.offer(Candidate::new(
                        crate::quant::pq::packed_distance(sum),
                        layout.original_id(row + v),
                    ));
                }
                row += count;
            }
        }
        topk
    }

    /// Byte-quantized scan over the selected clusters.
    fn scan_sq(
        &self,
        clusters: &[u32],
        layout: &ClusterLayout,
        bytes: &[u8],
        scale: f32,
        offset: f32,
        query_bytes: &[u8],
    ) -> TopK {
        let d = self.searcher.dim();
        let mut topk = TopK::new(self.rerank_width);
        for row in cluster_rows(clusters, layout) {
            let code = &bytes[row * d..(row + 1) * d];
            let dist = 1.0 - kernel::quantized_inner_product(query_bytes, code, scale, offset);
            topk.offer(Candidate::new(dist, layout.original_id(row)));
        }
        topk
    }

    /// Exact rerank of the widened survivor set down to `k`. Candidate ids
    /// are original ids, so the unsorted base serves the exact reads.
    fn rerank(&self, survivors: TopK) -> TopK {
        let mut topk = TopK::new(self.k);
        for candidate in survivors.drain() {
            let exact = 1.0
                - kernel::inner_product(self.query, self.searcher.base.row(candidate.id as usize));
            topk.offer(Candidate::new(exact, candidate.id));
        }
        topk
    }
}

fn cluster_rows<'a>(
    clusters: &'a [u32],
    layout: &'a ClusterLayout,
) -> impl Iterator<Item = usize> + 'a {
    clusters
        .iter()
        .flat_map(move |&c| layout.cluster_range(c as usize))
}
