//! End-to-end search correctness across modes and backends.

use quiver::{
    BackendKind, ClusterLayout, PqCodebook, QuiverError, SearchConfig, SearchResult, Searcher,
    SearcherBuilder, SqParams, VectorStore,
};

const DIM: usize = 16;
const N: usize = 200;
const N_CLUSTERS: usize = 8;

fn base_collection() -> VectorStore {
    VectorStore::random_unit(N, DIM)
}

/// Exact top-k by brute force, ties toward the smaller id.
fn ground_truth(base: &VectorStore, query: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut scored: Vec<(u32, f32)> = (0..base.len())
        .map(|i| {
            let dot: f32 = query.iter().zip(base.row(i)).map(|(a, b)| a * b).sum();
            (i as u32, 1.0 - dot)
        })
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(k);
    scored
}

/// Assigns every vector to its nearest of the first `n_clusters` rows.
fn build_ivf(base: &VectorStore, n_clusters: usize) -> (VectorStore, ClusterLayout) {
    let centroids = VectorStore::new(
        base.as_slice()[..n_clusters * base.dim()].to_vec(),
        base.dim(),
    )
    .unwrap();

    let mut members: Vec<Vec<u32>> = vec![Vec::new(); n_clusters];
    for i in 0..base.len() {
        let mut best = 0;
        let mut best_dot = f32::NEG_INFINITY;
        for c in 0..n_clusters {
            let dot: f32 = base
                .row(i)
                .iter()
                .zip(centroids.row(c))
                .map(|(a, b)| a * b)
                .sum();
            if dot > best_dot {
                best_dot = dot;
                best = c;
            }
        }
        members[best].push(i as u32);
    }

    let mut new_to_old = Vec::with_capacity(base.len());
    let mut offsets = vec![0u32];
    for cluster in &members {
        new_to_old.extend_from_slice(cluster);
        offsets.push(new_to_old.len() as u32);
    }
    (centroids, ClusterLayout::new(new_to_old, offsets).unwrap())
}

/// Codebooks sampled from the first `center_num` base rows, plus the codes
/// of every base vector against them.
fn build_pq(base: &VectorStore, m: usize, center_num: usize) -> (PqCodebook, Vec<u8>) {
    let seg_dim = base.dim() / m;
    let mut centroids = Vec::with_capacity(m * center_num * seg_dim);
    for j in 0..m {
        for c in 0..center_num {
            let row = base.row(c % base.len());
            centroids.extend_from_slice(&row[j * seg_dim..(j + 1) * seg_dim]);
        }
    }
    let codebook = PqCodebook::new(centroids, m, center_num, seg_dim).unwrap();

    let mut codes = Vec::with_capacity(base.len() * m);
    for i in 0..base.len() {
        codes.extend(codebook.encode(base.row(i)));
    }
    (codebook, codes)
}

fn ids(results: &[SearchResult]) -> Vec<u32> {
    results.iter().map(|r| r.id).collect()
}

/// A rerank factor wide enough that every scanned candidate survives to the
/// exact rerank, making quantized modes exact for equality assertions.
fn exhaustive_factor(k: usize) -> f32 {
    (N as f32 / k as f32) + 1.0
}

fn full_searcher(base: &VectorStore) -> Searcher {
    let (centroids, layout) = build_ivf(base, N_CLUSTERS);
    let (codebook, codes) = build_pq(base, 4, 16);
    SearcherBuilder::new(base.clone())
        .coarse_index(centroids, layout)
        .unwrap()
        .pq(codebook, codes)
        .sq(SqParams::default())
        .build()
        .unwrap()
}

#[test]
fn test_flat_matches_brute_force_for_all_k() {
    let base = base_collection();
    let searcher = SearcherBuilder::new(base.clone()).build().unwrap();
    let query: Vec<f32> = base.row(17).to_vec();

    for k in [1, 3, 10, N] {
        let hits = searcher
            .search(&query, k, &SearchConfig::flat().with_workers(4))
            .unwrap();
        let truth = ground_truth(&base, &query, k);
        assert_eq!(hits.len(), k);
        assert_eq!(
            ids(&hits),
            truth.iter().map(|&(id, _)| id).collect::<Vec<_>>(),
            "k={k}"
        );
    }
}

#[test]
fn test_self_distance_is_zero() {
    let base = base_collection();
    let searcher = SearcherBuilder::new(base.clone()).build().unwrap();

    let query: Vec<f32> = base.row(42).to_vec();
    let hits = searcher.search(&query, 1, &SearchConfig::flat()).unwrap();
    assert_eq!(hits[0].id, 42);
    assert!(hits[0].distance.abs() < 1e-5);
}

#[test]
fn test_k_beyond_collection_truncates() {
    let base = VectorStore::random_unit(5, DIM);
    let searcher = SearcherBuilder::new(base).build().unwrap();
    let hits = searcher
        .search(&vec![0.1; DIM], 50, &SearchConfig::flat())
        .unwrap();
    assert_eq!(hits.len(), 5);
}

#[test]
fn test_results_ascend_by_distance() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query: Vec<f32> = base.row(3).to_vec();

    for config in [
        SearchConfig::flat(),
        SearchConfig::ivf(N_CLUSTERS),
        SearchConfig::ivf_pq(N_CLUSTERS, 8.0),
        SearchConfig::ivf_sq(N_CLUSTERS, 8.0),
    ] {
        let hits = searcher.search(&query, 10, &config).unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance, "mode {:?}", config.mode);
        }
    }
}

#[test]
fn test_ivf_full_probe_matches_flat() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query: Vec<f32> = base.row(9).to_vec();

    let flat = searcher.search(&query, 10, &SearchConfig::flat()).unwrap();
    let ivf = searcher
        .search(&query, 10, &SearchConfig::ivf(N_CLUSTERS))
        .unwrap();
    assert_eq!(ids(&flat), ids(&ivf));
}

#[test]
fn test_quantized_modes_exact_under_full_rerank() {
    // Probing every cluster with a survivor set as large as the collection
    // makes the exact rerank see every vector, so both quantized modes must
    // reproduce the flat result id-for-id.
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query: Vec<f32> = base.row(11).to_vec();
    let k = 10;

    let flat = searcher.search(&query, k, &SearchConfig::flat()).unwrap();
    for config in [
        SearchConfig::ivf_pq(N_CLUSTERS, exhaustive_factor(k)),
        SearchConfig::ivf_sq(N_CLUSTERS, exhaustive_factor(k)),
    ] {
        let hits = searcher.search(&query, k, &config).unwrap();
        assert_eq!(ids(&flat), ids(&hits), "mode {:?}", config.mode);
        for (a, b) in flat.iter().zip(hits.iter()) {
            assert!((a.distance - b.distance).abs() < 1e-5);
        }
    }
}

#[test]
fn test_unpacked_pq_path() {
    // center_num = 8 stays on the float-table scan path.
    let base = base_collection();
    let (centroids, layout) = build_ivf(&base, N_CLUSTERS);
    let (codebook, codes) = build_pq(&base, 4, 8);
    let searcher = SearcherBuilder::new(base.clone())
        .coarse_index(centroids, layout)
        .unwrap()
        .pq(codebook, codes)
        .build()
        .unwrap();

    let query: Vec<f32> = base.row(11).to_vec();
    let flat = searcher.search(&query, 10, &SearchConfig::flat()).unwrap();
    let pq = searcher
        .search(&query, 10, &SearchConfig::ivf_pq(N_CLUSTERS, exhaustive_factor(10)))
        .unwrap();
    assert_eq!(ids(&flat), ids(&pq));
}

#[test]
fn test_recall_monotone_in_rerank_factor() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query: Vec<f32> = base.row(0).to_vec();
    let k = 10;

    let truth: Vec<u32> = ground_truth(&base, &query, k).iter().map(|&(id, _)| id).collect();
    let recall = |factor: f32| -> usize {
        let hits = searcher
            .search(&query, k, &SearchConfig::ivf_pq(N_CLUSTERS, factor))
            .unwrap();
        ids(&hits).iter().filter(|id| truth.contains(id)).count()
    };

    let mut last = 0;
    for factor in [1.0, 2.0, 4.0, 8.0, exhaustive_factor(k)] {
        let r = recall(factor);
        assert!(r >= last, "recall dropped from {last} to {r} at factor {factor}");
        last = r;
    }
    assert_eq!(last, k);
}

#[test]
fn test_backends_return_same_results() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query: Vec<f32> = base.row(5).to_vec();

    for mode_config in [
        SearchConfig::flat(),
        SearchConfig::ivf(4),
        SearchConfig::ivf_pq(4, 6.0),
        SearchConfig::ivf_sq(4, 6.0),
    ] {
        let mut per_backend = Vec::new();
        for backend in [
            BackendKind::ThreadPool,
            BackendKind::ProcessGroup,
            BackendKind::AcceleratorBatch,
        ] {
            let config = mode_config.clone().with_workers(3).with_backend(backend);
            per_backend.push(ids(&searcher.search(&query, 10, &config).unwrap()));
        }
        assert_eq!(per_backend[0], per_backend[1], "mode {:?}", mode_config.mode);
        assert_eq!(per_backend[1], per_backend[2], "mode {:?}", mode_config.mode);
    }
}

#[test]
fn test_narrow_probe_skips_unprobed_clusters() {
    let base = base_collection();
    let (centroids, layout) = build_ivf(&base, N_CLUSTERS);
    let probed_members: Vec<u32> = (0..layout.n_clusters())
        .flat_map(|c| layout.cluster_range(c).map(|r| layout.original_id(r)).collect::<Vec<_>>())
        .collect();
    assert_eq!(probed_members.len(), N);

    let searcher = SearcherBuilder::new(base.clone())
        .coarse_index(centroids.clone(), layout)
        .unwrap()
        .build()
        .unwrap();

    // With nprobe=1 the query's own cluster is probed; every returned id
    // must belong to it.
    let query: Vec<f32> = base.row(30).to_vec();
    let hits = searcher.search(&query, 5, &SearchConfig::ivf(1)).unwrap();

    let (_, layout) = build_ivf(&base, N_CLUSTERS);
    let best_cluster = (0..N_CLUSTERS)
        .max_by(|&a, &b| {
            let dot = |c: usize| -> f32 {
                query.iter().zip(centroids.row(c)).map(|(x, y)| x * y).sum()
            };
            dot(a).total_cmp(&dot(b))
        })
        .unwrap();
    let members: Vec<u32> = layout
        .cluster_range(best_cluster)
        .map(|r| layout.original_id(r))
        .collect();
    for hit in &hits {
        assert!(members.contains(&hit.id), "id {} outside probed cluster", hit.id);
    }
}

#[test]
fn test_search_batch_matches_individual_searches() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let config = SearchConfig::ivf(4);

    let queries: Vec<f32> = [7usize, 21, 33]
        .iter()
        .flat_map(|&i| base.row(i).to_vec())
        .collect();
    let batched = searcher.search_batch(&queries, 5, &config).unwrap();
    assert_eq!(batched.len(), 3);

    for (chunk, batch_hits) in queries.chunks(DIM).zip(&batched) {
        let single = searcher.search(chunk, 5, &config).unwrap();
        assert_eq!(ids(&single), ids(batch_hits));
    }
}

#[test]
fn test_error_paths() {
    let base = base_collection();
    let searcher = full_searcher(&base);
    let query = vec![0.1f32; DIM];

    // nprobe beyond the cluster count
    assert!(matches!(
        searcher
            .search(&query, 5, &SearchConfig::ivf(N_CLUSTERS + 1))
            .unwrap_err(),
        QuiverError::InsufficientClusters { .. }
    ));

    // wrong query dimension
    assert!(matches!(
        searcher
            .search(&vec![0.1f32; DIM * 2], 5, &SearchConfig::flat())
            .unwrap_err(),
        QuiverError::DimensionMismatch { .. }
    ));

    // quantized mode on an index without quantization structures
    let plain = SearcherBuilder::new(base).build().unwrap();
    assert!(plain
        .search(&query, 5, &SearchConfig::ivf_pq(2, 4.0))
        .is_err());
}
