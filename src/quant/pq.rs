//! Product quantization: per-segment codebooks and query distance tables.
//!
//! A vector of dimension `d` is split into `m` segments of `d/m` components;
//! each segment is represented by the index of its nearest centroid among
//! `center_num` candidates. Codebook training happens offline; this module
//! only applies loaded codebooks.
//!
//! Per query, [`PqCodebook::build_query_table`] precomputes the inner product
//! of every segment of the query against every centroid of that segment. An
//! approximate distance for a base vector is then `1 -` the sum of `m` table
//! lookups indexed by its code, O(m) per vector instead of O(d).

use crate::error::{QuiverError, Result};
use crate::kernel;

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

/// Centroid count at which the packed register-resident fast path applies.
pub const PACKED_CENTERS: usize = 16;

/// Loaded product-quantizer codebooks.
///
/// Centroid layout is segment-major: the centroid `c` of segment `j` starts
/// at `(j * center_num + c) * seg_dim`.
#[derive(Clone, Debug)]
pub struct PqCodebook {
    centroids: Vec<f32>,
    m: usize,
    center_num: usize,
    seg_dim: usize,
}

impl PqCodebook {
    /// Wraps externally trained codebooks.
    pub fn new(centroids: Vec<f32>, m: usize, center_num: usize, seg_dim: usize) -> Result<Self> {
        if m == 0 || seg_dim == 0 {
            return Err(QuiverError::invalid_parameter(
                "segment count and width must be nonzero",
            ));
        }
        if center_num == 0 || center_num > 256 {
            return Err(QuiverError::invalid_parameter(format!(
                "center_num {center_num} does not fit a byte code"
            )));
        }
        let expected = m * center_num * seg_dim;
        if centroids.len() != expected {
            return Err(QuiverError::invalid_parameter(format!(
                "codebook length {} != m * center_num * seg_dim = {}",
                centroids.len(),
                expected
            )));
        }
        Ok(Self {
            centroids,
            m,
            center_num,
            seg_dim,
        })
    }

    /// Number of segments per vector.
    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    /// Centroids per segment.
    #[inline]
    pub fn center_num(&self) -> usize {
        self.center_num
    }

    /// Width of one segment.
    #[inline]
    pub fn seg_dim(&self) -> usize {
        self.seg_dim
    }

    /// Full vector dimension covered by the codebooks.
    #[inline]
    pub fn dim(&self) -> usize {
        self.m * self.seg_dim
    }

    /// Centroid `c` of segment `j`.
    #[inline]
    fn segment_centroid(&self, j: usize, c: usize) -> &[f32] {
        let start = (j * self.center_num + c) * self.seg_dim;
        &self.centroids[start..start + self.seg_dim]
    }

    /// Precomputes the query distance table: for every segment `j` and
    /// centroid `c`, the inner product of the query's segment `j` with that
    /// centroid. O(center_num * d) per query.
    pub fn build_query_table(&self, query: &[f32]) -> QueryTable {
        assert_eq!(query.len(), self.dim(), "query dimension must match codebook");

        let mut values = Vec::with_capacity(self.m * self.center_num);
        for j in 0..self.m {
            let query_seg = &query[j * self.seg_dim..(j + 1) * self.seg_dim];
            for c in 0..self.center_num {
                values.push(kernel::inner_product(query_seg, self.segment_centroid(j, c)));
            }
        }
        QueryTable {
            values,
            m: self.m,
            center_num: self.center_num,
        }
    }

    /// Encodes a vector as `m` centroid indices (nearest by squared L2 per
    /// segment). This is a load-boundary helper; production codes come from
    /// the offline builder.
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        assert_eq!(vector.len(), self.dim(), "vector dimension must match codebook");

        (0..self.m)
            .map(|j| {
                let seg = &vector[j * self.seg_dim..(j + 1) * self.seg_dim];
                let mut best = 0usize;
                let mut best_dist = f32::INFINITY;
                for c in 0..self.center_num {
                    let centroid = self.segment_centroid(j, c);
                    let dist: f32 = seg
                        .iter()
                        .zip(centroid.iter())
                        .map(|(a, b)| {
                            let diff = a - b;
                            diff * diff
                        })
                        .sum();
                    if dist < best_dist {
                        best_dist = dist;
                        best = c;
                    }
                }
                best as u8
            })
            .collect()
    }
}

/// Per-query lookup table of segment-by-centroid inner products.
///
/// Flat, segment-major layout: the entry for code `c` of segment `j` sits at
/// `j * center_num + c`.
#[derive(Clone, Debug)]
pub struct QueryTable {
    values: Vec<f32>,
    m: usize,
    center_num: usize,
}

impl QueryTable {
    /// Builds a table from raw values (primarily for tests and tooling).
    pub fn from_values(values: Vec<f32>, m: usize, center_num: usize) -> Result<Self> {
        if values.len() != m * center_num {
            return Err(QuiverError::invalid_parameter(format!(
                "table length {} != m * center_num = {}",
                values.len(),
                m * center_num
            )));
        }
        Ok(Self {
            values,
            m,
            center_num,
        })
    }

    /// Number of segments.
    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    /// Centroids per segment.
    #[inline]
    pub fn center_num(&self) -> usize {
        self.center_num
    }

    /// Table entry for code `c` of segment `j`.
    #[inline]
    pub fn value(&self, j: usize, c: usize) -> f32 {
        self.values[j * self.center_num + c]
    }

    /// Sum of the table entries selected by a code, dispatched to the
    /// fastest available implementation.
    #[inline]
    pub fn code_sum(&self, codes: &[u8]) -> f32 {
        debug_assert_eq!(codes.len(), self.m);
        #[cfg(target_arch = "x86_64")]
        {
            if self.m >= 8 && is_x86_feature_detected!("avx2") {
                // SAFETY: AVX2 availability was just verified; codes are
                // byte indices below center_num by construction.
                return unsafe { code_sum_gather_avx2(&self.values, codes, self.center_num) };
            }
        }
        self.code_sum_scalar(codes)
    }

    /// Scalar reference for [`Self::code_sum`].
    #[inline]
    pub fn code_sum_scalar(&self, codes: &[u8]) -> f32 {
        let mut sum = 0.0f32;
        for (j, &code) in codes.iter().enumerate() {
            sum += self.values[j * self.center_num + code as usize];
        }
        sum
    }

    /// Approximate distance of a coded base vector to the query:
    /// `1 - code_sum`.
    #[inline]
    pub fn approx_distance(&self, codes: &[u8]) -> f32 {
        1.0 - self.code_sum(codes)
    }
}

/// AVX2 gather implementation of the table sum: 8 segment lookups per
/// iteration through `vpgatherdps`.
///
/// # Safety
/// Requires AVX2; every code must be below `center_num`.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn code_sum_gather_avx2(table: &[f32], codes: &[u8], center_num: usize) -> f32 {
    let n = codes.len();
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= n {
        let idx0 = (i * center_num + *codes.get_unchecked(i) as usize) as i32;
        let idx1 = ((i + 1) * center_num + *codes.get_unchecked(i + 1) as usize) as i32;
        let idx2 = ((i + 2) * center_num + *codes.get_unchecked(i + 2) as usize) as i32;
        let idx3 = ((i + 3) * center_num + *codes.get_unchecked(i + 3) as usize) as i32;
        let idx4 = ((i + 4) * center_num + *codes.get_unchecked(i + 4) as usize) as i32;
        let idx5 = ((i + 5) * center_num + *codes.get_unchecked(i + 5) as usize) as i32;
        let idx6 = ((i + 6) * center_num + *codes.get_unchecked(i + 6) as usize) as i32;
        let idx7 = ((i + 7) * center_num + *codes.get_unchecked(i + 7) as usize) as i32;

        let indices = _mm256_set_epi32(idx7, idx6, idx5, idx4, idx3, idx2, idx1, idx0);
        // Scale 4: gathering f32 entries.
        let values = _mm256_i32gather_ps::<4>(table.as_ptr(), indices);
        sum = _mm256_add_ps(sum, values);

        i += 8;
    }

    let lanes: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = lanes.iter().sum();

    while i < n {
        total += *table.get_unchecked(i * center_num + *codes.get_unchecked(i) as usize);
        i += 1;
    }

    total
}

// =============================================================================
// Packed 16-centroid fast path
// =============================================================================
// With 16 centroids per segment, one segment's whole table fits a 128-bit
// register after byte quantization, and a parallel byte shuffle scores 16
// base vectors per lookup instead of 16 sequential table reads. Ranking
// happens in a truncated u16 range; the exact rerank stage restores full
// precision afterwards.

/// Query table quantized to bytes, one 16-entry table per segment.
#[derive(Clone, Debug)]
pub struct PackedQueryTable {
    tables: Vec<[u8; 16]>,
}

impl PackedQueryTable {
    /// Quantizes a float table into byte tables. Returns `None` unless the
    /// table has exactly [`PACKED_CENTERS`] centroids per segment.
    pub fn build(table: &QueryTable) -> Option<Self> {
        if table.center_num() != PACKED_CENTERS {
            return None;
        }

        // Dynamic range over the whole table, widened by a 5% margin so
        // boundary entries do not saturate.
        let mut qmin = f32::INFINITY;
        let mut qmax = f32::NEG_INFINITY;
        for &v in &table.values {
            qmin = qmin.min(v);
            qmax = qmax.max(v);
        }
        let margin = (qmax - qmin) * 0.05;
        qmin -= margin;
        qmax += margin;
        let scale = if qmax > qmin {
            255.0 / (qmax - qmin)
        } else {
            0.0
        };

        let tables = (0..table.m())
            .map(|j| {
                let mut packed = [0u8; 16];
                for c in 0..PACKED_CENTERS {
                    let normalized = (table.value(j, c) - qmin) * scale;
                    packed[c] = normalized.clamp(0.0, 255.0) as u8;
                }
                packed
            })
            .collect();

        Some(Self { tables })
    }

    /// Number of segments.
    #[inline]
    pub fn m(&self) -> usize {
        self.tables.len()
    }

    /// Scores a batch of up to 16 coded vectors. `codes` holds `count`
    /// consecutive rows of `m` bytes; `out[v]` receives the summed byte
    /// similarity of row `v`. Entries past `count` are left untouched.
    ///
    /// The SIMD and scalar paths produce identical sums.
    pub fn score_batch(&self, codes: &[u8], count: usize, out: &mut [u16; 16]) {
        debug_assert!(count <= 16);
        debug_assert!(codes.len() >= count * self.m());

        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") {
                // SAFETY: AVX2 availability was just verified.
                unsafe { self.score_batch_x86(codes, count, out) };
                return;
            }
        }

        #[cfg(target_arch = "aarch64")]
        {
            self.score_batch_neon(codes, count, out);
            return;
        }

        #[allow(unreachable_code)]
        self.score_batch_scalar(codes, count, out);
    }

    /// Scalar reference for [`Self::score_batch`].
    pub fn score_batch_scalar(&self, codes: &[u8], count: usize, out: &mut [u16; 16]) {
        let m = self.m();
        for v in 0..count {
            let mut sum = 0u16;
            for (j, table) in self.tables.iter().enumerate() {
                let idx = (codes[v * m + j] & 0x0F) as usize;
                sum += table[idx] as u16;
            }
            out[v] = sum;
        }
    }

    /// Transposes one batch's codes into per-segment index arrays, padding
    /// rows past `count` with index 0 (their scores are discarded).
    #[inline]
    fn gather_indices(&self, codes: &[u8], count: usize, j: usize) -> [u8; 16] {
        let m = self.m();
        let mut idx = [0u8; 16];
        for (v, slot) in idx.iter_mut().enumerate().take(count) {
            *slot = codes[v * m + j] & 0x0F;
        }
        idx
    }

    #[cfg(target_arch = "x86_64")]
    #[target_feature(enable = "avx2")]
    unsafe fn score_batch_x86(&self, codes: &[u8], count: usize, out: &mut [u16; 16]) {
        let mut acc = _mm256_setzero_si256();

        for (j, table) in self.tables.iter().enumerate() {
            let idx = self.gather_indices(codes, count, j);
            let idx_vec = _mm_loadu_si128(idx.as_ptr() as *const __m128i);
            let table_vec = _mm_loadu_si128(table.as_ptr() as *const __m128i);
            // Parallel 16-way byte table lookup.
            let vals = _mm_shuffle_epi8(table_vec, idx_vec);
            acc = _mm256_add_epi16(acc, _mm256_cvtepu8_epi16(vals));
        }

        let lanes: [u16; 16] = std::mem::transmute(acc);
        out[..count].copy_from_slice(&lanes[..count]);
    }

    #[cfg(target_arch = "aarch64")]
    #[inline]
    fn score_batch_neon(&self, codes: &[u8], count: usize, out: &mut [u16; 16]) {
        unsafe {
            let mut acc_low = vdupq_n_u16(0);
            let mut acc_high = vdupq_n_u16(0);

            for (j, table) in self.tables.iter().enumerate() {
                let idx = self.gather_indices(codes, count, j);
                let idx_vec = vld1q_u8(idx.as_ptr());
                let table_vec = vld1q_u8(table.as_ptr());
                // Parallel 16-way byte table lookup.
                let vals = vqtbl1q_u8(table_vec, idx_vec);
                acc_low = vaddw_u8(acc_low, vget_low_u8(vals));
                acc_high = vaddw_u8(acc_high, vget_high_u8(vals));
            }

            let mut lanes = [0u16; 16];
            vst1q_u16(lanes.as_mut_ptr(), acc_low);
            vst1q_u16(lanes.as_mut_ptr().add(8), acc_high);
            out[..count].copy_from_slice(&lanes[..count]);
        }
    }
}

/// Converts a packed byte-similarity sum into a comparable distance.
/// Larger similarity means smaller distance; the range is the truncated
/// u16 range of the packed accumulator.
#[inline]
pub fn packed_distance(sum: u16) -> f32 {
    (u16::MAX - sum) as f32
}
