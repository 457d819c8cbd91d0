//! Flat vector storage.
//!
//! Vectors live in a single contiguous `n * d` buffer and are addressed by
//! row index. The store is immutable once built; all pipeline stages hold
//! shared references into it.

use crate::error::{QuiverError, Result};
use rand::Rng;

/// Immutable flat arena of `n` vectors of dimension `d`.
#[derive(Clone, Debug)]
pub struct VectorStore {
    data: Vec<f32>,
    dim: usize,
}

impl VectorStore {
    /// Wraps a flat `n * d` buffer. `n` is derived from the buffer length.
    pub fn new(data: Vec<f32>, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(QuiverError::invalid_parameter("dimension must be nonzero"));
        }
        if data.len() % dim != 0 {
            return Err(QuiverError::invalid_parameter(format!(
                "buffer length {} is not a multiple of dimension {}",
                data.len(),
                dim
            )));
        }
        Ok(Self { data, dim })
    }

    /// Number of vectors.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    /// True if the store holds no vectors.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector dimension.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Row `i` as a slice. Hot path; bounds checked in debug builds only.
    #[inline(always)]
    pub fn row(&self, i: usize) -> &[f32] {
        debug_assert!(i < self.len(), "row {} out of bounds (n={})", i, self.len());
        let start = i * self.dim;
        // SAFETY: data.len() == n * dim is a construction invariant and
        // i < n is checked by the debug_assert above.
        unsafe { self.data.get_unchecked(start..start + self.dim) }
    }

    /// The whole underlying buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Builds a new store with rows permuted so that row `i` of the result
    /// is row `new_to_old[i]` of `self`. Used to materialize the
    /// cluster-contiguous arena at load time.
    pub fn permuted(&self, new_to_old: &[u32]) -> Self {
        let mut data = Vec::with_capacity(new_to_old.len() * self.dim);
        for &old in new_to_old {
            data.extend_from_slice(self.row(old as usize));
        }
        Self {
            data,
            dim: self.dim,
        }
    }

    /// Random store with values uniform in [-1, 1]; test and bench helper.
    pub fn random(n: usize, dim: usize) -> Self {
        let mut rng = rand::thread_rng();
        let data: Vec<f32> = (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self { data, dim }
    }

    /// Random store of unit-norm vectors; test and bench helper for the
    /// inner-product metric, which assumes pre-normalized inputs.
    pub fn random_unit(n: usize, dim: usize) -> Self {
        let mut store = Self::random(n, dim);
        for i in 0..n {
            let start = i * dim;
            let row = &mut store.data[start..start + dim];
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in row.iter_mut() {
                    *x /= norm;
                }
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_access() {
        let store = VectorStore::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.dim(), 3);
        assert_eq!(store.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(store.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_rejects_ragged_buffer() {
        assert!(VectorStore::new(vec![1.0; 7], 3).is_err());
        assert!(VectorStore::new(vec![1.0; 6], 0).is_err());
    }

    #[test]
    fn test_permuted() {
        let store = VectorStore::new(vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0], 2).unwrap();
        let permuted = store.permuted(&[2, 0, 1]);
        assert_eq!(permuted.row(0), &[2.0, 2.0]);
        assert_eq!(permuted.row(1), &[0.0, 0.0]);
        assert_eq!(permuted.row(2), &[1.0, 1.0]);
    }

    #[test]
    fn test_random_unit_is_normalized() {
        let store = VectorStore::random_unit(10, 16);
        for i in 0..10 {
            let norm: f32 = store.row(i).iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "row {} norm {}", i, norm);
        }
    }
}
