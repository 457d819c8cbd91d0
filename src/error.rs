//! Error types for quiver operations.
//!
//! Every failure is local to a single query: searches sharing the same
//! read-only index structures are unaffected by another query's error.

use thiserror::Error;

/// Result type alias using [`QuiverError`].
pub type Result<T> = std::result::Result<T, QuiverError>;

/// Errors that can occur while building or querying an index.
#[derive(Error, Debug)]
pub enum QuiverError {
    /// Query dimension does not match the base collection dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },

    /// Vector dimension is not a multiple of the kernel lane width.
    ///
    /// Checked once at build time; the vectorized kernels assume it holds.
    #[error("dimension {dim} is not a multiple of the {lanes}-wide kernel lane")]
    DimensionNotLaneAligned {
        /// Offending dimension.
        dim: usize,
        /// Required lane width (8 for f32, 16 for byte codes).
        lanes: usize,
    },

    /// `nprobe` exceeds the number of coarse clusters.
    #[error("insufficient clusters: nprobe {requested} exceeds {available} clusters")]
    InsufficientClusters {
        /// Requested probe count.
        requested: usize,
        /// Clusters available in the coarse index.
        available: usize,
    },

    /// Cluster layout failed load-time validation.
    #[error("corrupt cluster layout: {0}")]
    CorruptLayout(String),

    /// Invalid configuration or build parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error serializing or deserializing a worker result batch.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A parallel worker terminated without delivering its result batch.
    #[error("worker {0} failed to deliver its result batch")]
    WorkerLost(usize),
}

impl QuiverError {
    /// Creates a new `DimensionMismatch` error.
    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    /// Creates a new `DimensionNotLaneAligned` error.
    pub fn not_lane_aligned(dim: usize, lanes: usize) -> Self {
        Self::DimensionNotLaneAligned { dim, lanes }
    }

    /// Creates a new `InsufficientClusters` error.
    pub fn insufficient_clusters(requested: usize, available: usize) -> Self {
        Self::InsufficientClusters {
            requested,
            available,
        }
    }

    /// Creates a new `CorruptLayout` error.
    pub fn corrupt_layout(msg: impl Into<String>) -> Self {
        Self::CorruptLayout(msg.into())
    }

    /// Creates a new `InvalidParameter` error.
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

impl From<bincode::Error> for QuiverError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuiverError::dimension_mismatch(128, 96);
        assert_eq!(err.to_string(), "dimension mismatch: expected 128, got 96");

        let err = QuiverError::not_lane_aligned(12, 8);
        assert_eq!(
            err.to_string(),
            "dimension 12 is not a multiple of the 8-wide kernel lane"
        );

        let err = QuiverError::insufficient_clusters(32, 16);
        assert_eq!(
            err.to_string(),
            "insufficient clusters: nprobe 32 exceeds 16 clusters"
        );
    }

    #[test]
    fn test_corrupt_layout_message() {
        let err = QuiverError::corrupt_layout("offsets not monotonic");
        assert!(matches!(err, QuiverError::CorruptLayout(_)));
        assert_eq!(
            err.to_string(),
            "corrupt cluster layout: offsets not monotonic"
        );
    }
}
