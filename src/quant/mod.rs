//! Quantization codecs: affine scalar quantization (float to byte) and
//! product quantization (vector to per-segment codebook indices).

pub mod pq;
pub mod sq;

pub use pq::{PackedQueryTable, PqCodebook, QueryTable, PACKED_CENTERS};
pub use sq::SqParams;
