//! quiver: approximate nearest-neighbor top-k search over dense f32 vectors
//! under the inner-product metric (`distance = 1 - inner_product`).
//!
//! Index structures (centroids, cluster layout, codebooks, quantization
//! range) are built offline and loaded read-only; a [`Searcher`] answers
//! queries over them through a coarse-to-fine pipeline with pluggable
//! parallel backends.
//!
//! ```no_run
//! use quiver::{SearchConfig, SearcherBuilder, VectorStore};
//!
//! # fn main() -> quiver::Result<()> {
//! let base = VectorStore::random_unit(10_000, 128);
//! let searcher = SearcherBuilder::new(base).build()?;
//! let query = vec![0.0f32; 128];
//! let hits = searcher.search(&query, 10, &SearchConfig::flat())?;
//! # Ok(())
//! # }
//! ```

pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod ivf;
pub mod kernel;
pub mod pipeline;
pub mod quant;
pub mod vector;

pub use collector::{Candidate, TopK, NO_CANDIDATE};
pub use config::{BackendKind, SearchConfig, SearchMode};
pub use error::{QuiverError, Result};
pub use ivf::{ClusterLayout, CoarseIndex};
pub use pipeline::{SearchResult, Searcher, SearcherBuilder};
pub use quant::{PqCodebook, SqParams};
pub use vector::VectorStore;
