//! Sparse buffer composite and its building blocks.
//!
//! # Key Components
//!
//! - [`sparse_buffer`] - `SparseBufferType`, its builder and explicit-distribution view
//! - [`se_attr`] - storage element shape-expansion mappings
//! - [`compression`] - per-channel sparsity compression descriptor
//! - [`weights`] - sparsity map geometry for weights
//! - [`policy`] - per-component distribution derivation

pub mod compression;
pub mod policy;
pub mod se_attr;
pub mod sparse_buffer;
pub mod weights;

pub use compression::{SparsityCompression, DEFAULT_COMPRESSION_ALIGNMENT};
pub use policy::{DefaultDistributionPolicy, DistributionPolicy};
pub use se_attr::{PadMode, SeAttr, SeTile};
pub use sparse_buffer::{ExplicitDistribution, SparseBufferBuilder, SparseBufferType};
pub use weights::{infer_weights_sparsity_map_shape, WEIGHTS_MAP_ROW_ALIGNMENT_BITS};
