// This module groups the buffer types that can appear as components of a sparse buffer and
// the capability interface they share. MemRefType describes a tensor in one memory region,
// DistributedBufferType adds a per-cluster distribution descriptor, and BufferType closes
// the set so that callers dispatch by exhaustive matching instead of down-casting. NdType
// holds the query and transform contract; ClusterType adds the transforms that install an
// explicitly supplied distribution.

//! Buffer types and the NdType capability interface.
//!
//! # Key Components
//!
//! - [`nd_type`] - `NdType`, `ClusterType` and `TypeComponents`
//! - [`memref`] - simple buffers
//! - [`distribution`] - cluster distribution descriptors
//! - [`distributed`] - buffers spread over clusters
//! - [`buffer`] - the closed `BufferType` variant

pub mod buffer;
pub mod distributed;
pub mod distribution;
pub mod memref;
pub mod nd_type;

pub use buffer::BufferType;
pub use distributed::DistributedBufferType;
pub use distribution::{DistributionInfo, DistributionMode, DistributionParts};
pub use memref::MemRefType;
pub use nd_type::{ClusterType, NdType, TypeComponents};
