//! Sparse Buffer - Distributed sparse buffer type algebra.
//!
//! Models on-chip NPU buffers as immutable values: plain memrefs, buffers split
//! across compute clusters, and sparse composites that bundle stored data with
//! a sparsity map and a storage element table. Every structural transform is
//! applied to all sub-buffers so the composite stays internally consistent.
//!
//! # Primary Usage
//!
//! ```ignore
//! use sparse_buffer::core::{DimsOrder, ElemType, MemSpace, Shape};
//! use sparse_buffer::types::{MemRefType, NdType};
//! use sparse_buffer::sparse::SparseBufferType;
//!
//! let shape = Shape::from([1, 16, 8, 8]);
//! let data = MemRefType::new(shape, ElemType::F16, DimsOrder::NHWC, MemSpace::CMX_NN)?;
//! let map = data.change_elem_type(ElemType::I1)?;
//! let sparse = SparseBufferType::builder(data).sparsity_map(map).build()?;
//! let tile = sparse.extract_dense_tile(&Shape::from([0, 0, 2, 2]), &Shape::from([1, 16, 4, 4]))?;
//! println!("{tile}");
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Shapes, orders, strides, element types, errors and interning
//! - [`types`] - Memref and distributed buffers behind the `NdType` interface
//! - [`sparse`] - The sparse composite, storage element mappings and compression
//! - [`asm`] - Canonical text form and parser

pub mod asm;
pub mod core;
pub mod sparse;
pub mod types;

pub use asm::{parse_buffer_type, parse_sparse_buffer, try_parse_sparse_buffer, ParseError};
pub use self::core::{BufferRole, Shape, TypeError, TypeResult, TypeUniquer};
pub use sparse::{
    DefaultDistributionPolicy, DistributionPolicy, SeAttr, SparseBufferBuilder, SparseBufferType,
    SparsityCompression,
};
pub use types::{
    BufferType, ClusterType, DistributedBufferType, DistributionInfo, MemRefType, NdType,
};
