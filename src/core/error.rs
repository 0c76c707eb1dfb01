// This module defines the error type shared by every buffer type in the crate, using the
// thiserror crate for idiomatic error handling. TypeError covers construction failures
// (a sub-buffer of the wrong kind, conflicting sparse attributes, inconsistent sparsity
// map or storage element table geometry) and transform failures (tiles out of bounds,
// unsupported strided views, seSize changes, distributions that cannot be derived).
// Each variant carries enough context to diagnose the offending value. TypeResult<T> is
// the convenience alias used by every fallible operation. None of these errors are
// recoverable at this layer: callers are expected to propagate them.

//! Error types for buffer type construction and transforms.

use std::fmt;

use thiserror::Error;

/// Role of a sub-buffer inside a sparse composite, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Data,
    SparsityMap,
    StorageElementTable,
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferRole::Data => f.write_str("Data"),
            BufferRole::SparsityMap => f.write_str("Sparsity map"),
            BufferRole::StorageElementTable => f.write_str("Storage element table"),
        }
    }
}

/// Main error type for buffer type operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("{role} type is not a memref or distributed buffer. Got {found}")]
    InvalidBufferKind { role: BufferRole, found: String },

    #[error("SEAttr and (isWeights or SparsityCompression) cannot be present at the same time")]
    SeAttrConflict,

    #[error("{role} of type {found} does not match the buffer kind of data (data distributed: {data_distributed})")]
    DistributionKindMismatch {
        role: BufferRole,
        found: String,
        data_distributed: bool,
    },

    #[error("Storage element table does not keep the same seSize after {op}: expected {expected}, got {found} (table channels {table_channels})")]
    SeSizeMismatch {
        op: &'static str,
        expected: i64,
        found: i64,
        table_channels: i64,
    },

    #[error("Extracting view tile with non dense strides is not supported if SEAttr is set")]
    StridedViewWithSeAttr,

    #[error("If SEAttr is set then only compact strides are supported, got {strides}")]
    NonCompactStridesWithSeAttr { strides: String },

    #[error("Invalid sparsity map: {reason}")]
    InvalidSparsityMap { reason: String },

    #[error("Invalid storage element table: {reason}")]
    InvalidStorageElementTable { reason: String },

    #[error("Invalid sparsity compression: {reason}")]
    InvalidCompression { reason: String },

    #[error("Rank mismatch in {op}: expected {expected}, got {found}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Tile with offsets {offsets} and shape {shape} is out of bounds of {bounds}")]
    TileOutOfBounds {
        offsets: String,
        shape: String,
        bounds: String,
    },

    #[error("Invalid shape: {reason}")]
    InvalidShape { reason: String },

    #[error("Invalid strides: {reason}")]
    InvalidStrides { reason: String },

    #[error("Invalid storage element attribute: {reason}")]
    InvalidSeAttr { reason: String },

    #[error("Distribution error: {reason}")]
    Distribution { reason: String },

    #[error("Calling {op} on a type that does not have distributed {role}")]
    NotDistributed { op: &'static str, role: BufferRole },
}

/// Result type alias for buffer type operations.
pub type TypeResult<T> = Result<T, TypeError>;
