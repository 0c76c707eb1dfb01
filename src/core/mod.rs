// This module serves as the hub for the value-level primitives every buffer type is built
// from: logical dimensions and named layout families, dimension orders, shapes in logical
// and memory order, bit/byte sizes and strides, scalar element types, memory spaces, the
// shared error type, and the structural type uniquer. These are pure value types with no
// coupling between each other beyond shape/order conversions, so they can be tested in
// isolation and shared by the simple, distributed and sparse buffer types above them.

//! Core primitives for buffer types.
//!
//! # Key Components
//!
//! - [`dims`] - `Dim`, named layout families and `DimsOrder`
//! - [`shape`] - `Shape` (logical order) and `MemShape` (memory order)
//! - [`strides`] - `Bit`/`Byte` sizes and compact stride computation
//! - [`elem_type`] - scalar element types
//! - [`mem_space`] - memory kinds and indexed memory spaces
//! - [`error`] - `TypeError` and `TypeResult`
//! - [`uniquer`] - get-or-create interning of type values

pub mod dims;
pub mod elem_type;
pub mod error;
pub mod mem_space;
pub mod shape;
pub mod strides;
pub mod uniquer;

pub use dims::{dims3d, dims4d, dims5d, Dim, DimsOrder};
pub use elem_type::{ElemType, ScalarKind};
pub use error::{BufferRole, TypeError, TypeResult};
pub use mem_space::{MemSpace, MemoryKind};
pub use shape::{MemShape, Shape};
pub use strides::{align_up, Bit, Byte, MemStrides, Strides};
pub use uniquer::{TypeUniquer, UniquerStats};
