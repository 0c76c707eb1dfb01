//! Closed set of buffer kinds usable as sparse buffer components.

use crate::core::{
    BufferRole, Byte, DimsOrder, ElemType, MemSpace, Shape, Strides, TypeError, TypeResult,
};
use crate::types::distributed::DistributedBufferType;
use crate::types::distribution::DistributionInfo;
use crate::types::memref::MemRefType;
use crate::types::nd_type::{ClusterType, NdType, TypeComponents};

/// A simple or a distributed buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferType {
    MemRef(MemRefType),
    Distributed(DistributedBufferType),
}

impl BufferType {
    pub fn is_distributed(&self) -> bool {
        matches!(self, BufferType::Distributed(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            BufferType::MemRef(_) => "memref",
            BufferType::Distributed(_) => "distributed",
        }
    }

    pub fn as_distributed(&self) -> Option<&DistributedBufferType> {
        match self {
            BufferType::Distributed(distributed) => Some(distributed),
            BufferType::MemRef(_) => None,
        }
    }

    pub fn distribution(&self) -> Option<&DistributionInfo> {
        self.as_distributed().map(DistributedBufferType::distribution)
    }

    /// The distributed buffer, or `NotDistributed` naming `op` and `role`.
    pub(crate) fn require_distributed(
        &self,
        op: &'static str,
        role: BufferRole,
    ) -> TypeResult<&DistributedBufferType> {
        self.as_distributed().ok_or(TypeError::NotDistributed { op, role })
    }
}

impl From<MemRefType> for BufferType {
    fn from(buffer: MemRefType) -> Self {
        BufferType::MemRef(buffer)
    }
}

impl From<DistributedBufferType> for BufferType {
    fn from(buffer: DistributedBufferType) -> Self {
        BufferType::Distributed(buffer)
    }
}

macro_rules! dispatch {
    ($self:expr, $buffer:ident => $body:expr) => {
        match $self {
            BufferType::MemRef($buffer) => $body,
            BufferType::Distributed($buffer) => $body,
        }
    };
}

macro_rules! dispatch_map {
    ($self:expr, $buffer:ident => $body:expr) => {
        match $self {
            BufferType::MemRef($buffer) => $body.map(BufferType::MemRef),
            BufferType::Distributed($buffer) => $body.map(BufferType::Distributed),
        }
    };
}

impl NdType for BufferType {
    fn shape(&self) -> Shape {
        dispatch!(self, b => b.shape())
    }

    fn element_type(&self) -> ElemType {
        dispatch!(self, b => b.element_type())
    }

    fn dims_order(&self) -> DimsOrder {
        dispatch!(self, b => b.dims_order())
    }

    fn mem_space(&self) -> MemSpace {
        dispatch!(self, b => b.mem_space())
    }

    fn strides(&self) -> Strides {
        dispatch!(self, b => b.strides())
    }

    fn total_alloc_size(&self) -> Byte {
        dispatch!(self, b => b.total_alloc_size())
    }

    fn compact_alloc_size(&self) -> Byte {
        dispatch!(self, b => b.compact_alloc_size())
    }

    fn change_elem_type(&self, elem_type: ElemType) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_elem_type(elem_type))
    }

    fn change_shape_elem_type(&self, shape: &Shape, elem_type: ElemType) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_shape_elem_type(shape, elem_type))
    }

    fn change_dims_order(&self, order: DimsOrder) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_dims_order(order))
    }

    fn change_mem_space(&self, mem_space: MemSpace) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_mem_space(mem_space))
    }

    fn change_strides(&self, strides: &Strides) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_strides(strides))
    }

    fn change_type_components(&self, components: &TypeComponents) -> TypeResult<Self> {
        dispatch_map!(self, b => b.change_type_components(components))
    }

    fn extract_dense_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self> {
        dispatch_map!(self, b => b.extract_dense_tile(offsets, shape))
    }

    fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<Self> {
        dispatch_map!(self, b => b.extract_view_tile(offsets, shape, elem_strides))
    }

    fn erase_tiled_info(&self) -> TypeResult<Self> {
        dispatch_map!(self, b => b.erase_tiled_info())
    }

    fn pad(&self, pad_before: &Shape, pad_after: &Shape) -> TypeResult<Self> {
        dispatch_map!(self, b => b.pad(pad_before, pad_after))
    }
}

impl ClusterType for BufferType {
    fn change_shape_elem_type_for_explicit_distribution(
        &self,
        shape: &Shape,
        elem_type: ElemType,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        const OP: &str = "change_shape_elem_type_for_explicit_distribution";
        self.require_distributed(OP, BufferRole::Data)?
            .change_shape_elem_type_for_explicit_distribution(shape, elem_type, distribution)
            .map(BufferType::Distributed)
    }

    fn change_type_components_for_explicit_distribution(
        &self,
        components: &TypeComponents,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        const OP: &str = "change_type_components_for_explicit_distribution";
        self.require_distributed(OP, BufferRole::Data)?
            .change_type_components_for_explicit_distribution(components, distribution)
            .map(BufferType::Distributed)
    }

    fn extract_dense_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        const OP: &str = "extract_dense_tile_for_explicit_distribution";
        self.require_distributed(OP, BufferRole::Data)?
            .extract_dense_tile_for_explicit_distribution(offsets, shape, distribution)
            .map(BufferType::Distributed)
    }

    fn extract_view_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        const OP: &str = "extract_view_tile_for_explicit_distribution";
        self.require_distributed(OP, BufferRole::Data)?
            .extract_view_tile_for_explicit_distribution(offsets, shape, elem_strides, distribution)
            .map(BufferType::Distributed)
    }
}
