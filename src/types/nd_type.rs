//! The capability interface shared by every tensor-like buffer type.
//!
//! Higher layers (tiling, clustering, memory layout) treat simple, distributed
//! and sparse buffers uniformly through [`NdType`]. Transforms never mutate:
//! each returns a new value or fails with a [`TypeError`](crate::core::TypeError).

use crate::core::{
    Bit, Byte, DimsOrder, ElemType, MemShape, MemSpace, MemStrides, Shape, Strides, TypeResult,
};
use crate::types::distribution::DistributionInfo;

/// Batched change of several type components at once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeComponents {
    pub shape: Option<Shape>,
    pub elem_type: Option<ElemType>,
    pub dims_order: Option<DimsOrder>,
    pub mem_space: Option<MemSpace>,
    pub strides: Option<Strides>,
}

impl TypeComponents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_elem_type(mut self, elem_type: ElemType) -> Self {
        self.elem_type = Some(elem_type);
        self
    }

    pub fn with_dims_order(mut self, dims_order: DimsOrder) -> Self {
        self.dims_order = Some(dims_order);
        self
    }

    pub fn with_mem_space(mut self, mem_space: MemSpace) -> Self {
        self.mem_space = Some(mem_space);
        self
    }

    pub fn with_strides(mut self, strides: Strides) -> Self {
        self.strides = Some(strides);
        self
    }
}

/// Query and transform contract of a tensor-like type.
pub trait NdType: Sized {
    fn shape(&self) -> Shape;

    fn element_type(&self) -> ElemType;

    fn dims_order(&self) -> DimsOrder;

    fn mem_space(&self) -> MemSpace;

    fn strides(&self) -> Strides;

    fn total_alloc_size(&self) -> Byte;

    fn compact_alloc_size(&self) -> Byte;

    fn mem_shape(&self) -> MemShape {
        self.dims_order().to_memory_order(&self.shape())
    }

    fn rank(&self) -> usize {
        self.shape().rank()
    }

    fn num_elements(&self) -> i64 {
        self.shape().total_size()
    }

    fn elem_type_size(&self) -> Bit {
        self.element_type().size()
    }

    fn mem_strides(&self) -> MemStrides {
        self.strides().to_memory_order(self.dims_order())
    }

    fn change_shape(&self, shape: &Shape) -> TypeResult<Self> {
        self.change_shape_elem_type(shape, self.element_type())
    }

    fn change_elem_type(&self, elem_type: ElemType) -> TypeResult<Self>;

    fn change_shape_elem_type(&self, shape: &Shape, elem_type: ElemType) -> TypeResult<Self>;

    fn change_dims_order(&self, order: DimsOrder) -> TypeResult<Self>;

    fn change_mem_space(&self, mem_space: MemSpace) -> TypeResult<Self>;

    fn change_strides(&self, strides: &Strides) -> TypeResult<Self>;

    fn change_type_components(&self, components: &TypeComponents) -> TypeResult<Self>;

    /// Copy-semantics sub-region with compact layout.
    fn extract_dense_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self>;

    /// Strided view into the parent; `elem_strides` may be empty for unit strides.
    fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<Self>;

    /// Drop layout information that only exists because the value is a tile.
    fn erase_tiled_info(&self) -> TypeResult<Self>;

    fn pad(&self, pad_before: &Shape, pad_after: &Shape) -> TypeResult<Self>;
}

/// Transforms that install an explicitly supplied cluster distribution.
pub trait ClusterType: NdType {
    fn change_shape_for_explicit_distribution(
        &self,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        let elem_type = self.element_type();
        self.change_shape_elem_type_for_explicit_distribution(shape, elem_type, distribution)
    }

    fn change_shape_elem_type_for_explicit_distribution(
        &self,
        shape: &Shape,
        elem_type: ElemType,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self>;

    fn change_type_components_for_explicit_distribution(
        &self,
        components: &TypeComponents,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self>;

    fn extract_dense_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self>;

    fn extract_view_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
        distribution: &DistributionInfo,
    ) -> TypeResult<Self>;
}
