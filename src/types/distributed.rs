//! Buffer spread over several compute clusters.
//!
//! A [`DistributedBufferType`] pairs the global buffer with a
//! [`DistributionInfo`]. Shape-changing transforms re-derive the per-cluster
//! windows from the distribution mode; the `*_for_explicit_distribution`
//! transforms install the caller's windows instead.

use crate::core::{Byte, DimsOrder, ElemType, MemSpace, Shape, Strides, TypeResult};
use crate::types::distribution::DistributionInfo;
use crate::types::memref::MemRefType;
use crate::types::nd_type::{ClusterType, NdType, TypeComponents};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributedBufferType {
    buffer: MemRefType,
    distribution: DistributionInfo,
}

impl DistributedBufferType {
    pub fn new(buffer: MemRefType, distribution: DistributionInfo) -> TypeResult<Self> {
        distribution.check_fits(&buffer.shape())?;
        Ok(Self { buffer, distribution })
    }

    /// Global (undistributed) view of the buffer.
    pub fn global(&self) -> &MemRefType {
        &self.buffer
    }

    pub fn distribution(&self) -> &DistributionInfo {
        &self.distribution
    }

    fn rebuild(&self, buffer: MemRefType) -> TypeResult<Self> {
        let distribution = if buffer.shape() == self.buffer.shape() {
            self.distribution.clone()
        } else {
            self.distribution.adapt_to_shape(&buffer.shape())?
        };
        Self::new(buffer, distribution)
    }

    fn per_cluster_size(&self, shape: &Shape) -> Byte {
        (self.buffer.elem_type_size() * shape.total_size()).to_bytes()
    }
}

impl NdType for DistributedBufferType {
    fn shape(&self) -> Shape {
        self.buffer.shape()
    }

    fn element_type(&self) -> ElemType {
        self.buffer.element_type()
    }

    fn dims_order(&self) -> DimsOrder {
        self.buffer.dims_order()
    }

    fn mem_space(&self) -> MemSpace {
        self.buffer.mem_space()
    }

    fn strides(&self) -> Strides {
        self.buffer.strides()
    }

    /// Size of the largest per-cluster slice.
    fn total_alloc_size(&self) -> Byte {
        self.distribution
            .largest_memory_shape()
            .map_or(Byte(0), |shape| self.per_cluster_size(shape))
    }

    fn compact_alloc_size(&self) -> Byte {
        self.total_alloc_size()
    }

    fn change_elem_type(&self, elem_type: ElemType) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_elem_type(elem_type)?)
    }

    fn change_shape_elem_type(&self, shape: &Shape, elem_type: ElemType) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_shape_elem_type(shape, elem_type)?)
    }

    fn change_dims_order(&self, order: DimsOrder) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_dims_order(order)?)
    }

    fn change_mem_space(&self, mem_space: MemSpace) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_mem_space(mem_space)?)
    }

    fn change_strides(&self, strides: &Strides) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_strides(strides)?)
    }

    fn change_type_components(&self, components: &TypeComponents) -> TypeResult<Self> {
        self.rebuild(self.buffer.change_type_components(components)?)
    }

    fn extract_dense_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self> {
        self.rebuild(self.buffer.extract_dense_tile(offsets, shape)?)
    }

    fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<Self> {
        self.rebuild(self.buffer.extract_view_tile(offsets, shape, elem_strides)?)
    }

    fn erase_tiled_info(&self) -> TypeResult<Self> {
        self.rebuild(self.buffer.erase_tiled_info()?)
    }

    fn pad(&self, pad_before: &Shape, pad_after: &Shape) -> TypeResult<Self> {
        self.rebuild(self.buffer.pad(pad_before, pad_after)?)
    }
}

impl ClusterType for DistributedBufferType {
    fn change_shape_elem_type_for_explicit_distribution(
        &self,
        shape: &Shape,
        elem_type: ElemType,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        Self::new(self.buffer.change_shape_elem_type(shape, elem_type)?, distribution.clone())
    }

    fn change_type_components_for_explicit_distribution(
        &self,
        components: &TypeComponents,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        Self::new(self.buffer.change_type_components(components)?, distribution.clone())
    }

    fn extract_dense_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        Self::new(self.buffer.extract_dense_tile(offsets, shape)?, distribution.clone())
    }

    fn extract_view_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        let buffer = self.buffer.extract_view_tile(offsets, shape, elem_strides)?;
        Self::new(buffer, distribution.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TypeError;
    use crate::types::distribution::{DistributionMode, DistributionParts};

    fn segmented_activation() -> DistributedBufferType {
        let shape = Shape::from([1, 16, 8, 8]);
        let buffer =
            MemRefType::new(shape.clone(), ElemType::F16, DimsOrder::NHWC, MemSpace::CMX_NN)
                .unwrap();
        let distribution =
            DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, &shape).unwrap();
        DistributedBufferType::new(buffer, distribution).unwrap()
    }

    #[test]
    fn test_alloc_size_is_largest_cluster() {
        let buffer = segmented_activation();
        assert_eq!(buffer.total_alloc_size(), Byte(16 * 4 * 8 * 2));

        let tile = buffer
            .extract_dense_tile(&Shape::from([0, 0, 0, 0]), &Shape::from([1, 16, 5, 8]))
            .unwrap();
        let heights: Vec<i64> = tile
            .distribution()
            .memory_shapes()
            .iter()
            .map(|s| s.raw()[2])
            .collect();
        assert_eq!(heights, vec![3, 2]);
        assert_eq!(tile.total_alloc_size(), Byte(16 * 3 * 8 * 2));
    }

    #[test]
    fn test_explicit_distribution_is_installed() {
        let buffer = segmented_activation();
        let tile_shape = Shape::from([1, 16, 4, 8]);
        let explicit = DistributionInfo::explicit(DistributionParts {
            mode: DistributionMode::Overlapped,
            num_tiles: Some(vec![1, 1, 2, 1]),
            num_clusters: 2,
            alignment: None,
            uniform_distributed_segments: false,
            memory_shapes: vec![Shape::from([1, 16, 3, 8]), Shape::from([1, 16, 3, 8])],
            memory_offsets: vec![Shape::from([0, 0, 0, 0]), Shape::from([0, 0, 1, 0])],
        })
        .unwrap();
        let tile = buffer
            .extract_dense_tile_for_explicit_distribution(
                &Shape::from([0, 0, 4, 0]),
                &tile_shape,
                &explicit,
            )
            .unwrap();
        assert_eq!(tile.distribution(), &explicit);

        // Overlapped windows cannot be re-derived for another shape.
        let reshaped = tile.change_shape(&Shape::from([1, 16, 2, 16]));
        assert!(matches!(reshaped, Err(TypeError::Distribution { .. })));
    }

    #[test]
    fn test_window_outside_shape_is_rejected() {
        let buffer = MemRefType::contiguous(Shape::from([1, 16, 4, 4]), ElemType::F16).unwrap();
        let larger = Shape::from([1, 16, 8, 4]);
        let distribution =
            DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, &larger).unwrap();
        let result = DistributedBufferType::new(buffer, distribution);
        assert!(matches!(result, Err(TypeError::Distribution { .. })));
    }
}
