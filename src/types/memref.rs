//! Simple (single memory region) buffer type.

use crate::core::{
    Bit, Byte, DimsOrder, ElemType, MemSpace, Shape, Strides, TypeError, TypeResult,
};
use crate::types::nd_type::{NdType, TypeComponents};

/// Buffer living in a single memory region.
///
/// Strides equal to the compact strides of the layout are never stored, so two
/// buffers describing the same layout always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemRefType {
    shape: Shape,
    elem_type: ElemType,
    dims_order: DimsOrder,
    mem_space: MemSpace,
    strides: Option<Strides>,
}

impl MemRefType {
    pub fn new(
        shape: Shape,
        elem_type: ElemType,
        dims_order: DimsOrder,
        mem_space: MemSpace,
    ) -> TypeResult<Self> {
        if dims_order.num_dims() != shape.rank() {
            return Err(TypeError::RankMismatch {
                op: "memref dims order",
                expected: shape.rank(),
                found: dims_order.num_dims(),
            });
        }
        if let Some(extent) = shape.iter().find(|d| **d < 0) {
            return Err(TypeError::InvalidShape {
                reason: format!("negative extent {extent} in {shape}"),
            });
        }
        Ok(Self {
            shape,
            elem_type,
            dims_order,
            mem_space,
            strides: None,
        })
    }

    /// Identity-ordered buffer in DDR.
    pub fn contiguous(shape: Shape, elem_type: ElemType) -> TypeResult<Self> {
        let order = DimsOrder::default_for_rank(shape.rank());
        Self::new(shape, elem_type, order, MemSpace::DDR)
    }

    pub fn with_strides(mut self, strides: Strides) -> TypeResult<Self> {
        self.strides = self.normalize_strides(strides)?;
        Ok(self)
    }

    /// Strides when they differ from the compact layout.
    pub fn explicit_strides(&self) -> Option<&Strides> {
        self.strides.as_ref()
    }

    pub fn is_compact(&self) -> bool {
        self.strides.is_none()
    }

    fn compact_strides(&self) -> Strides {
        Strides::compact(&self.shape, self.dims_order, self.elem_type.size())
    }

    fn normalize_strides(&self, strides: Strides) -> TypeResult<Option<Strides>> {
        if strides.len() != self.shape.rank() {
            return Err(TypeError::RankMismatch {
                op: "memref strides",
                expected: self.shape.rank(),
                found: strides.len(),
            });
        }
        let elem_bits = self.elem_type.size().count();
        let misaligned = |s: &&Bit| s.count() <= 0 || s.count() % elem_bits != 0;
        if let Some(bad) = strides.raw().iter().find(misaligned) {
            return Err(TypeError::InvalidStrides {
                reason: format!(
                    "stride of {} bits is not a positive multiple of the {elem_bits}-bit element",
                    bad.count()
                ),
            });
        }
        if strides == self.compact_strides() {
            Ok(None)
        } else {
            Ok(Some(strides))
        }
    }

    fn with_layout(&self, shape: Shape, elem_type: ElemType) -> TypeResult<Self> {
        let order = if shape.rank() == self.shape.rank() {
            self.dims_order
        } else {
            DimsOrder::default_for_rank(shape.rank())
        };
        Self::new(shape, elem_type, order, self.mem_space)
    }

    fn check_view_bounds(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<()> {
        if elem_strides.is_empty() {
            return self.shape.check_tile(offsets, shape);
        }
        if elem_strides.len() != self.shape.rank() {
            return Err(TypeError::RankMismatch {
                op: "view tile element strides",
                expected: self.shape.rank(),
                found: elem_strides.len(),
            });
        }
        self.shape.check_rank("view tile offsets", offsets.rank())?;
        self.shape.check_rank("view tile shape", shape.rank())?;
        let inside = (0..self.shape.rank()).all(|d| {
            let (bound, off, size) = (self.shape.raw()[d], offsets.raw()[d], shape.raw()[d]);
            let step = elem_strides[d];
            step > 0 && off >= 0 && size > 0 && off + (size - 1) * step < bound
        });
        if !inside {
            return Err(TypeError::TileOutOfBounds {
                offsets: offsets.to_string(),
                shape: shape.to_string(),
                bounds: self.shape.to_string(),
            });
        }
        Ok(())
    }
}

impl NdType for MemRefType {
    fn shape(&self) -> Shape {
        self.shape.clone()
    }

    fn element_type(&self) -> ElemType {
        self.elem_type
    }

    fn dims_order(&self) -> DimsOrder {
        self.dims_order
    }

    fn mem_space(&self) -> MemSpace {
        self.mem_space
    }

    fn strides(&self) -> Strides {
        self.strides.clone().unwrap_or_else(|| self.compact_strides())
    }

    fn total_alloc_size(&self) -> Byte {
        if self.shape.rank() == 0 {
            return self.elem_type.size().to_bytes();
        }
        let mem_shape = self.mem_shape();
        let mem_strides = self.mem_strides();
        let outer = mem_shape.raw()[0];
        (mem_strides.raw()[0] * outer).to_bytes()
    }

    fn compact_alloc_size(&self) -> Byte {
        (self.elem_type.size() * self.shape.total_size()).to_bytes()
    }

    fn change_elem_type(&self, elem_type: ElemType) -> TypeResult<Self> {
        let mut result = Self::new(self.shape.clone(), elem_type, self.dims_order, self.mem_space)?;
        if let Some(strides) = &self.strides {
            let old_bits = self.elem_type.size().count();
            let scaled = strides
                .raw()
                .iter()
                .map(|s| Bit(s.count() / old_bits * elem_type.size().count()))
                .collect();
            result = result.with_strides(Strides::new(scaled))?;
        }
        Ok(result)
    }

    fn change_shape_elem_type(&self, shape: &Shape, elem_type: ElemType) -> TypeResult<Self> {
        self.with_layout(shape.clone(), elem_type)
    }

    fn change_dims_order(&self, order: DimsOrder) -> TypeResult<Self> {
        Self::new(self.shape.clone(), self.elem_type, order, self.mem_space)
    }

    fn change_mem_space(&self, mem_space: MemSpace) -> TypeResult<Self> {
        let mut result = self.clone();
        result.mem_space = mem_space;
        Ok(result)
    }

    fn change_strides(&self, strides: &Strides) -> TypeResult<Self> {
        self.clone().with_strides(strides.clone())
    }

    fn change_type_components(&self, components: &TypeComponents) -> TypeResult<Self> {
        let shape = components.shape.clone().unwrap_or_else(|| self.shape.clone());
        let elem_type = components.elem_type.unwrap_or(self.elem_type);
        let mut result = if components.shape.is_some() || components.elem_type.is_some() {
            self.with_layout(shape, elem_type)?
        } else {
            self.clone()
        };
        if let Some(order) = components.dims_order {
            result = result.change_dims_order(order)?;
        }
        if let Some(mem_space) = components.mem_space {
            result.mem_space = mem_space;
        }
        if let Some(strides) = &components.strides {
            result = result.with_strides(strides.clone())?;
        }
        Ok(result)
    }

    fn extract_dense_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self> {
        self.shape.check_tile(offsets, shape)?;
        Self::new(shape.clone(), self.elem_type, self.dims_order, self.mem_space)
    }

    fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<Self> {
        self.check_view_bounds(offsets, shape, elem_strides)?;
        let parent = self.strides();
        let strides = parent
            .raw()
            .iter()
            .enumerate()
            .map(|(d, s)| *s * elem_strides.get(d).copied().unwrap_or(1))
            .collect();
        Self::new(shape.clone(), self.elem_type, self.dims_order, self.mem_space)?
            .with_strides(Strides::new(strides))
    }

    fn erase_tiled_info(&self) -> TypeResult<Self> {
        let mut result = self.clone();
        result.strides = None;
        Ok(result)
    }

    fn pad(&self, pad_before: &Shape, pad_after: &Shape) -> TypeResult<Self> {
        let padded = self.shape.add(pad_before)?.add(pad_after)?;
        Self::new(padded, self.elem_type, self.dims_order, self.mem_space)
    }
}
