//! Sparsity compression descriptor and tiler.
//!
//! Compressed weights store, for every slice along `axis` (the output-channel
//! dim), only the non-sparse elements. `num_elems[i]` is the element count of
//! slice `i`; each slice starts at an `alignment`-byte boundary.

use crate::core::{align_up, Byte, Dim, ElemType, Shape, TypeError, TypeResult};

pub const DEFAULT_COMPRESSION_ALIGNMENT: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SparsityCompression {
    axis: Dim,
    num_elems: Vec<i64>,
    alignment: i64,
}

impl SparsityCompression {
    pub fn new(axis: Dim, num_elems: Vec<i64>, alignment: i64) -> TypeResult<Self> {
        if alignment < 1 {
            return Err(TypeError::InvalidCompression {
                reason: format!("alignment must be positive, got {alignment}"),
            });
        }
        if let Some(n) = num_elems.iter().find(|n| **n < 0) {
            return Err(TypeError::InvalidCompression {
                reason: format!("negative element count {n}"),
            });
        }
        Ok(Self {
            axis,
            num_elems,
            alignment,
        })
    }

    pub fn axis(&self) -> Dim {
        self.axis
    }

    pub fn num_elems(&self) -> &[i64] {
        &self.num_elems
    }

    pub fn alignment(&self) -> i64 {
        self.alignment
    }

    pub fn total_num_elems(&self) -> i64 {
        self.num_elems.iter().sum()
    }

    /// Bytes needed for all slices, each padded to the alignment.
    pub fn alloc_size(&self, elem_type: ElemType) -> Byte {
        let bits = elem_type.size();
        let total = self
            .num_elems
            .iter()
            .map(|n| align_up((bits * *n).to_bytes().count(), self.alignment))
            .sum();
        Byte(total)
    }

    /// Fails unless this descriptor matches a buffer of `shape`.
    pub fn check_shape(&self, shape: &Shape) -> TypeResult<()> {
        let Some(extent) = shape.get(self.axis) else {
            return Err(TypeError::InvalidCompression {
                reason: format!("axis {} is out of range for {shape}", self.axis),
            });
        };
        if self.num_elems.len() as i64 != extent {
            return Err(TypeError::InvalidCompression {
                reason: format!(
                    "{} slice counts for extent {extent} along {} of {shape}",
                    self.num_elems.len(),
                    self.axis
                ),
            });
        }
        Ok(())
    }

    /// Descriptor of the slices covered by a tile.
    pub fn tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self> {
        let (Some(offset), Some(size)) = (offsets.get(self.axis), shape.get(self.axis)) else {
            return Err(TypeError::InvalidCompression {
                reason: format!("tile {offsets}/{shape} has no axis {}", self.axis),
            });
        };
        let end = offset + size;
        if offset < 0 || size < 0 || end > self.num_elems.len() as i64 {
            return Err(TypeError::InvalidCompression {
                reason: format!(
                    "tile [{offset}, {end}) along {} exceeds {} slices",
                    self.axis,
                    self.num_elems.len()
                ),
            });
        }
        Self::new(self.axis, self.num_elems[offset as usize..end as usize].to_vec(), self.alignment)
    }
}
