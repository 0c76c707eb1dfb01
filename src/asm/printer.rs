//! Canonical text form of every type.
//!
//! The output is what [`parser`](super::parser) accepts: dims order and memory
//! space are always printed, strides only when they are not compact, and the
//! optional sparse buffer fields follow their fixed order.

use std::fmt;

use crate::core::{DimsOrder, ElemType, MemSpace, Shape};
use crate::sparse::{SeAttr, SparseBufferType, SparsityCompression};
use crate::types::{BufferType, DistributedBufferType, DistributionInfo, MemRefType, NdType};

fn write_list(f: &mut fmt::Formatter<'_>, values: &[i64]) -> fmt::Result {
    write!(f, "[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    write!(f, "]")
}

fn write_shapes(f: &mut fmt::Formatter<'_>, shapes: &[Shape]) -> fmt::Result {
    write!(f, "[")?;
    for (i, shape) in shapes.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{shape}")?;
    }
    write!(f, "]")
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mnemonic_prefix(), self.width)
    }
}

impl fmt::Display for MemSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "[@{}, {index}]", self.kind.name()),
            None => write!(f, "@{}", self.kind.name()),
        }
    }
}

impl fmt::Display for DimsOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return write!(f, "#{name}");
        }
        let perm: Vec<i64> = self.to_permutation().iter().map(|d| d.ind() as i64).collect();
        write!(f, "#order<")?;
        write_list(f, &perm)?;
        write!(f, ">")
    }
}

impl fmt::Display for MemRefType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "memref<")?;
        for extent in self.shape().iter() {
            write!(f, "{extent}x")?;
        }
        write!(f, "{}, {}, {}", self.element_type(), self.dims_order(), self.mem_space())?;
        if let Some(strides) = self.explicit_strides() {
            write!(f, ", strides = ")?;
            write_list(f, &strides.in_elements(self.elem_type_size()))?;
        }
        write!(f, ">")
    }
}

impl fmt::Display for DistributionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{mode = {}", self.mode())?;
        if let Some(tiles) = self.num_tiles() {
            write!(f, ", num_tiles = ")?;
            write_list(f, tiles)?;
        }
        write!(f, ", num_clusters = {}", self.num_clusters())?;
        if let Some(alignment) = self.alignment() {
            write!(f, ", alignment = ")?;
            write_list(f, alignment)?;
        }
        if self.uniform_distributed_segments() {
            write!(f, ", uniform_distributed_segments")?;
        }
        write!(f, ", memory_shapes = ")?;
        write_shapes(f, self.memory_shapes())?;
        write!(f, ", memory_offsets = ")?;
        write_shapes(f, self.memory_offsets())?;
        write!(f, "}}")
    }
}

impl fmt::Display for DistributedBufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!distributed<{}, {}>", self.global(), self.distribution())
    }
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferType::MemRef(buffer) => buffer.fmt(f),
            BufferType::Distributed(buffer) => buffer.fmt(f),
        }
    }
}

impl fmt::Display for SparsityCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#sparsity_compression<axis = {}, num_elems = ", self.axis().ind())?;
        write_list(f, self.num_elems())?;
        write!(f, ", alignment = {}>", self.alignment())
    }
}

impl fmt::Display for SeAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeAttr::Upsampling { factors, padding } => {
                write!(f, "#se_upsampling<factors = ")?;
                write_list(f, factors)?;
                write!(f, ", padding = ")?;
                write_list(f, padding)?;
            }
            SeAttr::Padding { mode, padding } => {
                write!(f, "#se_padding<mode = {mode}, padding = ")?;
                write_list(f, padding)?;
            }
        }
        write!(f, ">")
    }
}

impl fmt::Display for SparseBufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!sparse_buffer<data={}", self.data())?;
        if let Some(map) = self.sparsity_map() {
            write!(f, ", sparsity_map={map}")?;
        }
        if let Some(table) = self.storage_element_table() {
            write!(f, ", storage_element_table={table}")?;
        }
        if self.is_weights() {
            write!(f, ", is_weights")?;
        }
        if let Some(compression) = self.sparsity_compression() {
            write!(f, ", {compression}")?;
        }
        if let Some(se_attr) = self.se_attr() {
            write!(f, ", {se_attr}")?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Dim, MemoryKind, Strides};

    #[test]
    fn test_memref_canonical_form() {
        let shape = Shape::from([1, 16, 8, 8]);
        let buffer =
            MemRefType::new(shape, ElemType::F16, DimsOrder::NHWC, MemSpace::CMX_NN).unwrap();
        assert_eq!(buffer.to_string(), "memref<1x16x8x8xf16, #NHWC, @CMX_NN>");

        let doubled = Strides::new(buffer.strides().raw().iter().map(|s| *s * 2).collect());
        let strided = buffer.change_strides(&doubled).unwrap();
        assert_eq!(
            strided.to_string(),
            "memref<1x16x8x8xf16, #NHWC, @CMX_NN, strides = [2048, 2, 256, 32]>"
        );
    }

    #[test]
    fn test_indexed_space_and_custom_order() {
        assert_eq!(MemSpace::indexed(MemoryKind::CmxNn, 0).to_string(), "[@CMX_NN, 0]");
        let order = DimsOrder::from_permutation(&[Dim(1), Dim(0), Dim(2)]).unwrap();
        assert_eq!(order.to_string(), "#order<[1, 0, 2]>");
    }
}
