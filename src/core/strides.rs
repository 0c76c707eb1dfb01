//! Bit/byte sizes and per-dimension strides.
//!
//! Strides are kept in bits so that sub-byte element types (such as the `i1`
//! sparsity map) are represented exactly.

use std::fmt;
use std::ops::{Add, AddAssign, Index, Mul};

use super::dims::{Dim, DimsOrder};
use super::shape::{MemShape, Shape};

/// Size in bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bit(pub i64);

/// Size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Byte(pub i64);

impl Bit {
    pub const fn count(self) -> i64 {
        self.0
    }

    /// Byte size, rounding partial bytes up.
    pub const fn to_bytes(self) -> Byte {
        Byte((self.0 + 7) / 8)
    }
}

impl Byte {
    pub const fn count(self) -> i64 {
        self.0
    }

    pub const fn to_bits(self) -> Bit {
        Bit(self.0 * 8)
    }
}

impl Add for Bit {
    type Output = Bit;

    fn add(self, rhs: Bit) -> Bit {
        Bit(self.0 + rhs.0)
    }
}

impl Mul<i64> for Bit {
    type Output = Bit;

    fn mul(self, rhs: i64) -> Bit {
        Bit(self.0 * rhs)
    }
}

impl Add for Byte {
    type Output = Byte;

    fn add(self, rhs: Byte) -> Byte {
        Byte(self.0 + rhs.0)
    }
}

impl AddAssign for Byte {
    fn add_assign(&mut self, rhs: Byte) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Byte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bytes", self.0)
    }
}

/// Round `value` up to a multiple of `alignment`.
pub fn align_up(value: i64, alignment: i64) -> i64 {
    if alignment <= 1 {
        return value;
    }
    (value + alignment - 1) / alignment * alignment
}

/// Per-dimension strides in logical order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Strides(Vec<Bit>);

/// Per-dimension strides in memory order, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MemStrides(Vec<Bit>);

impl Strides {
    pub fn new(strides: Vec<Bit>) -> Self {
        Strides(strides)
    }

    pub fn raw(&self) -> &[Bit] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Row-major strides of `shape` laid out in `order` with `elem_size` elements.
    pub fn compact(shape: &Shape, order: DimsOrder, elem_size: Bit) -> Strides {
        let mem_shape = order.to_memory_order(shape);
        let mem_strides = MemStrides::compact(&mem_shape, elem_size);
        mem_strides.to_logical(order)
    }

    pub fn to_memory_order(&self, order: DimsOrder) -> MemStrides {
        MemStrides(order.to_permutation().iter().map(|d| self.0[d.ind()]).collect())
    }

    /// Element-count form of the strides for an element of `elem_size`.
    pub fn in_elements(&self, elem_size: Bit) -> Vec<i64> {
        self.0.iter().map(|s| s.count() / elem_size.count().max(1)).collect()
    }
}

impl Index<Dim> for Strides {
    type Output = Bit;

    fn index(&self, dim: Dim) -> &Bit {
        &self.0[dim.ind()]
    }
}

impl MemStrides {
    pub fn new(strides: Vec<Bit>) -> Self {
        MemStrides(strides)
    }

    pub fn raw(&self) -> &[Bit] {
        &self.0
    }

    pub fn compact(mem_shape: &MemShape, elem_size: Bit) -> MemStrides {
        let dims = mem_shape.raw();
        let mut strides = vec![Bit(0); dims.len()];
        let mut running = elem_size;
        for pos in (0..dims.len()).rev() {
            strides[pos] = running;
            running = running * dims[pos].max(1);
        }
        MemStrides(strides)
    }

    pub fn to_logical(&self, order: DimsOrder) -> Strides {
        let perm = order.to_permutation();
        let mut strides = vec![Bit(0); perm.len()];
        for (pos, dim) in perm.iter().enumerate() {
            strides[dim.ind()] = self.0[pos];
        }
        Strides(strides)
    }
}

impl fmt::Display for Strides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, s) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", s.count())?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_nhwc_strides() {
        let shape = Shape::from([1, 16, 8, 8]);
        let strides = Strides::compact(&shape, DimsOrder::NHWC, Bit(16));
        assert_eq!(strides.in_elements(Bit(16)), vec![1024, 1, 128, 16]);
    }

    #[test]
    fn test_compact_sub_byte_strides() {
        let shape = Shape::from([1, 16, 2, 2]);
        let strides = Strides::compact(&shape, DimsOrder::NCHW, Bit(1));
        assert_eq!(strides.raw(), &[Bit(64), Bit(4), Bit(2), Bit(1)]);
        assert_eq!(Bit(9).to_bytes(), Byte(2));
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(32, 16), 32);
        assert_eq!(align_up(5, 1), 5);
    }
}
