//! Logical and memory-ordered shapes.

use std::fmt;
use std::ops::{Index, IndexMut};

use super::dims::Dim;
use super::error::{TypeError, TypeResult};

/// Ordered dimension extents in logical order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<i64>);

impl Shape {
    pub fn new(dims: Vec<i64>) -> Self {
        Shape(dims)
    }

    /// Shape of the given rank with every extent set to `value`.
    pub fn filled(rank: usize, value: i64) -> Self {
        Shape(vec![value; rank])
    }

    pub fn raw(&self) -> &[i64] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.0.iter()
    }

    /// Number of elements described by the shape.
    pub fn total_size(&self) -> i64 {
        self.0.iter().product()
    }

    pub fn get(&self, dim: Dim) -> Option<i64> {
        self.0.get(dim.ind()).copied()
    }

    /// Element-wise sum of two shapes of the same rank.
    pub fn add(&self, other: &Shape) -> TypeResult<Shape> {
        self.check_rank("shape addition", other.rank())?;
        Ok(Shape(self.0.iter().zip(other.iter()).map(|(a, b)| a + b).collect()))
    }

    pub fn check_rank(&self, op: &'static str, rank: usize) -> TypeResult<()> {
        if self.rank() != rank {
            return Err(TypeError::RankMismatch {
                op,
                expected: self.rank(),
                found: rank,
            });
        }
        Ok(())
    }

    /// Fails unless `[offsets, offsets + shape)` lies inside `self`.
    pub fn check_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<()> {
        self.check_rank("tile offsets", offsets.rank())?;
        self.check_rank("tile shape", shape.rank())?;
        let inside = self
            .iter()
            .zip(offsets.iter().zip(shape.iter()))
            .all(|(bound, (off, size))| *off >= 0 && *size > 0 && off + size <= *bound);
        if !inside {
            return Err(TypeError::TileOutOfBounds {
                offsets: offsets.to_string(),
                shape: shape.to_string(),
                bounds: self.to_string(),
            });
        }
        Ok(())
    }
}

impl Index<Dim> for Shape {
    type Output = i64;

    fn index(&self, dim: Dim) -> &i64 {
        &self.0[dim.ind()]
    }
}

impl IndexMut<Dim> for Shape {
    fn index_mut(&mut self, dim: Dim) -> &mut i64 {
        &mut self.0[dim.ind()]
    }
}

impl From<Vec<i64>> for Shape {
    fn from(dims: Vec<i64>) -> Self {
        Shape(dims)
    }
}

impl From<&[i64]> for Shape {
    fn from(dims: &[i64]) -> Self {
        Shape(dims.to_vec())
    }
}

impl<const N: usize> From<[i64; N]> for Shape {
    fn from(dims: [i64; N]) -> Self {
        Shape(dims.to_vec())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Dimension extents in memory order, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MemShape(Vec<i64>);

impl MemShape {
    pub fn new(dims: Vec<i64>) -> Self {
        MemShape(dims)
    }

    pub fn raw(&self) -> &[i64] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn total_size(&self) -> i64 {
        self.0.iter().product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_bounds() {
        let shape = Shape::from([1, 16, 8, 8]);
        assert!(shape.check_tile(&Shape::from([0, 0, 2, 2]), &Shape::from([1, 16, 4, 4])).is_ok());
        assert!(shape.check_tile(&Shape::from([0, 0, 6, 0]), &Shape::from([1, 16, 4, 8])).is_err());
        assert!(shape.check_tile(&Shape::from([0, 0]), &Shape::from([1, 16])).is_err());
    }

    #[test]
    fn test_total_size_and_display() {
        let shape = Shape::from([2, 3, 4]);
        assert_eq!(shape.total_size(), 24);
        assert_eq!(shape.to_string(), "[2, 3, 4]");
        assert_eq!(Shape::default().total_size(), 1);
    }
}
