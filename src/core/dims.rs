//! Logical dimensions and dimension orders.
//!
//! A [`Dim`] is a zero-based logical dimension index. Layout families such as
//! [`dims4d`] give names to the dimensions of a fixed-rank tensor. A
//! [`DimsOrder`] is the permutation that maps logical dimensions to memory
//! order, outermost first.

use std::fmt;

use super::error::{TypeError, TypeResult};
use super::shape::{MemShape, Shape};

/// Logical dimension index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dim(pub usize);

impl Dim {
    pub const fn ind(self) -> usize {
        self.0
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Matmul-3D dimension names.
pub mod dims3d {
    use super::Dim;

    pub mod act {
        use super::Dim;

        pub const B: Dim = Dim(0);
        pub const H: Dim = Dim(1);
        pub const IC: Dim = Dim(2);
    }

    pub mod filter {
        use super::Dim;

        pub const B: Dim = Dim(0);
        pub const IC: Dim = Dim(1);
        pub const OC: Dim = Dim(2);
    }

    pub const RANK: usize = 3;
}

/// Convolution-2D dimension names.
pub mod dims4d {
    use super::Dim;
    use crate::core::error::{TypeError, TypeResult};

    /// Activation dimensions.
    pub mod act {
        use super::Dim;

        pub const N: Dim = Dim(0);
        pub const C: Dim = Dim(1);
        pub const H: Dim = Dim(2);
        pub const W: Dim = Dim(3);

        pub const NUM_SPATIAL_DIMS: usize = 2;
    }

    /// Filter dimensions.
    pub mod filter {
        use super::Dim;

        pub const OC: Dim = Dim(0);
        pub const IC: Dim = Dim(1);
        pub const KY: Dim = Dim(2);
        pub const KX: Dim = Dim(3);
    }

    pub const RANK: usize = 4;

    /// Spatial activation dimension `index` (0 = H, 1 = W).
    pub fn act_spatial_dim(index: usize) -> TypeResult<Dim> {
        if index >= act::NUM_SPATIAL_DIMS {
            return Err(TypeError::InvalidShape {
                reason: format!("Dims4D::Act: wrong spatial dimension index '{index}'"),
            });
        }
        Ok(Dim(index + 2))
    }
}

/// Convolution-3D dimension names.
pub mod dims5d {
    pub mod act {
        use crate::core::dims::Dim;

        pub const N: Dim = Dim(0);
        pub const C: Dim = Dim(1);
        pub const D: Dim = Dim(2);
        pub const H: Dim = Dim(3);
        pub const W: Dim = Dim(4);
    }

    pub const RANK: usize = 5;
}

/// Permutation of logical dimensions into memory order.
///
/// Stored as a packed code: one hex digit per dimension, outermost first,
/// each digit holding `dim + 1`. `NHWC` is therefore `0x1342`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimsOrder(u64);

const MAX_DIMS: usize = 15;

impl DimsOrder {
    pub const C: DimsOrder = DimsOrder(0x1);
    pub const NC: DimsOrder = DimsOrder(0x12);
    pub const CHW: DimsOrder = DimsOrder(0x123);
    pub const HWC: DimsOrder = DimsOrder(0x231);
    pub const NCHW: DimsOrder = DimsOrder(0x1234);
    pub const NHWC: DimsOrder = DimsOrder(0x1342);
    pub const NCWH: DimsOrder = DimsOrder(0x1243);
    pub const NHCW: DimsOrder = DimsOrder(0x1324);
    pub const NWCH: DimsOrder = DimsOrder(0x1423);
    pub const NWHC: DimsOrder = DimsOrder(0x1432);
    pub const NCDHW: DimsOrder = DimsOrder(0x12345);
    pub const NDHWC: DimsOrder = DimsOrder(0x13452);
    pub const OIYX: DimsOrder = DimsOrder::NCHW;
    pub const OYXI: DimsOrder = DimsOrder::NHWC;

    const NAMED: [(&'static str, DimsOrder); 12] = [
        ("C", DimsOrder::C),
        ("NC", DimsOrder::NC),
        ("CHW", DimsOrder::CHW),
        ("HWC", DimsOrder::HWC),
        ("NCHW", DimsOrder::NCHW),
        ("NHWC", DimsOrder::NHWC),
        ("NCWH", DimsOrder::NCWH),
        ("NHCW", DimsOrder::NHCW),
        ("NWCH", DimsOrder::NWCH),
        ("NWHC", DimsOrder::NWHC),
        ("NCDHW", DimsOrder::NCDHW),
        ("NDHWC", DimsOrder::NDHWC),
    ];

    /// Build an order from the memory permutation (outermost first).
    pub fn from_permutation(perm: &[Dim]) -> TypeResult<Self> {
        if perm.len() > MAX_DIMS {
            return Err(TypeError::InvalidShape {
                reason: format!(
                    "dims order supports at most {MAX_DIMS} dimensions, got {}",
                    perm.len()
                ),
            });
        }
        let mut seen = vec![false; perm.len()];
        let mut code = 0u64;
        for dim in perm {
            if dim.ind() >= perm.len() || seen[dim.ind()] {
                return Err(TypeError::InvalidShape {
                    reason: format!("{perm:?} is not a permutation"),
                });
            }
            seen[dim.ind()] = true;
            code = (code << 4) | (dim.ind() as u64 + 1);
        }
        Ok(Self(code))
    }

    /// Identity order for the given rank.
    pub fn default_for_rank(rank: usize) -> Self {
        let mut code = 0u64;
        for dim in 0..rank.min(MAX_DIMS) {
            code = (code << 4) | (dim as u64 + 1);
        }
        Self(code)
    }

    pub fn code(&self) -> u64 {
        self.0
    }

    pub fn num_dims(&self) -> usize {
        let mut count = 0;
        let mut code = self.0;
        while code != 0 {
            count += 1;
            code >>= 4;
        }
        count
    }

    /// Memory permutation, outermost first.
    pub fn to_permutation(&self) -> Vec<Dim> {
        let n = self.num_dims();
        (0..n)
            .map(|i| {
                let shift = 4 * (n - 1 - i);
                Dim((((self.0 >> shift) & 0xF) - 1) as usize)
            })
            .collect()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default_for_rank(self.num_dims())
    }

    /// Position of `dim` in memory order.
    pub fn dim_pos(&self, dim: Dim) -> Option<usize> {
        self.to_permutation().iter().position(|d| *d == dim)
    }

    /// Innermost dimension, if any.
    pub fn innermost(&self) -> Option<Dim> {
        self.to_permutation().last().copied()
    }

    pub fn to_memory_order(&self, shape: &Shape) -> MemShape {
        MemShape::new(self.to_permutation().iter().map(|d| shape[*d]).collect())
    }

    pub fn from_memory_order(&self, mem_shape: &MemShape) -> Shape {
        let perm = self.to_permutation();
        let mut dims = vec![0; perm.len()];
        for (pos, dim) in perm.iter().enumerate() {
            dims[dim.ind()] = mem_shape.raw()[pos];
        }
        Shape::new(dims)
    }

    /// Name of a well-known order.
    pub fn name(&self) -> Option<&'static str> {
        Self::NAMED.iter().find(|(_, order)| order == self).map(|(name, _)| *name)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMED.iter().find(|(n, _)| *n == name).map(|(_, order)| *order)
    }
}
