// This module implements the shape-expansion mappings a storage element table can realise.
// The table lets the hardware read an activation through a list of element pointers, so
// the tensor seen by the consumer (the effective or output shape) may be larger than the
// data actually stored: upsampling inserts zero rows and columns between the stored ones,
// padding replicates or reflects border elements. Both mappings only touch the spatial
// axes of a rank-4 activation; batch and channels pass through.
//
// The mapping is modelled as a pure pair: infer_output_shape computes the effective shape
// for a stored shape, and back_infer_input_shape inverts it exactly or fails. Tiling an
// effective tile back to storage is done by extract_tile, which also re-parameterises the
// mapping (the padding amounts change when a tile cuts through the padded border) so that
// infer_output_shape(tile input) always equals the requested tile shape.

//! Storage element shape-expansion mappings.

use std::fmt;

use crate::core::{dims4d, Dim, Shape, TypeError, TypeResult};

/// Border fill mode of a padding mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadMode {
    Constant,
    Edge,
    Reflect,
    Symmetric,
}

impl PadMode {
    pub const fn name(self) -> &'static str {
        match self {
            PadMode::Constant => "constant",
            PadMode::Edge => "edge",
            PadMode::Reflect => "reflect",
            PadMode::Symmetric => "symmetric",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "constant" => Some(PadMode::Constant),
            "edge" => Some(PadMode::Edge),
            "reflect" => Some(PadMode::Reflect),
            "symmetric" => Some(PadMode::Symmetric),
            _ => None,
        }
    }
}

impl fmt::Display for PadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape-expansion mapping from stored data to the effective tensor.
///
/// `padding` is `[left, top, right, bottom]`, `factors` is `[H, W]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeAttr {
    /// `factor` zeros inserted between consecutive elements of each spatial axis.
    Upsampling { factors: [i64; 2], padding: [i64; 4] },
    Padding { mode: PadMode, padding: [i64; 4] },
}

/// Result of mapping an effective-shape tile back to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeTile {
    pub attr: SeAttr,
    pub input_offsets: Shape,
    pub input_shape: Shape,
}

/// One spatial axis of a tile: stored range plus the mapping's border amounts.
#[derive(Debug, Clone, Copy)]
struct AxisTile {
    in_offset: i64,
    in_len: i64,
    pad_before: i64,
    pad_after: i64,
}

const SPATIAL: [Dim; 2] = [dims4d::act::H, dims4d::act::W];

impl SeAttr {
    pub fn upsampling(factors: [i64; 2], padding: [i64; 4]) -> TypeResult<Self> {
        if factors.iter().any(|f| *f < 1) {
            return Err(TypeError::InvalidSeAttr {
                reason: format!("upsampling factors must be positive, got {factors:?}"),
            });
        }
        check_padding(&padding)?;
        Ok(SeAttr::Upsampling { factors, padding })
    }

    pub fn padding(mode: PadMode, padding: [i64; 4]) -> TypeResult<Self> {
        check_padding(&padding)?;
        Ok(SeAttr::Padding { mode, padding })
    }

    pub fn padding_amounts(&self) -> [i64; 4] {
        match self {
            SeAttr::Upsampling { padding, .. } | SeAttr::Padding { padding, .. } => *padding,
        }
    }

    /// Border amounts `(before, after)` of spatial axis `axis` (0 = H, 1 = W).
    fn axis_padding(&self, axis: usize) -> (i64, i64) {
        let [left, top, right, bottom] = self.padding_amounts();
        if axis == 0 {
            (top, bottom)
        } else {
            (left, right)
        }
    }

    fn with_axis_padding(&self, pads: [(i64, i64); 2]) -> SeAttr {
        let [(top, bottom), (left, right)] = pads;
        let padding = [left, top, right, bottom];
        match *self {
            SeAttr::Upsampling { factors, .. } => SeAttr::Upsampling { factors, padding },
            SeAttr::Padding { mode, .. } => SeAttr::Padding { mode, padding },
        }
    }

    fn axis_output(&self, axis: usize, input: i64) -> TypeResult<i64> {
        let (before, after) = self.axis_padding(axis);
        if input < 1 {
            return Err(TypeError::InvalidSeAttr {
                reason: format!("stored extent {input} on axis {axis} has no element to map"),
            });
        }
        let output = match self {
            SeAttr::Upsampling { factors, .. } => factors[axis]
                .checked_add(1)
                .and_then(|step| (input - 1).checked_mul(step)),
            SeAttr::Padding { mode, .. } => {
                let limit = match mode {
                    PadMode::Reflect => input - 1,
                    PadMode::Symmetric => input,
                    PadMode::Constant | PadMode::Edge => i64::MAX,
                };
                if before > limit || after > limit {
                    return Err(TypeError::InvalidSeAttr {
                        reason: format!(
                            "{mode} padding ({before}, {after}) exceeds the input extent {input}"
                        ),
                    });
                }
                Some(input - 1)
            }
        };
        output
            .and_then(|inner| inner.checked_add(1))
            .and_then(|inner| inner.checked_add(before))
            .and_then(|inner| inner.checked_add(after))
            .ok_or_else(|| TypeError::InvalidSeAttr {
                reason: format!(
                    "effective extent of {input} on axis {axis} overflows with {self:?}"
                ),
            })
    }

    fn axis_input(&self, axis: usize, output: i64) -> TypeResult<i64> {
        let (before, after) = self.axis_padding(axis);
        let inner = output
            .checked_sub(before)
            .and_then(|inner| inner.checked_sub(after))
            .unwrap_or(i64::MIN);
        let input = match self {
            SeAttr::Upsampling { factors, .. } => {
                let step = factors[axis].saturating_add(1);
                if inner < 1 || (inner - 1) % step != 0 {
                    return Err(TypeError::InvalidSeAttr {
                        reason: format!(
                            "output extent {output} is not reachable with upsampling factor {}",
                            factors[axis]
                        ),
                    });
                }
                (inner - 1) / step + 1
            }
            SeAttr::Padding { .. } => inner,
        };
        if input < 1 {
            return Err(TypeError::InvalidSeAttr {
                reason: format!(
                    "output extent {output} is smaller than padding ({before}, {after})"
                ),
            });
        }
        Ok(input)
    }

    /// Effective shape seen through this mapping for stored data of `input`.
    pub fn infer_output_shape(&self, input: &Shape) -> TypeResult<Shape> {
        input.check_rank("storage element mapping", dims4d::RANK)?;
        let mut output = input.clone();
        for (axis, dim) in SPATIAL.into_iter().enumerate() {
            output[dim] = self.axis_output(axis, input[dim])?;
        }
        Ok(output)
    }

    /// Stored shape whose effective shape is exactly `output`.
    pub fn back_infer_input_shape(&self, output: &Shape) -> TypeResult<Shape> {
        output.check_rank("storage element mapping", dims4d::RANK)?;
        let mut input = output.clone();
        for (axis, dim) in SPATIAL.into_iter().enumerate() {
            input[dim] = self.axis_input(axis, output[dim])?;
        }
        // Padding limits depend on the input extent.
        if self.infer_output_shape(&input)? != *output {
            return Err(TypeError::InvalidSeAttr {
                reason: format!("no stored shape maps to {output}"),
            });
        }
        Ok(input)
    }

    /// Map an effective-shape tile to the stored data it reads.
    pub fn extract_tile(
        &self,
        out_offsets: &Shape,
        out_shape: &Shape,
        data_shape: &Shape,
    ) -> TypeResult<SeTile> {
        let output = self.infer_output_shape(data_shape)?;
        output.check_tile(out_offsets, out_shape)?;

        let mut input_offsets = out_offsets.clone();
        let mut input_shape = out_shape.clone();
        let mut pads = [(0, 0); 2];
        for (axis, dim) in SPATIAL.into_iter().enumerate() {
            let tile = self.axis_tile(axis, out_offsets[dim], out_shape[dim], data_shape[dim])?;
            input_offsets[dim] = tile.in_offset;
            input_shape[dim] = tile.in_len;
            pads[axis] = (tile.pad_before, tile.pad_after);
        }
        let attr = self.with_axis_padding(pads);
        log::trace!(
            "se tile {out_offsets}/{out_shape} reads {input_offsets}/{input_shape} with {attr:?}",
        );
        Ok(SeTile {
            attr,
            input_offsets,
            input_shape,
        })
    }

    fn axis_tile(&self, axis: usize, offset: i64, len: i64, input: i64) -> TypeResult<AxisTile> {
        let (before, after) = self.axis_padding(axis);
        match self {
            SeAttr::Upsampling { factors, .. } => {
                let step = factors[axis] + 1;
                let first = offset - before;
                let last = (offset + len - 1 - before).min((input - 1) * step);
                let i0 = (first.max(0) + step - 1) / step;
                if last < 0 || i0 * step > last {
                    return Err(TypeError::InvalidSeAttr {
                        reason: format!(
                            "tile [{offset}, {}) on axis {axis} holds no stored element",
                            offset + len
                        ),
                    });
                }
                let i_last = last / step;
                Ok(AxisTile {
                    in_offset: i0,
                    in_len: i_last - i0 + 1,
                    pad_before: before + i0 * step - offset,
                    pad_after: offset + len - 1 - (before + i_last * step),
                })
            }
            SeAttr::Padding { mode, .. } => {
                let k = (before - offset).clamp(0, len);
                let r = (offset + len - (before + input)).clamp(0, len);
                let m = len - k - r;
                if m == 0 {
                    return match mode {
                        PadMode::Edge if k > 0 => Ok(AxisTile {
                            in_offset: 0,
                            in_len: 1,
                            pad_before: len - 1,
                            pad_after: 0,
                        }),
                        PadMode::Edge => Ok(AxisTile {
                            in_offset: input - 1,
                            in_len: 1,
                            pad_before: 0,
                            pad_after: len - 1,
                        }),
                        _ => Err(TypeError::InvalidSeAttr {
                            reason: format!(
                                "{mode} padding tile [{offset}, {}) on axis {axis} holds no stored element",
                                offset + len
                            ),
                        }),
                    };
                }
                let limit = match mode {
                    PadMode::Reflect => m - 1,
                    PadMode::Symmetric => m,
                    PadMode::Constant | PadMode::Edge => i64::MAX,
                };
                if k > limit || r > limit {
                    return Err(TypeError::InvalidSeAttr {
                        reason: format!(
                            "{mode} padding of tile [{offset}, {}) on axis {axis} reads outside its stored range",
                            offset + len
                        ),
                    });
                }
                Ok(AxisTile {
                    in_offset: (offset - before).max(0),
                    in_len: m,
                    pad_before: k,
                    pad_after: r,
                })
            }
        }
    }
}

fn check_padding(padding: &[i64; 4]) -> TypeResult<()> {
    if padding.iter().any(|p| *p < 0) {
        return Err(TypeError::InvalidSeAttr {
            reason: format!("padding must be non-negative, got {padding:?}"),
        });
    }
    Ok(())
}
