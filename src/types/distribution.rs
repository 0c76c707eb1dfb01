// This module defines the per-cluster distribution descriptor attached to distributed
// buffers. A DistributionInfo records how a tensor is spread over compute clusters: the
// mode (duplicated, segmented, overlapped, multicasted or a combination), the per-dimension
// tile counts, the cluster count, optional per-dimension alignment and the explicit
// per-cluster memory windows (shape and offset of the slice each cluster holds). Windows are
// always materialised, either given explicitly by the caller or derived from the mode and
// tile counts for a given global shape. Deriving windows for a new shape is what the
// non-explicit transforms of distributed buffers rely on; overlapped distributions depend
// on kernel geometry that is not recorded here, so they only accept explicit windows.

//! Cluster distribution descriptor.

use std::fmt;

use crate::core::{align_up, Dim, Shape, TypeError, TypeResult};

/// Sharding/replication mode of a distributed buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistributionMode {
    None,
    Duplicated,
    Segmented,
    Overlapped,
    Multicasted,
    DuplicatedSegmented,
    MulticastedSegmented,
}

impl DistributionMode {
    pub const fn name(self) -> &'static str {
        match self {
            DistributionMode::None => "NONE",
            DistributionMode::Duplicated => "DUPLICATED",
            DistributionMode::Segmented => "SEGMENTED",
            DistributionMode::Overlapped => "OVERLAPPED",
            DistributionMode::Multicasted => "MULTICASTED",
            DistributionMode::DuplicatedSegmented => "DUPLICATED|SEGMENTED",
            DistributionMode::MulticastedSegmented => "MULTICASTED|SEGMENTED",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NONE" => Some(DistributionMode::None),
            "DUPLICATED" => Some(DistributionMode::Duplicated),
            "SEGMENTED" => Some(DistributionMode::Segmented),
            "OVERLAPPED" => Some(DistributionMode::Overlapped),
            "MULTICASTED" => Some(DistributionMode::Multicasted),
            "DUPLICATED|SEGMENTED" | "SEGMENTED|DUPLICATED" => {
                Some(DistributionMode::DuplicatedSegmented)
            }
            "MULTICASTED|SEGMENTED" | "SEGMENTED|MULTICASTED" => {
                Some(DistributionMode::MulticastedSegmented)
            }
            _ => None,
        }
    }

    /// Every cluster holds the whole tensor in memory.
    pub const fn replicates_memory(self) -> bool {
        matches!(
            self,
            DistributionMode::None
                | DistributionMode::Duplicated
                | DistributionMode::Multicasted
                | DistributionMode::DuplicatedSegmented
                | DistributionMode::MulticastedSegmented
        )
    }
}

impl fmt::Display for DistributionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-cluster distribution descriptor with explicit memory windows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributionInfo {
    mode: DistributionMode,
    num_tiles: Option<Vec<i64>>,
    num_clusters: i64,
    alignment: Option<Vec<i64>>,
    uniform_distributed_segments: bool,
    memory_shapes: Vec<Shape>,
    memory_offsets: Vec<Shape>,
}

/// Fields of a descriptor before its windows are checked.
#[derive(Debug, Clone)]
pub struct DistributionParts {
    pub mode: DistributionMode,
    pub num_tiles: Option<Vec<i64>>,
    pub num_clusters: i64,
    pub alignment: Option<Vec<i64>>,
    pub uniform_distributed_segments: bool,
    pub memory_shapes: Vec<Shape>,
    pub memory_offsets: Vec<Shape>,
}

impl DistributionInfo {
    /// Descriptor with caller-provided windows.
    pub fn explicit(parts: DistributionParts) -> TypeResult<Self> {
        let info = Self {
            mode: parts.mode,
            num_tiles: parts.num_tiles,
            num_clusters: parts.num_clusters,
            alignment: parts.alignment,
            uniform_distributed_segments: parts.uniform_distributed_segments,
            memory_shapes: parts.memory_shapes,
            memory_offsets: parts.memory_offsets,
        };
        info.check_structure()?;
        Ok(info)
    }

    /// Every cluster holds the whole `shape`.
    pub fn duplicated(num_clusters: i64, shape: &Shape) -> TypeResult<Self> {
        Self::derived(DistributionMode::Duplicated, None, num_clusters, None, false, shape)
    }

    /// Split `shape` along the single dimension whose tile count exceeds one.
    pub fn segmented(
        num_tiles: Vec<i64>,
        num_clusters: i64,
        alignment: Option<Vec<i64>>,
        uniform_distributed_segments: bool,
        shape: &Shape,
    ) -> TypeResult<Self> {
        Self::derived(
            DistributionMode::Segmented,
            Some(num_tiles),
            num_clusters,
            alignment,
            uniform_distributed_segments,
            shape,
        )
    }

    fn derived(
        mode: DistributionMode,
        num_tiles: Option<Vec<i64>>,
        num_clusters: i64,
        alignment: Option<Vec<i64>>,
        uniform_distributed_segments: bool,
        shape: &Shape,
    ) -> TypeResult<Self> {
        let template = Self {
            mode,
            num_tiles,
            num_clusters,
            alignment,
            uniform_distributed_segments,
            memory_shapes: Vec::new(),
            memory_offsets: Vec::new(),
        };
        template.adapt_to_shape(shape)
    }

    pub fn mode(&self) -> DistributionMode {
        self.mode
    }

    pub fn num_tiles(&self) -> Option<&[i64]> {
        self.num_tiles.as_deref()
    }

    pub fn num_clusters(&self) -> i64 {
        self.num_clusters
    }

    pub fn alignment(&self) -> Option<&[i64]> {
        self.alignment.as_deref()
    }

    pub fn uniform_distributed_segments(&self) -> bool {
        self.uniform_distributed_segments
    }

    pub fn memory_shapes(&self) -> &[Shape] {
        &self.memory_shapes
    }

    pub fn memory_offsets(&self) -> &[Shape] {
        &self.memory_offsets
    }

    /// Fields of this descriptor, for building a modified copy.
    pub fn to_parts(&self) -> DistributionParts {
        DistributionParts {
            mode: self.mode,
            num_tiles: self.num_tiles.clone(),
            num_clusters: self.num_clusters,
            alignment: self.alignment.clone(),
            uniform_distributed_segments: self.uniform_distributed_segments,
            memory_shapes: self.memory_shapes.clone(),
            memory_offsets: self.memory_offsets.clone(),
        }
    }

    /// The single dimension split across clusters, if any.
    pub fn split_axis(&self) -> TypeResult<Option<Dim>> {
        let Some(tiles) = &self.num_tiles else {
            return Ok(None);
        };
        let mut axes = tiles.iter().enumerate().filter(|(_, t)| **t > 1).map(|(d, _)| Dim(d));
        let axis = axes.next();
        if axes.next().is_some() {
            return Err(TypeError::Distribution {
                reason: format!(
                    "only one dimension can be split across clusters, num_tiles = {tiles:?}"
                ),
            });
        }
        Ok(axis)
    }

    /// Re-derive the per-cluster windows for a buffer of `shape`.
    pub fn adapt_to_shape(&self, shape: &Shape) -> TypeResult<Self> {
        if self.mode == DistributionMode::Overlapped {
            return Err(TypeError::Distribution {
                reason: "OVERLAPPED distribution requires explicit per-cluster shapes".to_string(),
            });
        }
        if self.num_clusters < 1 {
            return Err(TypeError::Distribution {
                reason: format!("num_clusters must be positive, got {}", self.num_clusters),
            });
        }
        let clusters = self.num_clusters as usize;
        let (memory_shapes, memory_offsets) = if self.mode.replicates_memory() {
            (vec![shape.clone(); clusters], vec![Shape::filled(shape.rank(), 0); clusters])
        } else {
            self.segment(shape)?
        };
        let info = Self {
            memory_shapes,
            memory_offsets,
            ..self.clone()
        };
        info.check_structure()?;
        info.check_fits(shape)?;
        Ok(info)
    }

    fn segment(&self, shape: &Shape) -> TypeResult<(Vec<Shape>, Vec<Shape>)> {
        if let Some(tiles) = &self.num_tiles {
            shape.check_rank("distribution num_tiles", tiles.len())?;
        }
        let clusters = self.num_clusters as usize;
        let Some(axis) = self.split_axis()? else {
            let origin = Shape::filled(shape.rank(), 0);
            return Ok((vec![shape.clone(); clusters], vec![origin; clusters]));
        };
        let tiles = self.num_tiles.as_ref().map_or(1, |t| t[axis.ind()]);
        if tiles != self.num_clusters {
            return Err(TypeError::Distribution {
                reason: format!(
                    "segmenting over {tiles} tiles requires as many clusters, got {}",
                    self.num_clusters
                ),
            });
        }
        let extent = shape[axis];
        let align = self
            .alignment
            .as_ref()
            .and_then(|a| a.get(axis.ind()).copied())
            .unwrap_or(1)
            .max(1);

        let sizes = if self.uniform_distributed_segments {
            let units = (extent + align - 1) / align;
            let (base, rem) = (units / tiles, units % tiles);
            let mut remaining = extent;
            (0..tiles)
                .map(|i| {
                    let size = ((base + i64::from(i < rem)) * align).min(remaining);
                    remaining -= size;
                    size
                })
                .collect::<Vec<_>>()
        } else {
            let tile = align_up((extent + tiles - 1) / tiles, align);
            let mut remaining = extent;
            (0..tiles)
                .map(|_| {
                    let size = tile.min(remaining);
                    remaining -= size;
                    size
                })
                .collect::<Vec<_>>()
        };
        if let Some(pos) = sizes.iter().position(|s| *s <= 0) {
            return Err(TypeError::Distribution {
                reason: format!(
                    "cluster {pos} receives no data when splitting {extent} over {tiles} tiles on {axis}"
                ),
            });
        }

        let mut shapes = Vec::with_capacity(clusters);
        let mut offsets = Vec::with_capacity(clusters);
        let mut start = 0;
        for size in sizes {
            let mut cluster_shape = shape.clone();
            cluster_shape[axis] = size;
            let mut cluster_offset = Shape::filled(shape.rank(), 0);
            cluster_offset[axis] = start;
            start += size;
            shapes.push(cluster_shape);
            offsets.push(cluster_offset);
        }
        Ok((shapes, offsets))
    }

    fn check_structure(&self) -> TypeResult<()> {
        if self.num_clusters < 1 {
            return Err(TypeError::Distribution {
                reason: format!("num_clusters must be positive, got {}", self.num_clusters),
            });
        }
        let clusters = self.num_clusters as usize;
        if self.memory_shapes.len() != clusters || self.memory_offsets.len() != clusters {
            return Err(TypeError::Distribution {
                reason: format!(
                    "expected {clusters} per-cluster windows, got {} shapes and {} offsets",
                    self.memory_shapes.len(),
                    self.memory_offsets.len()
                ),
            });
        }
        if let Some(tiles) = &self.num_tiles {
            if tiles.iter().any(|t| *t < 1) {
                return Err(TypeError::Distribution {
                    reason: format!("num_tiles must be positive, got {tiles:?}"),
                });
            }
        }
        if let Some(alignment) = &self.alignment {
            if alignment.iter().any(|a| *a < 1) {
                return Err(TypeError::Distribution {
                    reason: format!("alignment must be positive, got {alignment:?}"),
                });
            }
        }
        Ok(())
    }

    /// Fails unless every window lies inside `shape` and the per-dim fields have its rank.
    pub fn check_fits(&self, shape: &Shape) -> TypeResult<()> {
        let rank = shape.rank();
        for (name, field) in [("num_tiles", &self.num_tiles), ("alignment", &self.alignment)] {
            if let Some(values) = field {
                if values.len() != rank {
                    return Err(TypeError::Distribution {
                        reason: format!("{name} {values:?} does not match rank {rank}"),
                    });
                }
            }
        }
        let windows = self.memory_shapes.iter().zip(&self.memory_offsets);
        for (cluster, (window, offset)) in windows.enumerate() {
            let inside = window.rank() == rank
                && offset.rank() == rank
                && (0..rank).all(|d| {
                    let (size, off, bound) = (window.raw()[d], offset.raw()[d], shape.raw()[d]);
                    size > 0 && off >= 0 && off + size <= bound
                });
            if !inside {
                return Err(TypeError::Distribution {
                    reason: format!(
                        "cluster {cluster} window {window} at {offset} does not fit into {shape}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Largest per-cluster window, by element count.
    pub fn largest_memory_shape(&self) -> Option<&Shape> {
        self.memory_shapes.iter().max_by_key(|s| s.total_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segmented_over_height() {
        let shape = Shape::from([1, 16, 7, 8]);
        let info = DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, &shape).unwrap();
        assert_eq!(info.memory_shapes(), &[Shape::from([1, 16, 4, 8]), Shape::from([1, 16, 3, 8])]);
        assert_eq!(info.memory_offsets()[1], Shape::from([0, 0, 4, 0]));
    }

    #[test]
    fn test_uniform_segments_with_alignment() {
        let shape = Shape::from([1, 64, 4, 4]);
        let alignment = Some(vec![1, 16, 1, 1]);
        let info =
            DistributionInfo::segmented(vec![1, 3, 1, 1], 3, alignment, true, &shape).unwrap();
        let channels: Vec<i64> = info.memory_shapes().iter().map(|s| s.raw()[1]).collect();
        assert_eq!(channels, vec![32, 16, 16]);
    }

    #[test]
    fn test_duplicated_windows() {
        let shape = Shape::from([1, 16, 4, 4]);
        let info = DistributionInfo::duplicated(4, &shape).unwrap();
        assert!(info.memory_shapes().iter().all(|s| *s == shape));
        assert_eq!(info.largest_memory_shape(), Some(&shape));
    }

    #[test]
    fn test_overlapped_needs_explicit_windows() {
        let shape = Shape::from([1, 16, 4, 4]);
        let info = DistributionInfo::explicit(DistributionParts {
            mode: DistributionMode::Overlapped,
            num_tiles: Some(vec![1, 1, 2, 1]),
            num_clusters: 2,
            alignment: None,
            uniform_distributed_segments: false,
            memory_shapes: vec![Shape::from([1, 16, 3, 4]), Shape::from([1, 16, 3, 4])],
            memory_offsets: vec![Shape::from([0, 0, 0, 0]), Shape::from([0, 0, 1, 0])],
        })
        .unwrap();
        assert!(info.check_fits(&shape).is_ok());
        assert!(matches!(info.adapt_to_shape(&shape), Err(TypeError::Distribution { .. })));
    }

    #[test]
    fn test_too_many_clusters_for_extent() {
        let shape = Shape::from([1, 16, 1, 4]);
        let result = DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, &shape);
        assert!(matches!(result, Err(TypeError::Distribution { .. })));
    }
}
