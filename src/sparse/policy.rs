// This module defines how a distribution descriptor given for a whole sparse buffer is
// turned into one descriptor per sub-buffer. The caller describes the distribution of the
// effective tensor; each component needs its own view of it. Stored data seen through a
// storage element mapping reads a different window per cluster than the effective tensor;
// a weights sparsity map is laid out per output channel and never splits spatially; and a
// storage element table has one channel per seSize data channels, so its channel windows
// shrink by that factor. The contract is a trait so a compiler can plug in its own policy;
// DefaultDistributionPolicy implements the rules above and is what the ClusterType impl of
// SparseBufferType uses.

//! Per-component distribution derivation.

use crate::core::{dims4d, Shape, TypeError, TypeResult};
use crate::sparse::se_attr::SeAttr;
use crate::types::{DistributionInfo, DistributionParts};

/// Derives sub-buffer descriptors from the descriptor of a whole sparse buffer.
///
/// `distribution` always describes the effective (output) shape of the composite.
pub trait DistributionPolicy {
    /// Descriptor for the stored data of `data_shape`.
    fn for_sparse_data(
        &self,
        distribution: &DistributionInfo,
        data_shape: &Shape,
        se_attr: Option<&SeAttr>,
    ) -> TypeResult<DistributionInfo>;

    /// Descriptor for a sparsity map of `map_shape`.
    fn for_sparsity_map(
        &self,
        distribution: &DistributionInfo,
        map_shape: &Shape,
        is_weights: bool,
    ) -> TypeResult<DistributionInfo>;

    /// Descriptor for a storage element table serving `se_size` channels per entry.
    fn for_storage_element_table(
        &self,
        distribution: &DistributionInfo,
        se_size: i64,
    ) -> TypeResult<DistributionInfo>;
}

/// Policy used when the caller does not supply one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDistributionPolicy;

impl DistributionPolicy for DefaultDistributionPolicy {
    fn for_sparse_data(
        &self,
        distribution: &DistributionInfo,
        data_shape: &Shape,
        se_attr: Option<&SeAttr>,
    ) -> TypeResult<DistributionInfo> {
        let Some(se_attr) = se_attr else {
            return Ok(distribution.clone());
        };
        let mut parts = distribution.to_parts();
        let mut shapes = Vec::with_capacity(parts.memory_shapes.len());
        let mut offsets = Vec::with_capacity(parts.memory_offsets.len());
        for (window, offset) in parts.memory_shapes.iter().zip(&parts.memory_offsets) {
            let tile = se_attr.extract_tile(offset, window, data_shape)?;
            shapes.push(tile.input_shape);
            offsets.push(tile.input_offsets);
        }
        parts.memory_shapes = shapes;
        parts.memory_offsets = offsets;
        let derived = DistributionInfo::explicit(parts)?;
        log::trace!("data distribution through {se_attr:?}: {:?}", derived.memory_shapes());
        Ok(derived)
    }

    fn for_sparsity_map(
        &self,
        distribution: &DistributionInfo,
        map_shape: &Shape,
        is_weights: bool,
    ) -> TypeResult<DistributionInfo> {
        if !is_weights {
            return Ok(distribution.clone());
        }
        map_shape.check_rank("weights sparsity map distribution", dims4d::RANK)?;
        let oc = dims4d::filter::OC;
        let keep_output_channels = |values: &[i64]| -> TypeResult<Vec<i64>> {
            let value = values.get(oc.ind()).copied().ok_or_else(|| TypeError::Distribution {
                reason: format!("per-dimension values {values:?} have no output channel entry"),
            })?;
            let mut kept = vec![1; map_shape.rank()];
            kept[oc.ind()] = value;
            Ok(kept)
        };

        let mut parts = distribution.to_parts();
        parts.num_tiles = parts.num_tiles.as_deref().map(&keep_output_channels).transpose()?;
        parts.alignment = parts.alignment.as_deref().map(&keep_output_channels).transpose()?;
        let mut shapes = Vec::with_capacity(parts.memory_shapes.len());
        let mut offsets = Vec::with_capacity(parts.memory_offsets.len());
        for (window, offset) in parts.memory_shapes.iter().zip(&parts.memory_offsets) {
            let (Some(size), Some(start)) = (window.get(oc), offset.get(oc)) else {
                return Err(TypeError::Distribution {
                    reason: format!("cluster window {window} has no output channel dimension"),
                });
            };
            let mut map_window = map_shape.clone();
            map_window[oc] = size;
            let mut map_offset = Shape::filled(map_shape.rank(), 0);
            map_offset[oc] = start;
            shapes.push(map_window);
            offsets.push(map_offset);
        }
        parts.memory_shapes = shapes;
        parts.memory_offsets = offsets;
        DistributionInfo::explicit(parts)
    }

    fn for_storage_element_table(
        &self,
        distribution: &DistributionInfo,
        se_size: i64,
    ) -> TypeResult<DistributionInfo> {
        if se_size < 1 {
            return Err(TypeError::Distribution {
                reason: format!("seSize must be positive, got {se_size}"),
            });
        }
        let c = dims4d::act::C;
        let mut parts: DistributionParts = distribution.to_parts();
        let mut table_channels = 1;
        let windows = parts.memory_shapes.iter_mut().zip(parts.memory_offsets.iter_mut());
        for (window, offset) in windows {
            window.check_rank("storage element table distribution", dims4d::RANK)?;
            offset.check_rank("storage element table distribution", dims4d::RANK)?;
            window[c] = (window[c] / se_size).max(1);
            offset[c] /= se_size;
            table_channels = table_channels.max(offset[c] + window[c]);
        }
        if let Some(tiles) = parts.num_tiles.as_mut() {
            if let Some(channel_tiles) = tiles.get_mut(c.ind()) {
                *channel_tiles = (*channel_tiles).min(table_channels);
            }
        }
        let derived = DistributionInfo::explicit(parts)?;
        log::trace!("table distribution with seSize {se_size}: {:?}", derived.memory_shapes());
        Ok(derived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::se_attr::PadMode;

    #[test]
    fn test_weights_map_ignores_spatial_split() {
        let data_shape = Shape::from([32, 16, 3, 3]);
        let alignment = Some(vec![16, 1, 1, 1]);
        let distribution =
            DistributionInfo::segmented(vec![2, 1, 1, 1], 2, alignment, false, &data_shape)
                .unwrap();
        let map_shape = Shape::from([32, 1, 1, 256]);
        let derived = DefaultDistributionPolicy
            .for_sparsity_map(&distribution, &map_shape, true)
            .unwrap();

        assert_eq!(derived.num_tiles(), Some(&[2, 1, 1, 1][..]));
        assert_eq!(derived.memory_shapes(), vec![Shape::from([16, 1, 1, 256]); 2]);
        assert_eq!(derived.memory_offsets()[1], Shape::from([16, 0, 0, 0]));
    }

    #[test]
    fn test_table_channels_scaled_by_se_size() {
        let shape = Shape::from([1, 64, 8, 8]);
        let distribution =
            DistributionInfo::segmented(vec![1, 4, 1, 1], 4, None, false, &shape).unwrap();
        let derived = DefaultDistributionPolicy
            .for_storage_element_table(&distribution, 16)
            .unwrap();
        let channels: Vec<(i64, i64)> = derived
            .memory_shapes()
            .iter()
            .zip(derived.memory_offsets())
            .map(|(s, o)| (o.raw()[1], s.raw()[1]))
            .collect();
        assert_eq!(channels, vec![(0, 1), (1, 1), (2, 1), (3, 1)]);
        assert_eq!(derived.num_tiles(), Some(&[1, 4, 1, 1][..]));

        let broadcast = DefaultDistributionPolicy
            .for_storage_element_table(&distribution, 64)
            .unwrap();
        assert!(broadcast.memory_shapes().iter().all(|s| s.raw()[1] == 1));
        assert_eq!(broadcast.num_tiles(), Some(&[1, 1, 1, 1][..]));
    }

    #[test]
    fn test_data_windows_follow_se_mapping() {
        let se_attr = SeAttr::padding(PadMode::Constant, [1, 1, 1, 1]).unwrap();
        let data_shape = Shape::from([1, 16, 6, 6]);
        let output = se_attr.infer_output_shape(&data_shape).unwrap();
        let distribution =
            DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, &output).unwrap();
        let derived = DefaultDistributionPolicy
            .for_sparse_data(&distribution, &data_shape, Some(&se_attr))
            .unwrap();
        assert_eq!(derived.memory_shapes(), vec![Shape::from([1, 16, 3, 6]); 2]);
        assert_eq!(derived.memory_offsets()[1], Shape::from([0, 0, 3, 0]));
    }
}
