//! Sparsity map geometry for compressed weights.
//!
//! A weights sparsity map holds one bit per weight element, grouped per output
//! channel: `[OC, 1, 1, bitsPerOC]` where every per-channel row is padded to a
//! multiple of 128 bits.

use crate::core::{align_up, dims4d, Shape, TypeError, TypeResult};

pub const WEIGHTS_MAP_ROW_ALIGNMENT_BITS: i64 = 128;

/// Map shape for freshly sparsified weights of `data_shape` (`OIYX`).
pub fn infer_weights_sparsity_map_shape(data_shape: &Shape) -> TypeResult<Shape> {
    data_shape.check_rank("weights sparsity map", dims4d::RANK)?;
    let per_oc = data_shape[dims4d::filter::IC]
        * data_shape[dims4d::filter::KY]
        * data_shape[dims4d::filter::KX];
    Ok(weights_sparsity_map_shape(
        data_shape[dims4d::filter::OC],
        align_up(per_oc, WEIGHTS_MAP_ROW_ALIGNMENT_BITS),
    ))
}

pub fn weights_sparsity_map_shape(output_channels: i64, bits_per_oc: i64) -> Shape {
    Shape::from([output_channels, 1, 1, bits_per_oc])
}

/// Per-channel row width of an existing weights map.
pub fn bits_per_output_channel(map_shape: &Shape) -> TypeResult<i64> {
    let raw = map_shape.raw();
    let [_, 1, 1, bits] = raw else {
        return Err(TypeError::InvalidSparsityMap {
            reason: format!("weights sparsity map must be [OC, 1, 1, bits], got {map_shape}"),
        });
    };
    if *bits <= 0 || bits % WEIGHTS_MAP_ROW_ALIGNMENT_BITS != 0 {
        return Err(TypeError::InvalidSparsityMap {
            reason: format!(
                "{bits} bits per output channel is not a positive multiple of {WEIGHTS_MAP_ROW_ALIGNMENT_BITS}"
            ),
        });
    }
    Ok(*bits)
}

/// Fails unless `map_shape` is a weights map for data of `data_shape`.
pub fn check_weights_sparsity_map(map_shape: &Shape, data_shape: &Shape) -> TypeResult<()> {
    data_shape.check_rank("weights data", dims4d::RANK)?;
    let bits = bits_per_output_channel(map_shape)?;
    let expected = weights_sparsity_map_shape(data_shape[dims4d::filter::OC], bits);
    if *map_shape != expected {
        return Err(TypeError::InvalidSparsityMap {
            reason: format!(
                "weights sparsity map {map_shape} does not match data {data_shape}, expected {expected}"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inferred_rows_are_aligned() {
        let shape = infer_weights_sparsity_map_shape(&Shape::from([32, 16, 3, 3])).unwrap();
        assert_eq!(shape, Shape::from([32, 1, 1, 256]));
        assert_eq!(bits_per_output_channel(&shape).unwrap(), 256);
    }

    #[test]
    fn test_map_depends_on_output_channels_only() {
        let map = Shape::from([16, 1, 1, 128]);
        assert!(check_weights_sparsity_map(&map, &Shape::from([16, 16, 1, 1])).is_ok());
        assert!(check_weights_sparsity_map(&map, &Shape::from([16, 16, 8, 8])).is_ok());
        assert!(check_weights_sparsity_map(&map, &Shape::from([8, 16, 1, 1])).is_err());
        assert!(bits_per_output_channel(&Shape::from([16, 1, 1, 100])).is_err());
    }
}
