//! Sparse buffers whose components are spread over compute clusters.

use std::cell::RefCell;

use sparse_buffer::core::{
    dims4d, BufferRole, Byte, DimsOrder, ElemType, MemSpace, Shape, TypeError, TypeResult,
};
use sparse_buffer::sparse::{
    DefaultDistributionPolicy, DistributionPolicy, PadMode, SeAttr, SparseBufferType,
    SparsityCompression,
};
use sparse_buffer::types::{
    BufferType, ClusterType, DistributedBufferType, DistributionInfo, MemRefType, NdType,
};

fn distributed(
    shape: [i64; 4],
    elem_type: ElemType,
    order: DimsOrder,
    distribution: impl Fn(&Shape) -> DistributionInfo,
) -> DistributedBufferType {
    let shape = Shape::from(shape);
    let buffer = MemRefType::new(shape.clone(), elem_type, order, MemSpace::CMX_NN).unwrap();
    DistributedBufferType::new(buffer, distribution(&shape)).unwrap()
}

fn nhwc(
    shape: [i64; 4],
    elem_type: ElemType,
    distribution: impl Fn(&Shape) -> DistributionInfo,
) -> DistributedBufferType {
    distributed(shape, elem_type, DimsOrder::NHWC, distribution)
}

fn split_height(shape: &Shape) -> DistributionInfo {
    DistributionInfo::segmented(vec![1, 1, 2, 1], 2, None, false, shape).unwrap()
}

fn split_channels(shape: &Shape) -> DistributionInfo {
    DistributionInfo::segmented(vec![1, 2, 1, 1], 2, None, false, shape).unwrap()
}

fn split_output_channels(shape: &Shape) -> DistributionInfo {
    DistributionInfo::segmented(vec![2, 1, 1, 1], 2, Some(vec![16, 1, 1, 1]), false, shape).unwrap()
}

/// Activations `[1, 32, 8, 8]` split over height, seSize 16.
fn activation() -> SparseBufferType {
    SparseBufferType::builder(nhwc([1, 32, 8, 8], ElemType::F16, split_height))
        .sparsity_map(nhwc([1, 32, 8, 8], ElemType::I1, split_height))
        .storage_element_table(nhwc([1, 2, 8, 8], ElemType::I32, split_height))
        .build()
        .unwrap()
}

fn distribution_of(buffer: Option<&BufferType>) -> &DistributionInfo {
    buffer.and_then(BufferType::distribution).unwrap()
}

#[test]
fn test_implicit_transforms_redistribute() {
    let _ = env_logger::builder().is_test(true).try_init();

    let buffer = activation();
    assert!(buffer.contains_distributed_types());
    assert_eq!(buffer.distributed_types().len(), 3);

    let tile = buffer
        .extract_dense_tile(&Shape::from([0, 0, 0, 0]), &Shape::from([1, 32, 4, 8]))
        .unwrap();
    assert_eq!(
        distribution_of(Some(tile.data())).memory_shapes(),
        vec![Shape::from([1, 32, 2, 8]); 2]
    );
    assert_eq!(
        distribution_of(tile.storage_element_table()).memory_shapes(),
        vec![Shape::from([1, 2, 2, 8]); 2]
    );
}

#[test]
fn test_explicit_tile_scales_table_windows() {
    let _ = env_logger::builder().is_test(true).try_init();

    let buffer = activation();
    let tile_shape = Shape::from([1, 16, 8, 8]);
    let distribution = split_height(&tile_shape);
    let tile = buffer
        .extract_dense_tile_for_explicit_distribution(
            &Shape::from([0, 16, 0, 0]),
            &tile_shape,
            &distribution,
        )
        .unwrap();

    assert_eq!(distribution_of(Some(tile.data())), &distribution);
    assert_eq!(distribution_of(tile.sparsity_map()), &distribution);
    let table = distribution_of(tile.storage_element_table());
    assert_eq!(table.memory_shapes(), vec![Shape::from([1, 1, 4, 8]); 2]);
    assert_eq!(table.memory_offsets()[1], Shape::from([0, 0, 4, 0]));
    assert_eq!(table.num_tiles(), Some(&[1, 1, 2, 1][..]));
    assert_eq!(tile.se_size(), Some(16));
}

#[test]
fn test_broadcast_table_under_channel_split() {
    let _ = env_logger::builder().is_test(true).try_init();

    let table = nhwc([1, 1, 8, 8], ElemType::I32, |shape| {
        DistributionInfo::duplicated(2, shape).unwrap()
    });
    let buffer = SparseBufferType::builder(nhwc([1, 32, 8, 8], ElemType::F16, split_channels))
        .storage_element_table(table)
        .build()
        .unwrap();
    assert_eq!(buffer.se_size(), Some(32));

    let shape = Shape::from([1, 64, 8, 8]);
    let grown = buffer
        .change_shape_for_explicit_distribution(&shape, &split_channels(&shape))
        .unwrap();
    assert_eq!(grown.se_size(), Some(64));
    let table = distribution_of(grown.storage_element_table());
    assert_eq!(table.memory_shapes(), vec![Shape::from([1, 1, 8, 8]); 2]);
    assert!(table.memory_offsets().iter().all(|o| *o == Shape::from([0, 0, 0, 0])));
    assert_eq!(table.num_tiles(), Some(&[1, 1, 1, 1][..]));

    let tile_shape = Shape::from([1, 16, 8, 8]);
    let tile = buffer
        .extract_dense_tile_for_explicit_distribution(
            &Shape::from([0, 16, 0, 0]),
            &tile_shape,
            &split_channels(&tile_shape),
        )
        .unwrap();
    assert_eq!(tile.se_size(), Some(16));
    assert_eq!(
        distribution_of(tile.storage_element_table()).memory_shapes(),
        vec![Shape::from([1, 1, 8, 8]); 2]
    );
}

#[test]
fn test_explicit_reshape_through_padding_mapping() {
    let se_attr = SeAttr::padding(PadMode::Constant, [1, 1, 1, 1]).unwrap();
    let buffer = SparseBufferType::builder(nhwc([1, 16, 6, 6], ElemType::F16, split_height))
        .sparsity_map(nhwc([1, 16, 8, 8], ElemType::I1, split_height))
        .storage_element_table(nhwc([1, 1, 8, 8], ElemType::I32, split_height))
        .se_attr(se_attr)
        .build()
        .unwrap();

    let distribution = split_height(&buffer.shape());
    let result = buffer
        .change_shape_for_explicit_distribution(&buffer.shape(), &distribution)
        .unwrap();

    let data = distribution_of(Some(result.data()));
    assert_eq!(data.memory_shapes(), vec![Shape::from([1, 16, 3, 6]); 2]);
    assert_eq!(data.memory_offsets()[1], Shape::from([0, 0, 3, 0]));
    assert_eq!(distribution_of(result.sparsity_map()), &distribution);
    assert_eq!(
        distribution_of(result.storage_element_table()).memory_shapes(),
        vec![Shape::from([1, 1, 4, 8]); 2]
    );
}

#[test]
fn test_explicit_weights_map_splits_output_channels() {
    let data = distributed([32, 16, 3, 3], ElemType::F16, DimsOrder::OIYX, split_output_channels);
    let map = distributed([32, 1, 1, 256], ElemType::I1, DimsOrder::NCHW, split_output_channels);
    let compression = SparsityCompression::new(dims4d::filter::OC, vec![100; 32], 16).unwrap();
    let buffer = SparseBufferType::builder(data)
        .sparsity_map(map)
        .weights()
        .compression(compression)
        .build()
        .unwrap();

    let tile_shape = Shape::from([16, 16, 3, 3]);
    let distribution =
        DistributionInfo::segmented(vec![2, 1, 1, 1], 2, None, false, &tile_shape).unwrap();
    let tile = buffer
        .extract_dense_tile_for_explicit_distribution(
            &Shape::from([16, 0, 0, 0]),
            &tile_shape,
            &distribution,
        )
        .unwrap();

    let map = distribution_of(tile.sparsity_map());
    assert_eq!(map.num_tiles(), Some(&[2, 1, 1, 1][..]));
    assert_eq!(map.memory_shapes(), vec![Shape::from([8, 1, 1, 256]); 2]);
    assert_eq!(map.memory_offsets()[1], Shape::from([8, 0, 0, 0]));
    assert_eq!(tile.sparsity_compression().unwrap().num_elems().len(), 16);

    // 16 slices of 200 bytes aligned to 208, plus the largest map window.
    assert_eq!(tile.total_alloc_size(), Byte(16 * 208) + Byte(8 * 256 / 8));
}

#[test]
fn test_allocation_uses_largest_cluster_window() {
    let buffer = activation();
    let data = Byte(32 * 4 * 8 * 2);
    let map = Byte(32 * 4 * 8 / 8);
    let table = Byte(2 * 4 * 8 * 4);
    assert_eq!(buffer.total_alloc_size(), data + map + table);
}

#[test]
fn test_component_kinds_must_agree() {
    let data = nhwc([1, 16, 4, 4], ElemType::F16, split_height);
    let map_shape = Shape::from([1, 16, 4, 4]);
    let map = MemRefType::new(map_shape, ElemType::I1, DimsOrder::NHWC, MemSpace::CMX_NN).unwrap();
    let result = SparseBufferType::builder(data).sparsity_map(map).build();
    assert!(matches!(
        result,
        Err(TypeError::DistributionKindMismatch {
            role: BufferRole::SparsityMap,
            data_distributed: true,
            ..
        })
    ));
}

/// Delegates to the default rules and records which components were derived.
#[derive(Default)]
struct RecordingPolicy {
    calls: RefCell<Vec<BufferRole>>,
}

impl DistributionPolicy for RecordingPolicy {
    fn for_sparse_data(
        &self,
        distribution: &DistributionInfo,
        data_shape: &Shape,
        se_attr: Option<&SeAttr>,
    ) -> TypeResult<DistributionInfo> {
        self.calls.borrow_mut().push(BufferRole::Data);
        DefaultDistributionPolicy.for_sparse_data(distribution, data_shape, se_attr)
    }

    fn for_sparsity_map(
        &self,
        distribution: &DistributionInfo,
        map_shape: &Shape,
        is_weights: bool,
    ) -> TypeResult<DistributionInfo> {
        self.calls.borrow_mut().push(BufferRole::SparsityMap);
        DefaultDistributionPolicy.for_sparsity_map(distribution, map_shape, is_weights)
    }

    fn for_storage_element_table(
        &self,
        distribution: &DistributionInfo,
        se_size: i64,
    ) -> TypeResult<DistributionInfo> {
        self.calls.borrow_mut().push(BufferRole::StorageElementTable);
        assert_eq!(se_size, 16);
        DefaultDistributionPolicy.for_storage_element_table(distribution, se_size)
    }
}

#[test]
fn test_custom_policy_derives_every_component() {
    let buffer = activation();
    let policy = RecordingPolicy::default();
    let shape = Shape::from([1, 32, 4, 16]);
    let distribution = split_height(&shape);

    let result = buffer.distributed_with(&policy).change_shape(&shape, &distribution).unwrap();
    assert_eq!(result.storage_element_table().unwrap().shape(), Shape::from([1, 2, 4, 16]));
    assert_eq!(
        policy.calls.into_inner(),
        vec![BufferRole::Data, BufferRole::SparsityMap, BufferRole::StorageElementTable]
    );
}
