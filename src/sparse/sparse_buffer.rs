// This module implements SparseBufferType, the composite that groups a data buffer with the
// auxiliary buffers describing its sparse encoding: an optional sparsity map (one bit per
// element, or per weight for compressed weights), an optional storage element table (one
// pointer per spatial position and group of seSize channels), a weights flag, an optional
// compression descriptor and an optional storage element mapping that makes the effective
// tensor larger than the stored data.
//
// Every transform is a co-transformation. The effect on the data is back-inferred through
// the mapping when one is present; the auxiliaries are derived with kind-specific rules
// (weights maps follow the output channels only, tables follow the spatial dims and keep
// seSize, compression descriptors are re-sliced on tiles); the result is re-validated
// before it is returned. The shape-changing transforms also exist in an explicit
// distribution form, where a DistributionPolicy derives one descriptor per sub-buffer from
// the descriptor given for the whole composite.

//! Sparse composite buffer type.

use std::fmt;

use crate::core::{
    dims4d, BufferRole, Byte, DimsOrder, ElemType, MemSpace, Shape, Strides, TypeError, TypeResult,
};
use crate::sparse::compression::SparsityCompression;
use crate::sparse::policy::{DefaultDistributionPolicy, DistributionPolicy};
use crate::sparse::se_attr::SeAttr;
use crate::sparse::weights::{
    bits_per_output_channel, check_weights_sparsity_map, weights_sparsity_map_shape,
};
use crate::types::{BufferType, ClusterType, DistributionInfo, NdType, TypeComponents};

/// Data buffer plus the auxiliary buffers of its sparse encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SparseBufferType {
    data: BufferType,
    sparsity_map: Option<BufferType>,
    storage_element_table: Option<BufferType>,
    is_weights: bool,
    sparsity_compression: Option<SparsityCompression>,
    se_attr: Option<SeAttr>,
    output_shape: Shape,
}

/// Step-by-step construction of a [`SparseBufferType`].
#[derive(Debug, Clone)]
pub struct SparseBufferBuilder {
    data: BufferType,
    sparsity_map: Option<BufferType>,
    storage_element_table: Option<BufferType>,
    is_weights: bool,
    sparsity_compression: Option<SparsityCompression>,
    se_attr: Option<SeAttr>,
}

impl SparseBufferBuilder {
    pub fn new(data: impl Into<BufferType>) -> Self {
        Self {
            data: data.into(),
            sparsity_map: None,
            storage_element_table: None,
            is_weights: false,
            sparsity_compression: None,
            se_attr: None,
        }
    }

    pub fn sparsity_map(mut self, map: impl Into<BufferType>) -> Self {
        self.sparsity_map = Some(map.into());
        self
    }

    pub fn storage_element_table(mut self, table: impl Into<BufferType>) -> Self {
        self.storage_element_table = Some(table.into());
        self
    }

    pub fn weights(mut self) -> Self {
        self.is_weights = true;
        self
    }

    pub fn compression(mut self, compression: SparsityCompression) -> Self {
        self.sparsity_compression = Some(compression);
        self
    }

    pub fn se_attr(mut self, se_attr: SeAttr) -> Self {
        self.se_attr = Some(se_attr);
        self
    }

    pub fn build(self) -> TypeResult<SparseBufferType> {
        SparseBufferType::get(
            self.data,
            self.sparsity_map,
            self.storage_element_table,
            self.is_weights,
            self.sparsity_compression,
            self.se_attr,
        )
    }
}

/// A single sub-buffer transform, applied with or without an explicit distribution.
#[derive(Clone, Copy)]
enum BufferOp<'a> {
    ShapeElemType(&'a Shape, ElemType),
    Components(&'a TypeComponents),
    DenseTile(&'a Shape, &'a Shape),
    ViewTile(&'a Shape, &'a Shape, &'a [i64]),
}

impl BufferOp<'_> {
    fn apply(
        self,
        buffer: &BufferType,
        role: BufferRole,
        op: &'static str,
        distribution: Option<&DistributionInfo>,
    ) -> TypeResult<BufferType> {
        let Some(distribution) = distribution else {
            return match self {
                BufferOp::ShapeElemType(shape, elem_type) => {
                    buffer.change_shape_elem_type(shape, elem_type)
                }
                BufferOp::Components(components) => buffer.change_type_components(components),
                BufferOp::DenseTile(offsets, shape) => buffer.extract_dense_tile(offsets, shape),
                BufferOp::ViewTile(offsets, shape, strides) => {
                    buffer.extract_view_tile(offsets, shape, strides)
                }
            };
        };
        let distributed = buffer.require_distributed(op, role)?;
        log::trace!("{op}: {role} takes {} cluster windows", distribution.num_clusters());
        let result = match self {
            BufferOp::ShapeElemType(shape, elem_type) => {
                distributed.change_shape_elem_type_for_explicit_distribution(
                    shape,
                    elem_type,
                    distribution,
                )
            }
            BufferOp::Components(components) => {
                distributed.change_type_components_for_explicit_distribution(
                    components,
                    distribution,
                )
            }
            BufferOp::DenseTile(offsets, shape) => {
                distributed.extract_dense_tile_for_explicit_distribution(
                    offsets,
                    shape,
                    distribution,
                )
            }
            BufferOp::ViewTile(offsets, shape, strides) => {
                distributed.extract_view_tile_for_explicit_distribution(
                    offsets,
                    shape,
                    strides,
                    distribution,
                )
            }
        };
        result.map(BufferType::Distributed)
    }
}

/// Distribution supplied for the whole composite, with the policy that splits it.
#[derive(Clone, Copy)]
struct Explicit<'a> {
    policy: &'a dyn DistributionPolicy,
    distribution: &'a DistributionInfo,
}

impl SparseBufferType {
    /// Build and validate a sparse buffer.
    pub fn get(
        data: BufferType,
        sparsity_map: Option<BufferType>,
        storage_element_table: Option<BufferType>,
        is_weights: bool,
        sparsity_compression: Option<SparsityCompression>,
        se_attr: Option<SeAttr>,
    ) -> TypeResult<Self> {
        if se_attr.is_some() && (is_weights || sparsity_compression.is_some()) {
            return Err(TypeError::SeAttrConflict);
        }
        let output_shape = match &se_attr {
            Some(se_attr) => se_attr.infer_output_shape(&data.shape())?,
            None => data.shape(),
        };
        let value = Self {
            data,
            sparsity_map,
            storage_element_table,
            is_weights,
            sparsity_compression,
            se_attr,
            output_shape,
        };
        value.validate()?;
        Ok(value)
    }

    pub fn builder(data: impl Into<BufferType>) -> SparseBufferBuilder {
        SparseBufferBuilder::new(data)
    }

    fn validate(&self) -> TypeResult<()> {
        let data_distributed = self.data.is_distributed();
        for (role, buffer) in self.auxiliaries() {
            if buffer.is_distributed() != data_distributed {
                return Err(TypeError::DistributionKindMismatch {
                    role,
                    found: buffer.kind_name().to_string(),
                    data_distributed,
                });
            }
        }

        if let Some(map) = &self.sparsity_map {
            if map.element_type() != ElemType::I1 {
                return Err(TypeError::InvalidSparsityMap {
                    reason: format!("element type must be i1, got {}", map.element_type()),
                });
            }
            if self.is_weights {
                check_weights_sparsity_map(&map.shape(), &self.data.shape())?;
            } else if map.shape() != self.output_shape {
                return Err(TypeError::InvalidSparsityMap {
                    reason: format!(
                        "shape {} differs from the data shape {}",
                        map.shape(),
                        self.output_shape
                    ),
                });
            }
        }

        if let Some(table) = &self.storage_element_table {
            self.check_storage_element_table(table)?;
        }

        if let Some(compression) = &self.sparsity_compression {
            compression.check_shape(&self.output_shape)?;
        }
        Ok(())
    }

    fn check_storage_element_table(&self, table: &BufferType) -> TypeResult<()> {
        let data_shape = &self.output_shape;
        let table_shape = table.shape();
        if data_shape.rank() != dims4d::RANK || table_shape.rank() != dims4d::RANK {
            return Err(TypeError::InvalidStorageElementTable {
                reason: format!("data {data_shape} and table {table_shape} must both be rank 4"),
            });
        }
        for dim in [dims4d::act::H, dims4d::act::W] {
            if table_shape[dim] != data_shape[dim] {
                return Err(TypeError::InvalidStorageElementTable {
                    reason: format!(
                        "table {table_shape} does not match the spatial dims of {data_shape}"
                    ),
                });
            }
        }
        let (channels, table_channels) = (data_shape[dims4d::act::C], table_shape[dims4d::act::C]);
        if table_channels < 1 || table_channels > channels || channels % table_channels != 0 {
            return Err(TypeError::InvalidStorageElementTable {
                reason: format!(
                    "{channels} data channels cannot be split into {table_channels} table channels"
                ),
            });
        }
        Ok(())
    }

    fn auxiliaries(&self) -> impl Iterator<Item = (BufferRole, &BufferType)> {
        let map = self.sparsity_map.as_ref().map(|b| (BufferRole::SparsityMap, b));
        let table = self
            .storage_element_table
            .as_ref()
            .map(|b| (BufferRole::StorageElementTable, b));
        map.into_iter().chain(table)
    }

    pub fn data(&self) -> &BufferType {
        &self.data
    }

    pub fn sparsity_map(&self) -> Option<&BufferType> {
        self.sparsity_map.as_ref()
    }

    pub fn storage_element_table(&self) -> Option<&BufferType> {
        self.storage_element_table.as_ref()
    }

    pub fn is_weights(&self) -> bool {
        self.is_weights
    }

    pub fn sparsity_compression(&self) -> Option<&SparsityCompression> {
        self.sparsity_compression.as_ref()
    }

    pub fn se_attr(&self) -> Option<&SeAttr> {
        self.se_attr.as_ref()
    }

    /// Data channels served by one storage element table entry.
    pub fn se_size(&self) -> Option<i64> {
        let table = self.storage_element_table.as_ref()?;
        Some(self.output_shape[dims4d::act::C] / table.shape()[dims4d::act::C])
    }

    /// Replace the storage element table, keeping seSize unless the new table broadcasts.
    pub fn with_storage_element_table(&self, table: impl Into<BufferType>) -> TypeResult<Self> {
        let table = table.into();
        let table_channels = table.shape().get(dims4d::act::C);
        if let (Some(previous), Some(table_channels)) = (self.se_size(), table_channels) {
            let channels = self.output_shape.get(dims4d::act::C).unwrap_or(0);
            let keeps_se_size = table_channels >= 1 && channels / table_channels == previous;
            if table_channels != 1 && !keeps_se_size {
                return Err(TypeError::SeSizeMismatch {
                    op: "with_storage_element_table",
                    expected: previous,
                    found: if table_channels > 0 { channels / table_channels } else { 0 },
                    table_channels,
                });
            }
        }
        Self::get(
            self.data.clone(),
            self.sparsity_map.clone(),
            Some(table),
            self.is_weights,
            self.sparsity_compression.clone(),
            self.se_attr,
        )
    }

    /// True when the data, and so every auxiliary, is distributed.
    pub fn contains_distributed_types(&self) -> bool {
        self.data.is_distributed()
    }

    /// The distributed sub-buffers, data first.
    pub fn distributed_types(&self) -> Vec<&BufferType> {
        std::iter::once(&self.data)
            .chain(self.sparsity_map.as_ref())
            .chain(self.storage_element_table.as_ref())
            .filter(|b| b.is_distributed())
            .collect()
    }

    /// Explicit-distribution transforms using a caller-supplied policy.
    pub fn distributed_with<'a>(
        &'a self,
        policy: &'a dyn DistributionPolicy,
    ) -> ExplicitDistribution<'a> {
        ExplicitDistribution { buffer: self, policy }
    }

    fn rebuild(
        &self,
        data: BufferType,
        sparsity_map: Option<BufferType>,
        storage_element_table: Option<BufferType>,
        sparsity_compression: Option<SparsityCompression>,
        se_attr: Option<SeAttr>,
    ) -> TypeResult<Self> {
        Self::get(
            data,
            sparsity_map,
            storage_element_table,
            self.is_weights,
            sparsity_compression,
            se_attr,
        )
    }

    /// Rebuild with new components, keeping the compression and the mapping.
    fn rebuild_components(
        &self,
        data: BufferType,
        sparsity_map: Option<BufferType>,
        storage_element_table: Option<BufferType>,
    ) -> TypeResult<Self> {
        self.rebuild(
            data,
            sparsity_map,
            storage_element_table,
            self.sparsity_compression.clone(),
            self.se_attr,
        )
    }

    fn log_transform(&self, op: &str, result: &TypeResult<Self>) {
        match result {
            Ok(result) => log::debug!("{op}: {self} -> {result}"),
            Err(e) => log::debug!("{op}: {self} failed: {e}"),
        }
    }

    /// Stored data shape for an effective shape.
    fn input_shape(&self, shape: &Shape) -> TypeResult<Shape> {
        match &self.se_attr {
            Some(se_attr) => se_attr.back_infer_input_shape(shape),
            None => Ok(shape.clone()),
        }
    }

    /// Weights map shape for data of `data_shape`, keeping the per-channel row width.
    fn weights_map_shape(map: &BufferType, data_shape: &Shape) -> TypeResult<Shape> {
        data_shape.check_rank("weights sparsity map", dims4d::RANK)?;
        let bits = bits_per_output_channel(&map.shape())?;
        Ok(weights_sparsity_map_shape(data_shape[dims4d::filter::OC], bits))
    }

    fn new_map_shape(&self, map: &BufferType, shape: &Shape) -> TypeResult<Shape> {
        if self.is_weights {
            Self::weights_map_shape(map, shape)
        } else {
            Ok(shape.clone())
        }
    }

    /// Table window `(offsets, shape)` for an effective tile, keeping seSize.
    fn table_window(
        &self,
        op: &'static str,
        table: &BufferType,
        offsets: Option<&Shape>,
        shape: &Shape,
    ) -> TypeResult<(Shape, Shape)> {
        shape.check_rank(op, dims4d::RANK)?;
        let table_shape = table.shape();
        let table_channels = table_shape[dims4d::act::C];
        let se_size = self.se_size().unwrap_or(0);
        if se_size < 1 {
            return Err(TypeError::InvalidStorageElementTable {
                reason: format!("{table_shape} serves no data channels of {}", self.output_shape),
            });
        }

        let channels = shape[dims4d::act::C];
        let channel_offset = offsets.map_or(0, |o| o[dims4d::act::C]);
        let (new_channels, new_offset) = if table_channels == 1 {
            (1, 0)
        } else if channels % se_size != 0 || channel_offset % se_size != 0 {
            return Err(TypeError::SeSizeMismatch {
                op,
                expected: se_size,
                found: channels / table_channels,
                table_channels,
            });
        } else {
            (channels / se_size, channel_offset / se_size)
        };

        let mut window_offsets = Shape::filled(dims4d::RANK, 0);
        window_offsets[dims4d::act::C] = new_offset;
        let mut window_shape = table_shape;
        window_shape[dims4d::act::C] = new_channels;
        for dim in [dims4d::act::H, dims4d::act::W] {
            window_offsets[dim] = offsets.map_or(0, |o| o[dim]);
            window_shape[dim] = shape[dim];
        }
        Ok((window_offsets, window_shape))
    }

    fn data_distribution(
        &self,
        explicit: Option<Explicit<'_>>,
        data_shape: &Shape,
        se_attr: Option<&SeAttr>,
    ) -> TypeResult<Option<DistributionInfo>> {
        explicit
            .map(|e| e.policy.for_sparse_data(e.distribution, data_shape, se_attr))
            .transpose()
    }

    fn map_distribution(
        &self,
        explicit: Option<Explicit<'_>>,
        map_shape: &Shape,
    ) -> TypeResult<Option<DistributionInfo>> {
        explicit
            .map(|e| e.policy.for_sparsity_map(e.distribution, map_shape, self.is_weights))
            .transpose()
    }

    /// Table descriptor for the effective `shape` served by a table of `table_shape`.
    ///
    /// seSize comes from the new shapes; a broadcast table serves every result channel.
    fn table_distribution(
        &self,
        explicit: Option<Explicit<'_>>,
        shape: &Shape,
        table_shape: &Shape,
    ) -> TypeResult<Option<DistributionInfo>> {
        let Some(e) = explicit else {
            return Ok(None);
        };
        let se_size = shape[dims4d::act::C] / table_shape[dims4d::act::C].max(1);
        e.policy.for_storage_element_table(e.distribution, se_size).map(Some)
    }

    fn require_distributed_data(
        &self,
        op: &'static str,
        explicit: Option<Explicit<'_>>,
    ) -> TypeResult<()> {
        if explicit.is_some() {
            self.data.require_distributed(op, BufferRole::Data)?;
        }
        Ok(())
    }

    fn shape_elem_type_impl(
        &self,
        op: &'static str,
        shape: &Shape,
        elem_type: ElemType,
        explicit: Option<Explicit<'_>>,
    ) -> TypeResult<Self> {
        self.require_distributed_data(op, explicit)?;
        let data_shape = self.input_shape(shape)?;
        let data_distribution =
            self.data_distribution(explicit, &data_shape, self.se_attr.as_ref())?;
        let data = BufferOp::ShapeElemType(&data_shape, elem_type).apply(
            &self.data,
            BufferRole::Data,
            op,
            data_distribution.as_ref(),
        )?;

        let sparsity_map = match &self.sparsity_map {
            Some(map) => {
                let map_shape = self.new_map_shape(map, shape)?;
                let distribution = self.map_distribution(explicit, &map_shape)?;
                let map_op = BufferOp::ShapeElemType(&map_shape, map.element_type());
                Some(map_op.apply(map, BufferRole::SparsityMap, op, distribution.as_ref())?)
            }
            None => None,
        };

        let storage_element_table = match &self.storage_element_table {
            Some(table) => {
                let (_, table_shape) = self.table_window(op, table, None, shape)?;
                let distribution = self.table_distribution(explicit, shape, &table_shape)?;
                let table_op = BufferOp::ShapeElemType(&table_shape, table.element_type());
                Some(table_op.apply(
                    table,
                    BufferRole::StorageElementTable,
                    op,
                    distribution.as_ref(),
                )?)
            }
            None => None,
        };

        self.rebuild_components(data, sparsity_map, storage_element_table)
    }

    fn type_components_impl(
        &self,
        op: &'static str,
        components: &TypeComponents,
        explicit: Option<Explicit<'_>>,
    ) -> TypeResult<Self> {
        self.require_distributed_data(op, explicit)?;
        let shape = components.shape.clone().unwrap_or_else(|| self.shape());
        let dims_order = components.dims_order.unwrap_or_else(|| self.dims_order());
        let mem_space = components.mem_space.unwrap_or_else(|| self.mem_space());

        let data_shape = self.input_shape(&shape)?;
        let data_components = TypeComponents {
            shape: Some(data_shape.clone()),
            ..components.clone()
        };
        let data_distribution =
            self.data_distribution(explicit, &data_shape, self.se_attr.as_ref())?;
        let data = BufferOp::Components(&data_components).apply(
            &self.data,
            BufferRole::Data,
            op,
            data_distribution.as_ref(),
        )?;

        let sparsity_map = match &self.sparsity_map {
            Some(map) => {
                let map_shape = self.new_map_shape(map, &shape)?;
                let mut map_components = TypeComponents::new()
                    .with_mem_space(mem_space)
                    .with_shape(map_shape.clone());
                if !self.is_weights {
                    map_components = map_components.with_dims_order(dims_order);
                }
                let distribution = self.map_distribution(explicit, &map_shape)?;
                let map_op = BufferOp::Components(&map_components);
                Some(map_op.apply(map, BufferRole::SparsityMap, op, distribution.as_ref())?)
            }
            None => None,
        };

        let storage_element_table = match &self.storage_element_table {
            Some(table) => {
                let (_, table_shape) = self.table_window(op, table, None, &shape)?;
                let table_components = TypeComponents::new()
                    .with_shape(table_shape.clone())
                    .with_mem_space(mem_space);
                let distribution = self.table_distribution(explicit, &shape, &table_shape)?;
                let table_op = BufferOp::Components(&table_components);
                Some(table_op.apply(
                    table,
                    BufferRole::StorageElementTable,
                    op,
                    distribution.as_ref(),
                )?)
            }
            None => None,
        };

        self.rebuild_components(data, sparsity_map, storage_element_table)
    }

    fn tile_impl(
        &self,
        op: &'static str,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: Option<&[i64]>,
        explicit: Option<Explicit<'_>>,
    ) -> TypeResult<Self> {
        self.require_distributed_data(op, explicit)?;
        self.output_shape.check_rank(op, offsets.rank())?;
        self.output_shape.check_rank(op, shape.rank())?;
        let strided = elem_strides.is_some_and(|s| s.iter().any(|v| *v != 1));
        if strided && self.se_attr.is_some() {
            return Err(TypeError::StridedViewWithSeAttr);
        }

        let (data_offsets, data_shape, se_attr) = match &self.se_attr {
            Some(se_attr) => {
                let tile = se_attr.extract_tile(offsets, shape, &self.data.shape())?;
                (tile.input_offsets, tile.input_shape, Some(tile.attr))
            }
            None => (offsets.clone(), shape.clone(), None),
        };
        let tile_op = |tile_offsets, tile_shape| match elem_strides {
            Some(strides) => BufferOp::ViewTile(tile_offsets, tile_shape, strides),
            None => BufferOp::DenseTile(tile_offsets, tile_shape),
        };

        let data_distribution = self.data_distribution(explicit, &data_shape, se_attr.as_ref())?;
        let data = tile_op(&data_offsets, &data_shape).apply(
            &self.data,
            BufferRole::Data,
            op,
            data_distribution.as_ref(),
        )?;

        let sparsity_map = match &self.sparsity_map {
            Some(map) => {
                let map_shape = self.new_map_shape(map, shape)?;
                let distribution = self.map_distribution(explicit, &map_shape)?;
                let map_op = if self.is_weights {
                    BufferOp::ShapeElemType(&map_shape, map.element_type())
                } else {
                    tile_op(offsets, shape)
                };
                Some(map_op.apply(map, BufferRole::SparsityMap, op, distribution.as_ref())?)
            }
            None => None,
        };

        let storage_element_table = match &self.storage_element_table {
            Some(table) => {
                let (table_offsets, table_shape) =
                    self.table_window(op, table, Some(offsets), shape)?;
                let distribution = self.table_distribution(explicit, shape, &table_shape)?;
                let table_op = BufferOp::DenseTile(&table_offsets, &table_shape);
                Some(table_op.apply(
                    table,
                    BufferRole::StorageElementTable,
                    op,
                    distribution.as_ref(),
                )?)
            }
            None => None,
        };

        let sparsity_compression = self
            .sparsity_compression
            .as_ref()
            .map(|c| c.tile(offsets, shape))
            .transpose()?;

        self.rebuild(data, sparsity_map, storage_element_table, sparsity_compression, se_attr)
    }
}

impl NdType for SparseBufferType {
    fn shape(&self) -> Shape {
        self.output_shape.clone()
    }

    fn element_type(&self) -> ElemType {
        self.data.element_type()
    }

    fn dims_order(&self) -> DimsOrder {
        self.data.dims_order()
    }

    fn mem_space(&self) -> MemSpace {
        self.data.mem_space()
    }

    fn strides(&self) -> Strides {
        match self.se_attr {
            Some(_) => {
                Strides::compact(&self.output_shape, self.dims_order(), self.elem_type_size())
            }
            None => self.data.strides(),
        }
    }

    fn num_elements(&self) -> i64 {
        match &self.sparsity_compression {
            Some(compression) => compression.total_num_elems(),
            None => self.output_shape.total_size(),
        }
    }

    fn total_alloc_size(&self) -> Byte {
        let mut size = match &self.sparsity_compression {
            Some(compression) => compression.alloc_size(self.element_type()),
            None => self.data.total_alloc_size(),
        };
        for (_, buffer) in self.auxiliaries() {
            size += buffer.total_alloc_size();
        }
        size
    }

    fn compact_alloc_size(&self) -> Byte {
        let mut size = match &self.sparsity_compression {
            Some(compression) => compression.alloc_size(self.element_type()),
            None => self.data.compact_alloc_size(),
        };
        for (_, buffer) in self.auxiliaries() {
            size += buffer.compact_alloc_size();
        }
        size
    }

    fn change_elem_type(&self, elem_type: ElemType) -> TypeResult<Self> {
        let result = self.data.change_elem_type(elem_type).and_then(|data| {
            self.rebuild_components(
                data,
                self.sparsity_map.clone(),
                self.storage_element_table.clone(),
            )
        });
        self.log_transform("change_elem_type", &result);
        result
    }

    fn change_shape_elem_type(&self, shape: &Shape, elem_type: ElemType) -> TypeResult<Self> {
        let result = self.shape_elem_type_impl("change_shape_elem_type", shape, elem_type, None);
        self.log_transform("change_shape_elem_type", &result);
        result
    }

    fn change_dims_order(&self, order: DimsOrder) -> TypeResult<Self> {
        let result = (|| -> TypeResult<Self> {
            let data = self.data.change_dims_order(order)?;
            // A weights map is always laid out per output channel.
            let sparsity_map = match &self.sparsity_map {
                Some(map) if !self.is_weights => Some(map.change_dims_order(order)?),
                other => other.clone(),
            };
            self.rebuild_components(data, sparsity_map, self.storage_element_table.clone())
        })();
        self.log_transform("change_dims_order", &result);
        result
    }

    fn change_mem_space(&self, mem_space: MemSpace) -> TypeResult<Self> {
        let result = (|| -> TypeResult<Self> {
            let data = self.data.change_mem_space(mem_space)?;
            let sparsity_map = self
                .sparsity_map
                .as_ref()
                .map(|m| m.change_mem_space(mem_space))
                .transpose()?;
            let storage_element_table = self
                .storage_element_table
                .as_ref()
                .map(|t| t.change_mem_space(mem_space))
                .transpose()?;
            self.rebuild_components(data, sparsity_map, storage_element_table)
        })();
        self.log_transform("change_mem_space", &result);
        result
    }

    fn change_strides(&self, strides: &Strides) -> TypeResult<Self> {
        let result = (|| -> TypeResult<Self> {
            let data = match self.se_attr {
                Some(_) => {
                    if *strides != self.strides() {
                        return Err(TypeError::NonCompactStridesWithSeAttr {
                            strides: strides.to_string(),
                        });
                    }
                    self.data.clone()
                }
                None => self.data.change_strides(strides)?,
            };
            self.rebuild_components(
                data,
                self.sparsity_map.clone(),
                self.storage_element_table.clone(),
            )
        })();
        self.log_transform("change_strides", &result);
        result
    }

    fn change_type_components(&self, components: &TypeComponents) -> TypeResult<Self> {
        let result = self.type_components_impl("change_type_components", components, None);
        self.log_transform("change_type_components", &result);
        result
    }

    fn extract_dense_tile(&self, offsets: &Shape, shape: &Shape) -> TypeResult<Self> {
        let result = self.tile_impl("extract_dense_tile", offsets, shape, None, None);
        self.log_transform("extract_dense_tile", &result);
        result
    }

    fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
    ) -> TypeResult<Self> {
        let result = self.tile_impl("extract_view_tile", offsets, shape, Some(elem_strides), None);
        self.log_transform("extract_view_tile", &result);
        result
    }

    fn erase_tiled_info(&self) -> TypeResult<Self> {
        let result = (|| -> TypeResult<Self> {
            let data = self.data.erase_tiled_info()?;
            let sparsity_map = self
                .sparsity_map
                .as_ref()
                .map(NdType::erase_tiled_info)
                .transpose()?;
            let storage_element_table = self
                .storage_element_table
                .as_ref()
                .map(NdType::erase_tiled_info)
                .transpose()?;
            self.rebuild_components(data, sparsity_map, storage_element_table)
        })();
        self.log_transform("erase_tiled_info", &result);
        result
    }

    fn pad(&self, pad_before: &Shape, pad_after: &Shape) -> TypeResult<Self> {
        let result = (|| -> TypeResult<Self> {
            let (data, padded) = match &self.se_attr {
                Some(se_attr) => {
                    let padded = self.output_shape.add(pad_before)?.add(pad_after)?;
                    (self.data.change_shape(&se_attr.back_infer_input_shape(&padded)?)?, padded)
                }
                None => {
                    let data = self.data.pad(pad_before, pad_after)?;
                    let padded = data.shape();
                    (data, padded)
                }
            };
            let sparsity_map = match &self.sparsity_map {
                Some(map) => Some(map.change_shape(&self.new_map_shape(map, &padded)?)?),
                None => None,
            };
            let storage_element_table = match &self.storage_element_table {
                Some(table) => {
                    let (_, table_shape) = self.table_window("pad", table, None, &padded)?;
                    Some(table.change_shape(&table_shape)?)
                }
                None => None,
            };
            self.rebuild_components(data, sparsity_map, storage_element_table)
        })();
        self.log_transform("pad", &result);
        result
    }
}

/// Explicit-distribution transforms of a sparse buffer under a given policy.
#[derive(Clone, Copy)]
pub struct ExplicitDistribution<'a> {
    buffer: &'a SparseBufferType,
    policy: &'a dyn DistributionPolicy,
}

impl ExplicitDistribution<'_> {
    fn explicit<'d>(&'d self, distribution: &'d DistributionInfo) -> Option<Explicit<'d>> {
        Some(Explicit {
            policy: self.policy,
            distribution,
        })
    }

    fn logged(
        &self,
        op: &str,
        result: TypeResult<SparseBufferType>,
    ) -> TypeResult<SparseBufferType> {
        self.buffer.log_transform(op, &result);
        result
    }

    pub fn change_shape(
        &self,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<SparseBufferType> {
        self.change_shape_elem_type(shape, self.buffer.element_type(), distribution)
    }

    pub fn change_shape_elem_type(
        &self,
        shape: &Shape,
        elem_type: ElemType,
        distribution: &DistributionInfo,
    ) -> TypeResult<SparseBufferType> {
        const OP: &str = "change_shape_elem_type_for_explicit_distribution";
        let result = self
            .buffer
            .shape_elem_type_impl(OP, shape, elem_type, self.explicit(distribution));
        self.logged(OP, result)
    }

    pub fn change_type_components(
        &self,
        components: &TypeComponents,
        distribution: &DistributionInfo,
    ) -> TypeResult<SparseBufferType> {
        const OP: &str = "change_type_components_for_explicit_distribution";
        let result = self
            .buffer
            .type_components_impl(OP, components, self.explicit(distribution));
        self.logged(OP, result)
    }

    pub fn extract_dense_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<SparseBufferType> {
        const OP: &str = "extract_dense_tile_for_explicit_distribution";
        let result = self
            .buffer
            .tile_impl(OP, offsets, shape, None, self.explicit(distribution));
        self.logged(OP, result)
    }

    pub fn extract_view_tile(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
        distribution: &DistributionInfo,
    ) -> TypeResult<SparseBufferType> {
        const OP: &str = "extract_view_tile_for_explicit_distribution";
        let result = self
            .buffer
            .tile_impl(OP, offsets, shape, Some(elem_strides), self.explicit(distribution));
        self.logged(OP, result)
    }
}

impl fmt::Debug for ExplicitDistribution<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplicitDistribution").field("buffer", self.buffer).finish_non_exhaustive()
    }
}

impl ClusterType for SparseBufferType {
    fn change_shape_elem_type_for_explicit_distribution(
        &self,
        shape: &Shape,
        elem_type: ElemType,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        self.distributed_with(&DefaultDistributionPolicy)
            .change_shape_elem_type(shape, elem_type, distribution)
    }

    fn change_type_components_for_explicit_distribution(
        &self,
        components: &TypeComponents,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        self.distributed_with(&DefaultDistributionPolicy)
            .change_type_components(components, distribution)
    }

    fn extract_dense_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        self.distributed_with(&DefaultDistributionPolicy)
            .extract_dense_tile(offsets, shape, distribution)
    }

    fn extract_view_tile_for_explicit_distribution(
        &self,
        offsets: &Shape,
        shape: &Shape,
        elem_strides: &[i64],
        distribution: &DistributionInfo,
    ) -> TypeResult<Self> {
        self.distributed_with(&DefaultDistributionPolicy)
            .extract_view_tile(offsets, shape, elem_strides, distribution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::se_attr::PadMode;
    use crate::types::MemRefType;

    fn activation(shape: [i64; 4], elem_type: ElemType) -> MemRefType {
        MemRefType::new(Shape::from(shape), elem_type, DimsOrder::NHWC, MemSpace::CMX_NN).unwrap()
    }

    fn sparse_activation() -> SparseBufferType {
        SparseBufferType::builder(activation([1, 32, 8, 8], ElemType::F16))
            .sparsity_map(activation([1, 32, 8, 8], ElemType::I1))
            .storage_element_table(activation([1, 2, 8, 8], ElemType::I32))
            .build()
            .unwrap()
    }

    #[test]
    fn test_alloc_size_sums_components() {
        let buffer = sparse_activation();
        let expected = Byte(32 * 64 * 2) + Byte(32 * 64 / 8) + Byte(2 * 64 * 4);
        assert_eq!(buffer.total_alloc_size(), expected);
        assert_eq!(buffer.compact_alloc_size(), expected);
        assert_eq!(buffer.se_size(), Some(16));
    }

    #[test]
    fn test_channel_tile_shrinks_table() {
        let buffer = sparse_activation();
        let tile = buffer
            .extract_dense_tile(&Shape::from([0, 16, 0, 4]), &Shape::from([1, 16, 8, 4]))
            .unwrap();
        assert_eq!(tile.storage_element_table().unwrap().shape(), Shape::from([1, 1, 8, 4]));
        assert_eq!(tile.se_size(), Some(16));

        let misaligned =
            buffer.extract_dense_tile(&Shape::from([0, 8, 0, 0]), &Shape::from([1, 16, 8, 8]));
        assert!(matches!(misaligned, Err(TypeError::SeSizeMismatch { .. })));
    }

    #[test]
    fn test_padding_mapping_pads_effective_shape() {
        let se_attr = SeAttr::padding(PadMode::Edge, [1, 1, 1, 1]).unwrap();
        let buffer = SparseBufferType::builder(activation([1, 16, 6, 6], ElemType::F16))
            .sparsity_map(activation([1, 16, 8, 8], ElemType::I1))
            .storage_element_table(activation([1, 1, 8, 8], ElemType::I32))
            .se_attr(se_attr)
            .build()
            .unwrap();
        assert_eq!(buffer.shape(), Shape::from([1, 16, 8, 8]));

        let padded = buffer.pad(&Shape::from([0, 0, 1, 0]), &Shape::from([0, 0, 1, 0])).unwrap();
        assert_eq!(padded.shape(), Shape::from([1, 16, 10, 8]));
        assert_eq!(padded.data().shape(), Shape::from([1, 16, 8, 6]));
        assert_eq!(padded.storage_element_table().unwrap().shape(), Shape::from([1, 1, 10, 8]));
    }

    #[test]
    fn test_strides_with_mapping_must_be_compact() {
        let se_attr = SeAttr::upsampling([1, 1], [0, 0, 0, 0]).unwrap();
        let buffer = SparseBufferType::builder(activation([1, 16, 4, 4], ElemType::F16))
            .se_attr(se_attr)
            .build()
            .unwrap();
        assert!(buffer.change_strides(&buffer.strides()).is_ok());

        let mut doubled = buffer.strides().raw().to_vec();
        doubled[0] = doubled[0] * 2;
        let result = buffer.change_strides(&Strides::new(doubled));
        assert!(matches!(result, Err(TypeError::NonCompactStridesWithSeAttr { .. })));

        let view = buffer.extract_view_tile(
            &Shape::from([0, 0, 0, 0]),
            &Shape::from([1, 16, 3, 3]),
            &[1, 1, 2, 2],
        );
        assert!(matches!(view, Err(TypeError::StridedViewWithSeAttr)));
    }

    #[test]
    fn test_explicit_distribution_requires_distributed_data() {
        let buffer = sparse_activation();
        let distribution = DistributionInfo::duplicated(2, &buffer.shape()).unwrap();
        let result = buffer.change_shape_for_explicit_distribution(&buffer.shape(), &distribution);
        assert!(matches!(result, Err(TypeError::NotDistributed { role: BufferRole::Data, .. })));
        assert!(!buffer.contains_distributed_types());
        assert!(buffer.distributed_types().is_empty());
    }
}
