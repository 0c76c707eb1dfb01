//! Linear parser for the textual type forms.

use thiserror::Error;

use crate::core::{
    BufferRole, Dim, DimsOrder, ElemType, MemSpace, MemoryKind, Shape, Strides, TypeError,
};
use crate::sparse::{PadMode, SeAttr, SparseBufferType, SparsityCompression};
use crate::types::{
    BufferType, DistributedBufferType, DistributionInfo, DistributionMode, DistributionParts,
    MemRefType,
};

/// Errors raised while reading a type from text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected {expected} at offset {pos}, found {found}")]
    Unexpected { pos: usize, expected: String, found: String },

    #[error("Field '{field}' at offset {pos} is duplicated or out of order")]
    FieldOrder { pos: usize, field: String },

    #[error("Invalid type at offset {pos}: {source}")]
    Invalid {
        pos: usize,
        #[source]
        source: TypeError,
    },

    #[error("Unexpected trailing input at offset {pos}: '{rest}'")]
    Trailing { pos: usize, rest: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse a sparse buffer type, returning `None` when the text is not one.
pub fn parse_sparse_buffer(text: &str) -> Option<SparseBufferType> {
    match try_parse_sparse_buffer(text) {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("failed to parse sparse buffer '{text}': {e}");
            None
        }
    }
}

pub fn try_parse_sparse_buffer(text: &str) -> ParseResult<SparseBufferType> {
    let mut parser = Parser::new(text);
    let value = parser.parse_sparse_buffer()?;
    parser.finish()?;
    Ok(value)
}

/// Parse a `memref<..>` or `!distributed<..>` buffer type.
pub fn parse_buffer_type(text: &str) -> ParseResult<BufferType> {
    let mut parser = Parser::new(text);
    let value = parser.parse_buffer(BufferRole::Data)?;
    parser.finish()?;
    Ok(value)
}

/// Optional sparse buffer fields, in the only order they may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SparseField {
    SparsityMap,
    StorageElementTable,
    IsWeights,
    Compression,
    SeAttr,
}

/// Optional distribution fields, in the only order they may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum DistributionField {
    NumTiles,
    NumClusters,
    Alignment,
    UniformSegments,
    MemoryShapes,
    MemoryOffsets,
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char() {
            if !ch.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    fn found(&self) -> String {
        match self.current_char() {
            Some(ch) => format!("'{ch}'"),
            None => "end of input".to_string(),
        }
    }

    fn unexpected<T>(&self, expected: impl Into<String>) -> ParseResult<T> {
        Err(ParseError::Unexpected {
            pos: self.pos,
            expected: expected.into(),
            found: self.found(),
        })
    }

    fn invalid(&self, source: TypeError) -> ParseError {
        ParseError::Invalid { pos: self.pos, source }
    }

    fn finish(&mut self) -> ParseResult<()> {
        self.skip_whitespace();
        if !self.is_eof() {
            return Err(ParseError::Trailing {
                pos: self.pos,
                rest: self.text[self.pos..].to_string(),
            });
        }
        Ok(())
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> ParseResult<()> {
        if !self.try_read(ch) {
            return self.unexpected(format!("'{ch}'"));
        }
        Ok(())
    }

    fn peek_keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = &self.text[self.pos..];
        rest.starts_with(keyword)
            && !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|ch| ch.is_alphanumeric() || ch == '_')
    }

    fn try_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        if !self.try_keyword(keyword) {
            return self.unexpected(format!("'{keyword}'"));
        }
        Ok(())
    }

    /// `keyword =`
    fn expect_assign(&mut self, keyword: &str) -> ParseResult<()> {
        self.expect_keyword(keyword)?;
        self.expect('=')
    }

    fn read_word(&mut self, extra: &[char]) -> ParseResult<&'a str> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || extra.contains(&ch) {
                self.advance();
            } else {
                break;
            }
        }
        if start == self.pos {
            return self.unexpected("identifier");
        }
        Ok(&self.text[start..self.pos])
    }

    fn read_identifier(&mut self) -> ParseResult<&'a str> {
        self.read_word(&[])
    }

    fn read_integer(&mut self) -> ParseResult<i64> {
        self.skip_whitespace();
        let start = self.pos;
        if self.current_char() == Some('-') {
            self.advance();
        }
        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        let digits = &self.text[start..self.pos];
        match digits.parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.pos = start;
                self.unexpected("integer")
            }
        }
    }

    fn read_int_list(&mut self) -> ParseResult<Vec<i64>> {
        self.expect('[')?;
        let mut values = Vec::new();
        if self.try_read(']') {
            return Ok(values);
        }
        loop {
            values.push(self.read_integer()?);
            if self.try_read(']') {
                return Ok(values);
            }
            self.expect(',')?;
        }
    }

    fn read_fixed_list<const N: usize>(&mut self, what: &str) -> ParseResult<[i64; N]> {
        let start = self.pos;
        let values = self.read_int_list()?;
        values.try_into().map_err(|values: Vec<i64>| ParseError::Unexpected {
            pos: start,
            expected: format!("{N} {what} values"),
            found: format!("{}", values.len()),
        })
    }

    fn read_shape_list(&mut self) -> ParseResult<Vec<Shape>> {
        self.expect('[')?;
        let mut shapes = Vec::new();
        if self.try_read(']') {
            return Ok(shapes);
        }
        loop {
            shapes.push(Shape::new(self.read_int_list()?));
            if self.try_read(']') {
                return Ok(shapes);
            }
            self.expect(',')?;
        }
    }

    fn parse_sparse_buffer(&mut self) -> ParseResult<SparseBufferType> {
        self.try_keyword("!sparse_buffer");
        self.expect('<')?;
        self.expect_assign("data")?;
        let data = self.parse_buffer(BufferRole::Data)?;

        let mut sparsity_map = None;
        let mut storage_element_table = None;
        let mut is_weights = false;
        let mut compression = None;
        let mut se_attr = None;
        let mut last: Option<SparseField> = None;

        while self.try_read(',') {
            self.skip_whitespace();
            let field_pos = self.pos;
            let field = if self.peek_keyword("sparsity_map") {
                SparseField::SparsityMap
            } else if self.peek_keyword("storage_element_table") {
                SparseField::StorageElementTable
            } else if self.peek_keyword("is_weights") {
                SparseField::IsWeights
            } else if self.peek_keyword("#sparsity_compression") {
                SparseField::Compression
            } else if self.peek_keyword("#se_upsampling") || self.peek_keyword("#se_padding") {
                SparseField::SeAttr
            } else {
                return self.unexpected("sparse buffer field");
            };
            if last.is_some_and(|prev| prev >= field) {
                return Err(ParseError::FieldOrder {
                    pos: field_pos,
                    field: format!("{field:?}"),
                });
            }
            last = Some(field);

            match field {
                SparseField::SparsityMap => {
                    self.expect_assign("sparsity_map")?;
                    sparsity_map = Some(self.parse_buffer(BufferRole::SparsityMap)?);
                }
                SparseField::StorageElementTable => {
                    self.expect_assign("storage_element_table")?;
                    let table = self.parse_buffer(BufferRole::StorageElementTable)?;
                    storage_element_table = Some(table);
                }
                SparseField::IsWeights => {
                    self.expect_keyword("is_weights")?;
                    is_weights = true;
                }
                SparseField::Compression => compression = Some(self.parse_compression()?),
                SparseField::SeAttr => se_attr = Some(self.parse_se_attr()?),
            }
        }
        self.expect('>')?;

        SparseBufferType::get(
            data,
            sparsity_map,
            storage_element_table,
            is_weights,
            compression,
            se_attr,
        )
            .map_err(|e| self.invalid(e))
    }

    fn parse_buffer(&mut self, role: BufferRole) -> ParseResult<BufferType> {
        if self.peek_keyword("memref") {
            return Ok(BufferType::MemRef(self.parse_memref()?));
        }
        if self.peek_keyword("!distributed") {
            return Ok(BufferType::Distributed(self.parse_distributed()?));
        }
        let pos = self.pos;
        let found = self.read_word(&['!', '.'])?.to_string();
        Err(ParseError::Invalid {
            pos,
            source: TypeError::InvalidBufferKind { role, found },
        })
    }

    fn parse_memref(&mut self) -> ParseResult<MemRefType> {
        self.expect_keyword("memref")?;
        self.expect('<')?;
        let mut dims = Vec::new();
        while self.current_char().is_some_and(|ch| ch.is_ascii_digit()) {
            dims.push(self.read_integer()?);
            self.expect('x')?;
        }
        let shape = Shape::new(dims);
        let elem_pos = self.pos;
        let elem_name = self.read_identifier()?;
        let Some(elem_type) = ElemType::from_str(elem_name) else {
            self.pos = elem_pos;
            return self.unexpected("element type");
        };

        let mut order = DimsOrder::default_for_rank(shape.rank());
        let mut mem_space = MemSpace::DDR;
        let mut strides = None;
        if self.try_read(',') {
            self.skip_whitespace();
            if self.current_char() == Some('#') {
                order = self.parse_dims_order()?;
                if !self.try_read(',') {
                    return self.finish_memref(shape, elem_type, order, mem_space, strides);
                }
                self.skip_whitespace();
            }
            if matches!(self.current_char(), Some('@' | '[')) {
                mem_space = self.parse_mem_space()?;
                if !self.try_read(',') {
                    return self.finish_memref(shape, elem_type, order, mem_space, strides);
                }
            }
            self.expect_assign("strides")?;
            let elements = self.read_int_list()?;
            let bits = elements.into_iter().map(|s| elem_type.size() * s).collect();
            strides = Some(Strides::new(bits));
        }
        self.finish_memref(shape, elem_type, order, mem_space, strides)
    }

    fn finish_memref(
        &mut self,
        shape: Shape,
        elem_type: ElemType,
        order: DimsOrder,
        mem_space: MemSpace,
        strides: Option<Strides>,
    ) -> ParseResult<MemRefType> {
        self.expect('>')?;
        let mut buffer =
            MemRefType::new(shape, elem_type, order, mem_space).map_err(|e| self.invalid(e))?;
        if let Some(strides) = strides {
            buffer = buffer.with_strides(strides).map_err(|e| self.invalid(e))?;
        }
        Ok(buffer)
    }

    fn parse_dims_order(&mut self) -> ParseResult<DimsOrder> {
        self.expect('#')?;
        let pos = self.pos;
        let name = self.read_identifier()?;
        if name == "order" {
            self.expect('<')?;
            let perm = self.read_int_list()?;
            self.expect('>')?;
            if perm.iter().any(|d| *d < 0) {
                self.pos = pos;
                return self.unexpected("dimension permutation");
            }
            let dims: Vec<Dim> = perm.into_iter().map(|d| Dim(d as usize)).collect();
            return DimsOrder::from_permutation(&dims).map_err(|e| self.invalid(e));
        }
        DimsOrder::from_name(name).map_or_else(
            || {
                self.pos = pos;
                self.unexpected("dims order")
            },
            Ok,
        )
    }

    fn parse_mem_space(&mut self) -> ParseResult<MemSpace> {
        let indexed = self.try_read('[');
        self.expect('@')?;
        let pos = self.pos;
        let name = self.read_identifier()?;
        let Some(kind) = MemoryKind::from_name(name) else {
            self.pos = pos;
            return self.unexpected("memory kind");
        };
        if !indexed {
            return Ok(MemSpace::new(kind));
        }
        self.expect(',')?;
        let index_pos = self.pos;
        let index = self.read_integer()?;
        let Ok(index) = u32::try_from(index) else {
            self.pos = index_pos;
            return self.unexpected("memory space index");
        };
        self.expect(']')?;
        Ok(MemSpace::indexed(kind, index))
    }

    fn parse_distributed(&mut self) -> ParseResult<DistributedBufferType> {
        self.expect_keyword("!distributed")?;
        self.expect('<')?;
        let buffer = self.parse_memref()?;
        self.expect(',')?;
        self.expect('{')?;
        self.expect_assign("mode")?;
        let mode_pos = self.pos;
        let mode_name = self.read_word(&['|'])?;
        let Some(mode) = DistributionMode::from_name(mode_name) else {
            self.pos = mode_pos;
            return self.unexpected("distribution mode");
        };

        let mut parts = DistributionParts {
            mode,
            num_tiles: None,
            num_clusters: 0,
            alignment: None,
            uniform_distributed_segments: false,
            memory_shapes: Vec::new(),
            memory_offsets: Vec::new(),
        };
        let mut last: Option<DistributionField> = None;
        while self.try_read(',') {
            self.skip_whitespace();
            let field_pos = self.pos;
            let name = self.read_identifier()?;
            let field = match name {
                "num_tiles" => DistributionField::NumTiles,
                "num_clusters" => DistributionField::NumClusters,
                "alignment" => DistributionField::Alignment,
                "uniform_distributed_segments" => DistributionField::UniformSegments,
                "memory_shapes" => DistributionField::MemoryShapes,
                "memory_offsets" => DistributionField::MemoryOffsets,
                _ => {
                    self.pos = field_pos;
                    return self.unexpected("distribution field");
                }
            };
            if last.is_some_and(|prev| prev >= field) {
                return Err(ParseError::FieldOrder {
                    pos: field_pos,
                    field: name.to_string(),
                });
            }
            last = Some(field);
            if field != DistributionField::UniformSegments {
                self.expect('=')?;
            }
            match field {
                DistributionField::NumTiles => parts.num_tiles = Some(self.read_int_list()?),
                DistributionField::NumClusters => parts.num_clusters = self.read_integer()?,
                DistributionField::Alignment => parts.alignment = Some(self.read_int_list()?),
                DistributionField::UniformSegments => parts.uniform_distributed_segments = true,
                DistributionField::MemoryShapes => parts.memory_shapes = self.read_shape_list()?,
                DistributionField::MemoryOffsets => parts.memory_offsets = self.read_shape_list()?,
            }
        }
        if last != Some(DistributionField::MemoryOffsets) {
            return self.unexpected("'memory_shapes' and 'memory_offsets'");
        }
        self.expect('}')?;
        self.expect('>')?;

        let distribution = DistributionInfo::explicit(parts).map_err(|e| self.invalid(e))?;
        DistributedBufferType::new(buffer, distribution).map_err(|e| self.invalid(e))
    }

    fn parse_compression(&mut self) -> ParseResult<SparsityCompression> {
        self.expect_keyword("#sparsity_compression")?;
        self.expect('<')?;
        self.expect_assign("axis")?;
        let axis_pos = self.pos;
        let axis = self.read_integer()?;
        let Ok(axis) = usize::try_from(axis) else {
            self.pos = axis_pos;
            return self.unexpected("compression axis");
        };
        self.expect(',')?;
        self.expect_assign("num_elems")?;
        let num_elems = self.read_int_list()?;
        self.expect(',')?;
        self.expect_assign("alignment")?;
        let alignment = self.read_integer()?;
        self.expect('>')?;
        SparsityCompression::new(Dim(axis), num_elems, alignment).map_err(|e| self.invalid(e))
    }

    fn parse_se_attr(&mut self) -> ParseResult<SeAttr> {
        if self.try_keyword("#se_upsampling") {
            self.expect('<')?;
            self.expect_assign("factors")?;
            let factors = self.read_fixed_list::<2>("factor")?;
            self.expect(',')?;
            self.expect_assign("padding")?;
            let padding = self.read_fixed_list::<4>("padding")?;
            self.expect('>')?;
            return SeAttr::upsampling(factors, padding).map_err(|e| self.invalid(e));
        }
        self.expect_keyword("#se_padding")?;
        self.expect('<')?;
        self.expect_assign("mode")?;
        let mode_pos = self.pos;
        let mode_name = self.read_identifier()?;
        let Some(mode) = PadMode::from_name(mode_name) else {
            self.pos = mode_pos;
            return self.unexpected("padding mode");
        };
        self.expect(',')?;
        self.expect_assign("padding")?;
        let padding = self.read_fixed_list::<4>("padding")?;
        self.expect('>')?;
        SeAttr::padding(mode, padding).map_err(|e| self.invalid(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Bit;
    use crate::types::NdType;

    const DENSE_MEMREF: &str = "memref<1x16x8x8xf16, #NHWC, @CMX_NN>";

    #[test]
    fn test_parse_memref() {
        let buffer = parse_buffer_type(DENSE_MEMREF).unwrap();
        assert_eq!(buffer.shape(), Shape::from([1, 16, 8, 8]));
        assert_eq!(buffer.dims_order(), DimsOrder::NHWC);
        assert_eq!(buffer.to_string(), DENSE_MEMREF);
    }

    #[test]
    fn test_defaults_when_layout_omitted() {
        let buffer = parse_buffer_type("memref<4x8xi8>").unwrap();
        assert_eq!(buffer.to_string(), "memref<4x8xi8, #NC, @DDR>");
    }

    #[test]
    fn test_sparse_prefix_is_optional() {
        let text = format!(
            "<data={DENSE_MEMREF}, sparsity_map=memref<1x16x8x8xi1, #NHWC, @CMX_NN>>"
        );
        let parsed = try_parse_sparse_buffer(&text).unwrap();
        assert_eq!(parse_sparse_buffer(&parsed.to_string()), Some(parsed));
    }

    #[test]
    fn test_out_of_order_fields_rejected() {
        let text = format!(
            "!sparse_buffer<data={DENSE_MEMREF}, \
             storage_element_table=memref<1x1x8x8xi32, #NHWC, @CMX_NN>, \
             sparsity_map=memref<1x16x8x8xi1, #NHWC, @CMX_NN>>"
        );
        assert!(matches!(try_parse_sparse_buffer(&text), Err(ParseError::FieldOrder { .. })));
        assert!(parse_sparse_buffer(&text).is_none());
    }

    #[test]
    fn test_non_buffer_component_rejected() {
        let text = "!sparse_buffer<data=tensor<1x16x8x8xf16>>";
        let err = try_parse_sparse_buffer(text).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Invalid {
                source: TypeError::InvalidBufferKind {
                    role: BufferRole::Data,
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_trailing_input_rejected() {
        let result = parse_buffer_type("memref<4xf16, #C, @DDR> extra");
        assert!(matches!(result, Err(ParseError::Trailing { .. })));
    }

    #[test]
    fn test_strides_are_elementwise() {
        let text = "memref<1x16x4x4xf16, #NHWC, @CMX_NN, strides = [2048, 1, 256, 16]>";
        let buffer = parse_buffer_type(text).unwrap();
        assert_eq!(buffer.strides().raw()[0], Bit(2048 * 16));
    }
}
