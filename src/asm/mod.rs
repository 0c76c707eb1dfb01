// This module holds the textual assembly form of every buffer type. The printer is a set of
// Display impls and the parser is a single-pass recursive reader over the same grammar, so
// any value printed by one is accepted by the other and parses back to an equal value. The
// sparse buffer form lists its optional fields in a fixed order; the parser rejects fields
// that are repeated or appear out of that order.

//! Text form of buffer types.
//!
//! # Key Components
//!
//! - [`printer`] - `Display` impls producing the canonical form
//! - [`parser`] - `parse_sparse_buffer`, `parse_buffer_type` and `ParseError`

pub mod parser;
pub mod printer;

pub use parser::{
    parse_buffer_type, parse_sparse_buffer, try_parse_sparse_buffer, ParseError, ParseResult,
};
