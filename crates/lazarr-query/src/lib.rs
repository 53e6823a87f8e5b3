#![forbid(unsafe_code)]
//! lazarr-query: text queries over structured arrays.
//!
//! A query string like `(pressure > 1.5) & (sin(phase) > .5)` compiles to
//! an ordinary expression against the fields of a structured operand.
//! Compilation resolves every identifier and validates every operator, so
//! a bad field name or malformed query fails before any chunk is read.
//! Filtering then streams the source, evaluating the mask chunk by chunk
//! and retaining matching rows in order.

pub mod filter;
pub mod lexer;
pub mod parser;

pub use filter::{filter, filter_field, filter_text};
pub use parser::parse_query;
