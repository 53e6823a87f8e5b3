#![forbid(unsafe_code)]
//! lazarr-expr: immutable lazy expression graphs.
//!
//! Applying an operation to an `Expression` builds a new graph node and
//! re-resolves output shape and dtype immediately, so shape and dtype
//! mistakes surface at construction time, long before any chunk is read.
//! Nothing here touches chunk data; the execution engine walks these
//! graphs later.

pub mod expr;
pub mod node;
pub mod persist;
pub mod resolve;

pub use expr::{where_, BoundOperand, Expression};
pub use node::{Axes, BinaryOp, Node, ReduceOp, UnaryOp};
pub use persist::open_expression;
