#![forbid(unsafe_code)]
//! lazarr-exec: the chunk-wise evaluation engine.
//!
//! Materialization walks the output space one chunk at a time: for each
//! output region the engine gathers the overlapping pieces of every
//! operand (broadcast-aligned), applies the expression kernels, and hands
//! the finished chunk to the destination sink. Peak memory stays
//! proportional to a chunk, never to the whole array.
//!
//! Reductions are the eager exception: before the chunk walk starts they
//! are evaluated bottom-up and spliced back into the graph as in-memory
//! operands.

pub mod engine;
pub mod gather;
pub mod kernels;
pub mod reduce;

pub use engine::Engine;
