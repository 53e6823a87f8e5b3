//! Convenient re-exports for downstream crates.

pub use crate::buffer::{copy_region, Buffer, Chunk, ChunkData, NdArray, Scalar};
pub use crate::config::EngineConfig;
pub use crate::dtype::{promote, DType, FieldDef};
pub use crate::error::{Error, Result};
pub use crate::meta::ArrayMeta;
pub use crate::shape::{
    broadcast_shapes, default_chunk_shape, for_each_index, ravel, row_major_strides, ChunkGrid,
    Region,
};
