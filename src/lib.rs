#![forbid(unsafe_code)]
//! lazarr: lazy, chunk-wise expression evaluation over chunked
//! N-dimensional arrays that may be larger than memory.
//!
//! Building an expression never reads data; shapes and dtypes are checked
//! immediately against NumPy broadcasting rules. Materialization streams
//! the result one chunk at a time from in-memory, on-disk, or (behind
//! features) object-store operands.
//!
//! ```no_run
//! use lazarr::prelude::*;
//!
//! fn scaled_anomaly(token_a: &str, token_b: &str) -> Result<NdArray, Error> {
//!     let a = Expression::from_token(token_a)?;
//!     let b = Expression::from_token(token_b)?;
//!     let expr = a.sub(b)?.mul(2.5)?;
//!     Engine::from_env().compute(&expr)
//! }
//! ```

pub use lazarr_core::buffer::{Buffer, Chunk, ChunkData, NdArray, Scalar};
pub use lazarr_core::config::EngineConfig;
pub use lazarr_core::dtype::{DType, FieldDef};
pub use lazarr_core::error::Error;
pub use lazarr_core::meta::ArrayMeta;
pub use lazarr_core::shape::Region;

pub use lazarr_exec::Engine;
pub use lazarr_expr::{open_expression, where_, Axes, Expression};
pub use lazarr_query::{filter, filter_field, filter_text, parse_query};
pub use lazarr_store::{
    open_array, ChunkSink, ChunkStore, Codec, Destination, DirArray, MemArray,
};

/// Everything a typical caller needs.
pub mod prelude {
    pub use lazarr_core::buffer::{Buffer, NdArray, Scalar};
    pub use lazarr_core::config::EngineConfig;
    pub use lazarr_core::dtype::DType;
    pub use lazarr_core::error::Error;
    pub use lazarr_exec::Engine;
    pub use lazarr_expr::{open_expression, where_, Axes, Expression};
    pub use lazarr_query::{filter, filter_field, filter_text, parse_query};
    pub use lazarr_store::{open_array, Codec, Destination, MemArray};
}
