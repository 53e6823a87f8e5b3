#![forbid(unsafe_code)]
//! lazarr-store: uniform chunk read/write adapters over heterogeneous
//! backings.
//!
//! Everything above this crate sees two small contracts: `ChunkStore`
//! (read chunk i of an operand) and `ChunkSink` (write chunk i of a
//! result, then finalize). The backing may be an in-process buffer
//! (`mem`), an on-disk container directory (`dir`), or — behind the
//! `s3`/`gcs`/`azure` features — a remote object store (`remote`).

pub mod codec;
pub mod dir;
pub mod format;
pub mod mem;
#[cfg(any(feature = "s3", feature = "gcs", feature = "azure"))]
pub mod remote;
pub mod resolver;
pub mod traits;

pub use codec::{Codec, DEFAULT_ZSTD_LEVEL};
pub use dir::{DirArray, DirSink};
pub use mem::{MemArray, MemSink};
pub use resolver::{open_array, open_sink, Destination};
pub use traits::{ChunkSink, ChunkStore};
