//! The two adapter contracts everything above this crate is written
//! against.
//!
//! Invariants:
//! - `read_chunk` never mutates the backing array; operand stores are
//!   read-only for the whole materialization that references them.
//! - A sink's chunk slots are written at most once each; writers for
//!   distinct slots may run on different threads, serialized by the
//!   caller.
//! - Dropping a sink without `finalize` discards all partial state.

use std::sync::Arc;

use lazarr_core::buffer::Chunk;
use lazarr_core::error::Result;
use lazarr_core::meta::ArrayMeta;

/// Read side: "give me chunk i of this array".
pub trait ChunkStore: Send + Sync {
    /// Stable identity token (`mem://…`, a filesystem path, or a URL).
    fn token(&self) -> &str;

    fn meta(&self) -> &ArrayMeta;

    /// Read one chunk by grid index. Edge chunks come back clipped.
    fn read_chunk(&self, index: &[usize]) -> Result<Chunk>;
}

/// Write side: "here is chunk i of the result".
pub trait ChunkSink: Send {
    fn meta(&self) -> &ArrayMeta;

    fn put_chunk(&mut self, index: &[usize], chunk: &Chunk) -> Result<()>;

    /// Commit the destination and reopen it as a readable store.
    fn finalize(self: Box<Self>) -> Result<Arc<dyn ChunkStore>>;
}
