//! In-memory chunked arrays and the `mem://` token registry.
//!
//! A `MemArray` is immutable once registered; the registry lets an
//! expression rebind to it by token within the same process (tokens are
//! process-local and deliberately not persistable).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;

use lazarr_core::buffer::{copy_region, Buffer, Chunk, ChunkData, NdArray};
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;
use lazarr_core::shape::{ravel, row_major_strides};

use crate::traits::{ChunkSink, ChunkStore};

// Weak entries: the registry only rebinds tokens to arrays that are
// still alive somewhere; it must not keep them alive itself. Dead
// entries are pruned on each registration.
static REGISTRY: Lazy<Mutex<HashMap<String, Weak<MemArray>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_token() -> String {
    format!("mem://a{}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

pub struct MemArray {
    token: String,
    meta: ArrayMeta,
    /// Chunks in row-major grid order.
    chunks: Vec<Chunk>,
}

impl MemArray {
    /// Register pre-split chunks under a fresh `mem://` token.
    pub fn from_parts(meta: ArrayMeta, chunks: Vec<Chunk>) -> Result<Arc<MemArray>> {
        let expected = meta.grid()?.num_chunks();
        if chunks.len() != expected {
            return Err(Error::Invariant(format!(
                "expected {expected} chunks for shape {:?}, got {}",
                meta.shape,
                chunks.len()
            )));
        }
        let arr = Arc::new(MemArray {
            token: next_token(),
            meta,
            chunks,
        });
        let mut registry = REGISTRY.lock().expect("mem registry poisoned");
        registry.retain(|_, w| w.strong_count() > 0);
        registry.insert(arr.token.clone(), Arc::downgrade(&arr));
        Ok(arr)
    }

    /// Split a materialized array into chunks and register it.
    pub fn from_ndarray(nd: &NdArray, chunk_shape: Vec<usize>) -> Result<Arc<MemArray>> {
        let meta = ArrayMeta::new(nd.shape.clone(), nd.dtype.clone(), chunk_shape)?;
        let grid = meta.grid()?;
        let mut chunks = Vec::with_capacity(grid.num_chunks());
        for linear in 0..grid.num_chunks() {
            let region = grid.chunk_region(&grid.chunk_index(linear));
            let zero = vec![0usize; region.shape.len()];
            let data = match &nd.data {
                ChunkData::Cells(full) => {
                    let mut out = Buffer::zeros(&full.dtype(), region.num_elements())?;
                    copy_region(
                        full,
                        &nd.shape,
                        &region.start,
                        &mut out,
                        &region.shape,
                        &zero,
                        &region.shape,
                    )?;
                    ChunkData::Cells(out)
                }
                ChunkData::Record(fields) => {
                    let mut parts = Vec::with_capacity(fields.len());
                    for (name, full) in fields {
                        let mut out = Buffer::zeros(&full.dtype(), region.num_elements())?;
                        copy_region(
                            full,
                            &nd.shape,
                            &region.start,
                            &mut out,
                            &region.shape,
                            &zero,
                            &region.shape,
                        )?;
                        parts.push((name.clone(), out));
                    }
                    ChunkData::Record(parts)
                }
            };
            chunks.push(Chunk {
                shape: region.shape,
                data,
            });
        }
        Self::from_parts(meta, chunks)
    }

    /// Convenience constructor for plain arrays.
    pub fn from_cells(
        shape: Vec<usize>,
        chunk_shape: Vec<usize>,
        cells: Buffer,
    ) -> Result<Arc<MemArray>> {
        let expected: usize = shape.iter().product();
        if cells.len() != expected {
            return Err(Error::Shape(format!(
                "{} elements given for shape {:?}",
                cells.len(),
                shape
            )));
        }
        let nd = NdArray {
            shape,
            dtype: cells.dtype(),
            data: ChunkData::Cells(cells),
        };
        Self::from_ndarray(&nd, chunk_shape)
    }

    /// Convenience constructor for structured arrays.
    pub fn from_record(
        shape: Vec<usize>,
        chunk_shape: Vec<usize>,
        fields: Vec<(String, Buffer)>,
    ) -> Result<Arc<MemArray>> {
        let expected: usize = shape.iter().product();
        let mut defs = Vec::with_capacity(fields.len());
        for (name, buf) in &fields {
            if buf.len() != expected {
                return Err(Error::Shape(format!(
                    "field '{name}' has {} elements for shape {:?}",
                    buf.len(),
                    shape
                )));
            }
            defs.push(lazarr_core::dtype::FieldDef::new(name.clone(), buf.dtype()));
        }
        let nd = NdArray {
            shape,
            dtype: DType::Struct(defs),
            data: ChunkData::Record(fields),
        };
        Self::from_ndarray(&nd, chunk_shape)
    }

    pub fn lookup(token: &str) -> Result<Arc<MemArray>> {
        REGISTRY
            .lock()
            .expect("mem registry poisoned")
            .get(token)
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                Error::StaleReference(format!("no in-memory array registered as '{token}'"))
            })
    }

    /// Reassemble the whole array (bounded use: results and test checks).
    pub fn to_ndarray(&self) -> Result<NdArray> {
        assemble(&self.meta, |linear| Ok(self.chunks[linear].clone()))
    }
}

impl ChunkStore for MemArray {
    fn token(&self) -> &str {
        &self.token
    }

    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn read_chunk(&self, index: &[usize]) -> Result<Chunk> {
        let dims = self.meta.grid()?.grid_dims();
        let strides = row_major_strides(&dims);
        let linear = ravel(index, &strides);
        self.chunks
            .get(linear)
            .cloned()
            .ok_or_else(|| Error::Io(format!("chunk index {index:?} out of range")))
    }
}

/// Assemble a full array from per-chunk reads.
pub(crate) fn assemble(
    meta: &ArrayMeta,
    mut read: impl FnMut(usize) -> Result<Chunk>,
) -> Result<NdArray> {
    let grid = meta.grid()?;
    let n = meta.num_elements();
    let mut data = match &meta.dtype {
        DType::Struct(defs) => ChunkData::Record(
            defs.iter()
                .map(|f| Ok((f.name.clone(), Buffer::zeros(&f.dtype, n)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        scalar => ChunkData::Cells(Buffer::zeros(scalar, n)?),
    };
    for linear in 0..grid.num_chunks() {
        let region = grid.chunk_region(&grid.chunk_index(linear));
        let chunk = read(linear)?;
        let zero = vec![0usize; region.shape.len()];
        match (&mut data, &chunk.data) {
            (ChunkData::Cells(full), ChunkData::Cells(part)) => {
                copy_region(
                    part,
                    &region.shape,
                    &zero,
                    full,
                    &meta.shape,
                    &region.start,
                    &region.shape,
                )?;
            }
            (ChunkData::Record(full), ChunkData::Record(part)) => {
                for (name, dst) in full.iter_mut() {
                    let src = part
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, b)| b)
                        .ok_or_else(|| Error::Name(name.clone()))?;
                    copy_region(
                        src,
                        &region.shape,
                        &zero,
                        dst,
                        &meta.shape,
                        &region.start,
                        &region.shape,
                    )?;
                }
            }
            _ => {
                return Err(Error::Invariant(
                    "chunk payload kind does not match array dtype".into(),
                ))
            }
        }
    }
    Ok(NdArray {
        shape: meta.shape.clone(),
        dtype: meta.dtype.clone(),
        data,
    })
}

/// Sink that accumulates chunks and registers a `MemArray` on finalize.
pub struct MemSink {
    meta: ArrayMeta,
    slots: Vec<Option<Chunk>>,
}

impl MemSink {
    pub fn new(meta: ArrayMeta) -> Result<Self> {
        let n = meta.grid()?.num_chunks();
        Ok(Self {
            meta,
            slots: vec![None; n],
        })
    }
}

impl ChunkSink for MemSink {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn put_chunk(&mut self, index: &[usize], chunk: &Chunk) -> Result<()> {
        let dims = self.meta.grid()?.grid_dims();
        let strides = row_major_strides(&dims);
        let linear = ravel(index, &strides);
        let slot = self
            .slots
            .get_mut(linear)
            .ok_or_else(|| Error::Io(format!("chunk index {index:?} out of range")))?;
        if slot.is_some() {
            return Err(Error::Invariant(format!(
                "chunk slot {index:?} written twice"
            )));
        }
        *slot = Some(chunk.clone());
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<Arc<dyn ChunkStore>> {
        let chunks = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.ok_or_else(|| Error::Invariant(format!("chunk slot {i} never written"))))
            .collect::<Result<Vec<_>>>()?;
        let arr = MemArray::from_parts(self.meta, chunks)?;
        Ok(arr as Arc<dyn ChunkStore>)
    }
}
