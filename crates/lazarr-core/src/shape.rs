//! Shape math: NumPy-style broadcasting, chunk grids, regions, and
//! row-major index arithmetic.
//!
//! A chunk grid partitions an array shape into per-dimension cells of a
//! fixed chunk shape; edge cells are clipped. Grid cells are enumerated
//! row-major (last axis fastest), which fixes the chunk write order for
//! sequential destinations.

use crate::error::{Error, Result};

/// NumPy broadcast of two shapes: align at the trailing dimension; each
/// pair must be equal or contain a 1.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for d in 0..rank {
        let da = if d < a.len() { a[a.len() - 1 - d] } else { 1 };
        let db = if d < b.len() { b[b.len() - 1 - d] } else { 1 };
        out[rank - 1 - d] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(Error::Broadcast(a.to_vec(), b.to_vec()));
        };
    }
    Ok(out)
}

/// Row-major strides (in elements) for a shape. Empty shape → empty strides.
pub fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for d in (0..shape.len().saturating_sub(1)).rev() {
        strides[d] = strides[d + 1] * shape[d + 1].max(1);
    }
    strides
}

/// Linear offset of a multi-index under row-major strides.
pub fn ravel(index: &[usize], strides: &[usize]) -> usize {
    index.iter().zip(strides).map(|(i, s)| i * s).sum()
}

/// A rectangular element region of an array: `start` corner plus `shape`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: Vec<usize>,
    pub shape: Vec<usize>,
}

impl Region {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Chunk layout of one array: its full shape plus its chunk shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkGrid {
    pub shape: Vec<usize>,
    pub chunks: Vec<usize>,
}

impl ChunkGrid {
    pub fn new(shape: Vec<usize>, chunks: Vec<usize>) -> Result<Self> {
        if shape.len() != chunks.len() {
            return Err(Error::Shape(format!(
                "chunk shape {:?} does not match array rank {}",
                chunks,
                shape.len()
            )));
        }
        if chunks.iter().zip(&shape).any(|(&c, &s)| c == 0 && s != 0) {
            return Err(Error::Shape(format!("zero-sized chunk shape {chunks:?}")));
        }
        Ok(Self { shape, chunks })
    }

    /// Cells per dimension (ceil division; clipped edge cells included).
    pub fn grid_dims(&self) -> Vec<usize> {
        self.shape
            .iter()
            .zip(&self.chunks)
            .map(|(&s, &c)| if s == 0 { 0 } else { s.div_ceil(c) })
            .collect()
    }

    pub fn num_chunks(&self) -> usize {
        self.grid_dims().iter().product()
    }

    /// Multi-index of the `linear`-th cell, row-major.
    pub fn chunk_index(&self, linear: usize) -> Vec<usize> {
        let dims = self.grid_dims();
        let strides = row_major_strides(&dims);
        let mut rest = linear;
        let mut idx = vec![0usize; dims.len()];
        for d in 0..dims.len() {
            idx[d] = rest / strides[d];
            rest %= strides[d];
        }
        idx
    }

    /// Element region covered by a grid cell, clipped at the array edge.
    pub fn chunk_region(&self, index: &[usize]) -> Region {
        let start: Vec<usize> = index
            .iter()
            .zip(&self.chunks)
            .map(|(&i, &c)| i * c)
            .collect();
        let shape: Vec<usize> = start
            .iter()
            .zip(&self.chunks)
            .zip(&self.shape)
            .map(|((&s, &c), &full)| c.min(full - s))
            .collect();
        Region { start, shape }
    }
}

/// Default chunk shape for freshly materialized arrays: whole trailing
/// axes, leading axes split until a cell holds at most `budget` elements.
pub fn default_chunk_shape(shape: &[usize], budget: usize) -> Vec<usize> {
    let budget = budget.max(1);
    let mut chunks: Vec<usize> = shape.iter().map(|&s| s.max(1)).collect();
    for d in 0..chunks.len() {
        let tail: usize = chunks[d + 1..].iter().product();
        let elems: usize = chunks[d] * tail;
        if elems <= budget {
            break;
        }
        chunks[d] = (budget / tail.max(1)).clamp(1, chunks[d]);
    }
    chunks
}

/// Visit every position of `shape` row-major, passing the multi-index.
/// The index buffer is reused between calls.
pub fn for_each_index(shape: &[usize], mut f: impl FnMut(&[usize])) {
    if shape.iter().any(|&s| s == 0) {
        return;
    }
    let mut idx = vec![0usize; shape.len()];
    loop {
        f(&idx);
        // odometer increment, last axis fastest
        let mut d = shape.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            idx[d] += 1;
            if idx[d] < shape[d] {
                break;
            }
            idx[d] = 0;
        }
    }
}
