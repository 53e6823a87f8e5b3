//! Persisted array metadata: what any chunk store advertises about the
//! array it backs, and what expression persistence records to validate
//! operand bindings on load.

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::ChunkGrid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub chunks: Vec<usize>,
}

impl ArrayMeta {
    pub fn new(shape: Vec<usize>, dtype: DType, chunks: Vec<usize>) -> Result<Self> {
        if shape.len() != chunks.len() {
            return Err(Error::Shape(format!(
                "chunk shape {:?} does not match array shape {:?}",
                chunks, shape
            )));
        }
        Ok(Self {
            shape,
            dtype,
            chunks,
        })
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn grid(&self) -> Result<ChunkGrid> {
        ChunkGrid::new(self.shape.clone(), self.chunks.clone())
    }

    /// Compare against what a live store currently advertises; an operand
    /// recorded at save time must still match on open.
    pub fn check_matches(&self, live: &ArrayMeta, token: &str) -> Result<()> {
        if self != live {
            return Err(Error::StaleReference(format!(
                "'{token}' changed since the expression was saved \
                 (recorded shape {:?} dtype {} chunks {:?}, found shape {:?} dtype {} chunks {:?})",
                self.shape, self.dtype, self.chunks, live.shape, live.dtype, live.chunks
            )));
        }
        Ok(())
    }
}
