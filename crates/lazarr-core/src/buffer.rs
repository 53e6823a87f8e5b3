//! Typed element buffers, chunks, scalar constants, and materialized arrays.
//!
//! A `Buffer` is one contiguous, row-major run of elements of a single
//! scalar dtype. A `Chunk` is the unit of I/O and of pipelined evaluation:
//! either plain cells or a record of named field buffers (struct-of-arrays
//! within the chunk).

use serde::{Deserialize, Serialize};

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Scalar constants embedded in expression graphs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    I64(i64),
    F64(f64),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::I64(_) => DType::Int64,
            Scalar::F64(_) => DType::Float64,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => b as u8 as f64,
            Scalar::I64(v) => v as f64,
            Scalar::F64(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Buffer {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($self:expr, $v:ident => $body:expr) => {
        match $self {
            Buffer::Bool($v) => $body,
            Buffer::I8($v) => $body,
            Buffer::I16($v) => $body,
            Buffer::I32($v) => $body,
            Buffer::I64($v) => $body,
            Buffer::F32($v) => $body,
            Buffer::F64($v) => $body,
        }
    };
}

impl Buffer {
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        match self {
            Buffer::Bool(_) => DType::Bool,
            Buffer::I8(_) => DType::Int8,
            Buffer::I16(_) => DType::Int16,
            Buffer::I32(_) => DType::Int32,
            Buffer::I64(_) => DType::Int64,
            Buffer::F32(_) => DType::Float32,
            Buffer::F64(_) => DType::Float64,
        }
    }

    /// Zero-filled buffer of a scalar dtype.
    pub fn zeros(dtype: &DType, len: usize) -> Result<Buffer> {
        Ok(match dtype {
            DType::Bool => Buffer::Bool(vec![false; len]),
            DType::Int8 => Buffer::I8(vec![0; len]),
            DType::Int16 => Buffer::I16(vec![0; len]),
            DType::Int32 => Buffer::I32(vec![0; len]),
            DType::Int64 => Buffer::I64(vec![0; len]),
            DType::Float32 => Buffer::F32(vec![0.0; len]),
            DType::Float64 => Buffer::F64(vec![0.0; len]),
            DType::Struct(_) => {
                return Err(Error::Invariant(
                    "cannot allocate a plain buffer of a structured dtype".into(),
                ))
            }
        })
    }

    /// Buffer filled with one scalar constant, cast to `dtype`.
    pub fn splat(scalar: Scalar, dtype: &DType, len: usize) -> Result<Buffer> {
        let mut b = Buffer::zeros(dtype, len)?;
        match &mut b {
            Buffer::Bool(v) => {
                let x = match scalar {
                    Scalar::Bool(x) => x,
                    Scalar::I64(x) => x != 0,
                    Scalar::F64(x) => x != 0.0,
                };
                v.fill(x);
            }
            Buffer::I8(v) => v.fill(scalar.as_f64() as i8),
            Buffer::I16(v) => v.fill(scalar.as_f64() as i16),
            Buffer::I32(v) => v.fill(scalar.as_f64() as i32),
            Buffer::I64(v) => match scalar {
                Scalar::I64(x) => v.fill(x),
                other => v.fill(other.as_f64() as i64),
            },
            Buffer::F32(v) => v.fill(scalar.as_f64() as f32),
            Buffer::F64(v) => v.fill(scalar.as_f64()),
        }
        Ok(b)
    }

    pub fn get_f64(&self, i: usize) -> f64 {
        match self {
            Buffer::Bool(v) => v[i] as u8 as f64,
            Buffer::I8(v) => v[i] as f64,
            Buffer::I16(v) => v[i] as f64,
            Buffer::I32(v) => v[i] as f64,
            Buffer::I64(v) => v[i] as f64,
            Buffer::F32(v) => v[i] as f64,
            Buffer::F64(v) => v[i],
        }
    }

    pub fn get_i64(&self, i: usize) -> i64 {
        match self {
            Buffer::Bool(v) => v[i] as i64,
            Buffer::I8(v) => v[i] as i64,
            Buffer::I16(v) => v[i] as i64,
            Buffer::I32(v) => v[i] as i64,
            Buffer::I64(v) => v[i],
            Buffer::F32(v) => v[i] as i64,
            Buffer::F64(v) => v[i] as i64,
        }
    }

    pub fn get_bool(&self, i: usize) -> bool {
        match self {
            Buffer::Bool(v) => v[i],
            other => other.get_f64(i) != 0.0,
        }
    }

    pub fn as_bools(&self) -> Result<&[bool]> {
        match self {
            Buffer::Bool(v) => Ok(v),
            other => Err(Error::DType(format!(
                "expected a bool buffer, got {}",
                other.dtype()
            ))),
        }
    }

    /// Cast every element to `dtype`. A no-op clone when dtypes match.
    pub fn cast(&self, dtype: &DType) -> Result<Buffer> {
        if &self.dtype() == dtype {
            return Ok(self.clone());
        }
        let n = self.len();
        let mut out = Buffer::zeros(dtype, n)?;
        match &mut out {
            Buffer::Bool(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_bool(i);
                }
            }
            Buffer::I8(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_i64(i) as i8;
                }
            }
            Buffer::I16(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_i64(i) as i16;
                }
            }
            Buffer::I32(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_i64(i) as i32;
                }
            }
            Buffer::I64(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_i64(i);
                }
            }
            Buffer::F32(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_f64(i) as f32;
                }
            }
            Buffer::F64(v) => {
                for (i, slot) in v.iter_mut().enumerate() {
                    *slot = self.get_f64(i);
                }
            }
        }
        Ok(out)
    }

    /// Append element `i` of `src` (same dtype required).
    pub fn push_from(&mut self, src: &Buffer, i: usize) -> Result<()> {
        match (self, src) {
            (Buffer::Bool(d), Buffer::Bool(s)) => d.push(s[i]),
            (Buffer::I8(d), Buffer::I8(s)) => d.push(s[i]),
            (Buffer::I16(d), Buffer::I16(s)) => d.push(s[i]),
            (Buffer::I32(d), Buffer::I32(s)) => d.push(s[i]),
            (Buffer::I64(d), Buffer::I64(s)) => d.push(s[i]),
            (Buffer::F32(d), Buffer::F32(s)) => d.push(s[i]),
            (Buffer::F64(d), Buffer::F64(s)) => d.push(s[i]),
            (d, s) => {
                return Err(Error::Invariant(format!(
                    "push_from dtype mismatch: {} vs {}",
                    d.dtype(),
                    s.dtype()
                )))
            }
        }
        Ok(())
    }

    /// Copy element `src[si]` into `self[di]` (same dtype required).
    pub fn set_from(&mut self, di: usize, src: &Buffer, si: usize) -> Result<()> {
        match (self, src) {
            (Buffer::Bool(d), Buffer::Bool(s)) => d[di] = s[si],
            (Buffer::I8(d), Buffer::I8(s)) => d[di] = s[si],
            (Buffer::I16(d), Buffer::I16(s)) => d[di] = s[si],
            (Buffer::I32(d), Buffer::I32(s)) => d[di] = s[si],
            (Buffer::I64(d), Buffer::I64(s)) => d[di] = s[si],
            (Buffer::F32(d), Buffer::F32(s)) => d[di] = s[si],
            (Buffer::F64(d), Buffer::F64(s)) => d[di] = s[si],
            (d, s) => {
                return Err(Error::Invariant(format!(
                    "set_from dtype mismatch: {} vs {}",
                    d.dtype(),
                    s.dtype()
                )))
            }
        }
        Ok(())
    }

    /// Copy a contiguous run `src[ss..ss+len]` into `self[ds..]`.
    pub fn copy_run(&mut self, ds: usize, src: &Buffer, ss: usize, len: usize) -> Result<()> {
        match (self, src) {
            (Buffer::Bool(d), Buffer::Bool(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::I8(d), Buffer::I8(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::I16(d), Buffer::I16(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::I32(d), Buffer::I32(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::I64(d), Buffer::I64(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::F32(d), Buffer::F32(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (Buffer::F64(d), Buffer::F64(s)) => d[ds..ds + len].copy_from_slice(&s[ss..ss + len]),
            (d, s) => {
                return Err(Error::Invariant(format!(
                    "copy_run dtype mismatch: {} vs {}",
                    d.dtype(),
                    s.dtype()
                )))
            }
        }
        Ok(())
    }
}

/// Chunk payload: plain cells, or a record of named field buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChunkData {
    Cells(Buffer),
    Record(Vec<(String, Buffer)>),
}

impl ChunkData {
    pub fn num_elements(&self) -> usize {
        match self {
            ChunkData::Cells(b) => b.len(),
            ChunkData::Record(fields) => fields.first().map(|(_, b)| b.len()).unwrap_or(0),
        }
    }

    pub fn field(&self, name: &str) -> Result<&Buffer> {
        match self {
            ChunkData::Record(fields) => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, b)| b)
                .ok_or_else(|| Error::Name(name.to_string())),
            ChunkData::Cells(_) => Err(Error::DType(
                "field access on a non-structured chunk".into(),
            )),
        }
    }
}

/// The unit of I/O and pipelined evaluation. `shape` is the logical shape
/// of this chunk, already clipped at array edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub shape: Vec<usize>,
    pub data: ChunkData,
}

impl Chunk {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }
}

/// A fully materialized array or scalar: the output of a materialization
/// call, and the value an eagerly evaluated reduction is spliced back as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub dtype: DType,
    pub data: ChunkData,
}

impl NdArray {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn cells(&self) -> Result<&Buffer> {
        match &self.data {
            ChunkData::Cells(b) => Ok(b),
            ChunkData::Record(_) => Err(Error::DType(
                "expected a plain array, got a structured one".into(),
            )),
        }
    }

    pub fn field(&self, name: &str) -> Result<&Buffer> {
        self.data.field(name)
    }

    fn scalar_index(&self) -> Result<usize> {
        if self.num_elements() == 1 {
            Ok(0)
        } else {
            Err(Error::Shape(format!(
                "array of shape {:?} is not a scalar",
                self.shape
            )))
        }
    }

    pub fn scalar_f64(&self) -> Result<f64> {
        let i = self.scalar_index()?;
        Ok(self.cells()?.get_f64(i))
    }

    pub fn scalar_i64(&self) -> Result<i64> {
        let i = self.scalar_index()?;
        Ok(self.cells()?.get_i64(i))
    }

    pub fn scalar_bool(&self) -> Result<bool> {
        let i = self.scalar_index()?;
        Ok(self.cells()?.get_bool(i))
    }

    /// Every element widened to f64, row-major. Test/debug helper.
    pub fn to_f64_vec(&self) -> Result<Vec<f64>> {
        let cells = self.cells()?;
        Ok((0..cells.len()).map(|i| cells.get_f64(i)).collect())
    }
}

/// Copy a rectangular region between two row-major buffers.
///
/// `region` gives the per-dimension extent; `src_start`/`dst_start` locate
/// its corner in each buffer's shape. Innermost runs are copied as slices.
pub fn copy_region(
    src: &Buffer,
    src_shape: &[usize],
    src_start: &[usize],
    dst: &mut Buffer,
    dst_shape: &[usize],
    dst_start: &[usize],
    region: &[usize],
) -> Result<()> {
    if region.is_empty() {
        // rank-0 arrays hold exactly one element
        return dst.copy_run(0, src, 0, 1);
    }
    if region.iter().any(|&r| r == 0) {
        return Ok(());
    }
    let src_strides = crate::shape::row_major_strides(src_shape);
    let dst_strides = crate::shape::row_major_strides(dst_shape);
    let run = region[region.len() - 1];
    let outer = &region[..region.len() - 1];

    let mut result = Ok(());
    crate::shape::for_each_index(outer, |idx| {
        if result.is_err() {
            return;
        }
        let mut so = src_start[src_start.len() - 1] * src_strides[src_strides.len() - 1];
        let mut po = dst_start[dst_start.len() - 1] * dst_strides[dst_strides.len() - 1];
        for d in 0..outer.len() {
            so += (src_start[d] + idx[d]) * src_strides[d];
            po += (dst_start[d] + idx[d]) * dst_strides[d];
        }
        result = dst.copy_run(po, src, so, run);
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_region_moves_rectangles() {
        // src is a 3x4 ramp; copy its center 2x2 into a 2x2 dst
        let src = Buffer::I32((0..12).collect());
        let mut dst = Buffer::zeros(&DType::Int32, 4).unwrap();
        copy_region(&src, &[3, 4], &[1, 1], &mut dst, &[2, 2], &[0, 0], &[2, 2]).unwrap();
        assert_eq!(dst, Buffer::I32(vec![5, 6, 9, 10]));
    }

    #[test]
    fn copy_region_rank0() {
        let src = Buffer::F64(vec![7.0]);
        let mut dst = Buffer::zeros(&DType::Float64, 1).unwrap();
        copy_region(&src, &[], &[], &mut dst, &[], &[], &[]).unwrap();
        assert_eq!(dst, Buffer::F64(vec![7.0]));
    }

    #[test]
    fn cast_round_trips_common_dtypes() {
        let b = Buffer::I32(vec![1, -2, 3]);
        let f = b.cast(&DType::Float64).unwrap();
        assert_eq!(f, Buffer::F64(vec![1.0, -2.0, 3.0]));
        let back = f.cast(&DType::Int32).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn splat_respects_dtype() {
        let b = Buffer::splat(Scalar::F64(2.5), &DType::Float32, 3).unwrap();
        assert_eq!(b, Buffer::F32(vec![2.5, 2.5, 2.5]));
        let b = Buffer::splat(Scalar::I64(7), &DType::Int64, 2).unwrap();
        assert_eq!(b, Buffer::I64(vec![7, 7]));
    }

    #[test]
    fn scalar_accessors_require_single_element() {
        let a = NdArray {
            shape: vec![],
            dtype: DType::Float64,
            data: ChunkData::Cells(Buffer::F64(vec![4.0])),
        };
        assert_eq!(a.scalar_f64().unwrap(), 4.0);

        let b = NdArray {
            shape: vec![2],
            dtype: DType::Float64,
            data: ChunkData::Cells(Buffer::F64(vec![1.0, 2.0])),
        };
        assert!(b.scalar_f64().is_err());
    }
}
