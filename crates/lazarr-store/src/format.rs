//! Chunk frame encoding: the byte format shared by the disk and remote
//! containers.
//!
//! Frame = header (magic, kind, rank, dims, codec) + checksum + body
//! length + body. The body holds each buffer as (name for records, dtype
//! tag, element count, raw little-endian payload) and is compressed as a
//! whole. The checksum covers the stored (possibly compressed) body and
//! is verified before decompression.

use lazarr_core::buffer::{Buffer, Chunk, ChunkData};
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::hash::checksum64;

use crate::codec::{self, Codec};

const MAGIC: &[u8; 4] = b"LZC1";

const KIND_CELLS: u8 = 0;
const KIND_RECORD: u8 = 1;

pub fn encode_chunk(chunk: &Chunk, codec: Codec, zstd_level: i32) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    match &chunk.data {
        ChunkData::Cells(buf) => {
            write_buffer(&mut body, None, buf)?;
        }
        ChunkData::Record(fields) => {
            for (name, buf) in fields {
                write_buffer(&mut body, Some(name), buf)?;
            }
        }
    }
    let body = codec::compress(codec, &body, zstd_level)?;

    let (kind, nbuffers) = match &chunk.data {
        ChunkData::Cells(_) => (KIND_CELLS, 1usize),
        ChunkData::Record(fields) => (KIND_RECORD, fields.len()),
    };
    let mut out = Vec::with_capacity(body.len() + 64);
    out.extend_from_slice(MAGIC);
    out.push(kind);
    out.push(chunk.shape.len() as u8);
    for &d in &chunk.shape {
        out.extend_from_slice(&(d as u64).to_le_bytes());
    }
    out.push(codec as u8);
    out.extend_from_slice(&(nbuffers as u16).to_le_bytes());
    out.extend_from_slice(&checksum64(&body).to_le_bytes());
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

pub fn decode_chunk(bytes: &[u8]) -> Result<Chunk> {
    let mut cur = Cursor::new(bytes);
    if cur.take(4)? != MAGIC {
        return Err(Error::Codec("bad chunk magic".into()));
    }
    let kind = cur.u8()?;
    let rank = cur.u8()? as usize;
    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(cur.u64()? as usize);
    }
    let codec = Codec::from_u8(cur.u8()?)?;
    let nbuffers = cur.u16()? as usize;
    let stored_sum = cur.u64()?;
    let body_len = cur.u64()? as usize;
    let body = cur.take(body_len)?;
    if checksum64(body) != stored_sum {
        return Err(Error::Codec("chunk payload checksum mismatch".into()));
    }
    let body = codec::decompress(codec, body)?;
    let mut cur = Cursor::new(&body);

    let data = match kind {
        KIND_CELLS => {
            let (_, buf) = read_buffer(&mut cur, false)?;
            ChunkData::Cells(buf)
        }
        KIND_RECORD => {
            let mut fields = Vec::with_capacity(nbuffers);
            for _ in 0..nbuffers {
                let (name, buf) = read_buffer(&mut cur, true)?;
                fields.push((name.unwrap_or_default(), buf));
            }
            ChunkData::Record(fields)
        }
        other => return Err(Error::Codec(format!("unknown chunk kind {other}"))),
    };
    Ok(Chunk { shape, data })
}

fn write_buffer(out: &mut Vec<u8>, name: Option<&str>, buf: &Buffer) -> Result<()> {
    if let Some(name) = name {
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
    }
    out.push(buf.dtype().code()?);
    out.extend_from_slice(&(buf.len() as u64).to_le_bytes());
    match buf {
        Buffer::Bool(v) => out.extend(v.iter().map(|&b| b as u8)),
        Buffer::I8(v) => out.extend(v.iter().map(|&x| x as u8)),
        Buffer::I16(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::I32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::I64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::F32(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
        Buffer::F64(v) => v.iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
    }
    Ok(())
}

fn read_buffer(cur: &mut Cursor<'_>, named: bool) -> Result<(Option<String>, Buffer)> {
    let name = if named {
        let len = cur.u16()? as usize;
        let raw = cur.take(len)?;
        Some(
            String::from_utf8(raw.to_vec())
                .map_err(|_| Error::Codec("field name is not utf-8".into()))?,
        )
    } else {
        None
    };
    let dtype = DType::from_code(cur.u8()?)?;
    let count = cur.u64()? as usize;
    // the count comes off disk; reject it before it can wrap the product
    let nbytes = count
        .checked_mul(dtype.size_of())
        .ok_or_else(|| Error::Codec(format!("buffer length {count} overflows")))?;
    let payload = cur.take(nbytes)?;
    let buf = match dtype {
        DType::Bool => Buffer::Bool(payload.iter().map(|&b| b != 0).collect()),
        DType::Int8 => Buffer::I8(payload.iter().map(|&b| b as i8).collect()),
        DType::Int16 => Buffer::I16(le_chunks(payload, 2, |c| i16::from_le_bytes([c[0], c[1]]))),
        DType::Int32 => Buffer::I32(le_chunks(payload, 4, |c| {
            i32::from_le_bytes([c[0], c[1], c[2], c[3]])
        })),
        DType::Int64 => Buffer::I64(le_chunks(payload, 8, |c| {
            i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        })),
        DType::Float32 => Buffer::F32(le_chunks(payload, 4, |c| {
            f32::from_le_bytes([c[0], c[1], c[2], c[3]])
        })),
        DType::Float64 => Buffer::F64(le_chunks(payload, 8, |c| {
            f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
        })),
        DType::Struct(_) => return Err(Error::Codec("nested struct buffers".into())),
    };
    Ok((name, buf))
}

fn le_chunks<T>(bytes: &[u8], width: usize, f: impl Fn(&[u8]) -> T) -> Vec<T> {
    bytes.chunks_exact(width).map(f).collect()
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.bytes.len())
            .ok_or_else(|| Error::Codec("truncated chunk frame".into()))?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}
