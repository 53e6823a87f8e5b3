//! Broadcast-aligned operand reads.
//!
//! Given an output-space region, gather the operand elements that feed it:
//! map the region through broadcasting onto the operand's own shape, read
//! only the source chunks that overlap, then expand size-1 dimensions so
//! the result matches the region exactly. At most one source chunk is
//! resident at a time on top of the compacted result.

use lazarr_core::buffer::{copy_region, Buffer, ChunkData};
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::shape::{for_each_index, ravel, row_major_strides, Region};

use lazarr_store::ChunkStore;

/// Materialize one operand's contribution to an output region.
///
/// `region` is expressed in output coordinates; its rank may exceed the
/// operand's (missing leading dimensions broadcast).
pub fn gather(store: &dyn ChunkStore, region: &Region) -> Result<ChunkData> {
    let meta = store.meta();
    let src_rank = meta.rank();
    let out_rank = region.shape.len();
    if src_rank > out_rank {
        return Err(Error::Invariant(format!(
            "operand rank {src_rank} exceeds output rank {out_rank}"
        )));
    }
    let offset = out_rank - src_rank;

    // The region mapped onto the operand: size-1 source dimensions pin to
    // index 0 regardless of the output extent.
    let mut src_region = Region {
        start: Vec::with_capacity(src_rank),
        shape: Vec::with_capacity(src_rank),
    };
    for d in 0..src_rank {
        if meta.shape[d] == 1 {
            src_region.start.push(0);
            src_region.shape.push(1);
        } else {
            src_region.start.push(region.start[offset + d]);
            src_region.shape.push(region.shape[offset + d]);
        }
    }

    let compact = read_region(store, &src_region)?;

    // Broadcast-expand: pad leading dims, then widen size-1 dims.
    let mut padded = vec![1usize; offset];
    padded.extend_from_slice(&src_region.shape);
    if padded == region.shape {
        return Ok(compact);
    }
    match compact {
        ChunkData::Cells(b) => Ok(ChunkData::Cells(expand(&b, &padded, &region.shape)?)),
        ChunkData::Record(fields) => {
            let mut out = Vec::with_capacity(fields.len());
            for (name, b) in fields {
                let e = expand(&b, &padded, &region.shape)?;
                out.push((name, e));
            }
            Ok(ChunkData::Record(out))
        }
    }
}

/// Read a rectangular region of an operand into compact row-major buffers,
/// visiting only the chunks that overlap it.
fn read_region(store: &dyn ChunkStore, src_region: &Region) -> Result<ChunkData> {
    let meta = store.meta();
    let grid = meta.grid()?;
    let n = src_region.num_elements();
    let mut data = match &meta.dtype {
        DType::Struct(defs) => ChunkData::Record(
            defs.iter()
                .map(|f| Ok((f.name.clone(), Buffer::zeros(&f.dtype, n)?)))
                .collect::<Result<Vec<_>>>()?,
        ),
        scalar => ChunkData::Cells(Buffer::zeros(scalar, n)?),
    };
    if n == 0 {
        return Ok(data);
    }

    // Grid cells overlapped by the region, per dimension.
    let lo: Vec<usize> = src_region
        .start
        .iter()
        .zip(&meta.chunks)
        .map(|(&s, &c)| s / c)
        .collect();
    let extents: Vec<usize> = (0..src_region.shape.len())
        .map(|d| {
            let last = src_region.start[d] + src_region.shape[d] - 1;
            last / meta.chunks[d] - lo[d] + 1
        })
        .collect();

    let mut result = Ok(());
    for_each_index(&extents, |rel| {
        if result.is_err() {
            return;
        }
        let idx: Vec<usize> = rel.iter().zip(&lo).map(|(&r, &l)| r + l).collect();
        result = copy_chunk_overlap(store, &grid, &idx, src_region, &mut data);
    });
    result?;
    Ok(data)
}

fn copy_chunk_overlap(
    store: &dyn ChunkStore,
    grid: &lazarr_core::shape::ChunkGrid,
    idx: &[usize],
    src_region: &Region,
    data: &mut ChunkData,
) -> Result<()> {
    let chunk_region = grid.chunk_region(idx);
    let chunk = store.read_chunk(idx)?;
    if chunk.shape != chunk_region.shape {
        return Err(Error::Invariant(format!(
            "chunk {idx:?} has shape {:?}, grid expects {:?}",
            chunk.shape, chunk_region.shape
        )));
    }

    let rank = src_region.shape.len();
    let mut inter_start = Vec::with_capacity(rank);
    let mut inter_shape = Vec::with_capacity(rank);
    for d in 0..rank {
        let s = src_region.start[d].max(chunk_region.start[d]);
        let e = (src_region.start[d] + src_region.shape[d])
            .min(chunk_region.start[d] + chunk_region.shape[d]);
        inter_start.push(s);
        inter_shape.push(e.saturating_sub(s));
    }
    let from_chunk: Vec<usize> = inter_start
        .iter()
        .zip(&chunk_region.start)
        .map(|(&i, &c)| i - c)
        .collect();
    let into_region: Vec<usize> = inter_start
        .iter()
        .zip(&src_region.start)
        .map(|(&i, &r)| i - r)
        .collect();

    match (data, &chunk.data) {
        (ChunkData::Cells(dst), ChunkData::Cells(src)) => copy_region(
            src,
            &chunk.shape,
            &from_chunk,
            dst,
            &src_region.shape,
            &into_region,
            &inter_shape,
        ),
        (ChunkData::Record(dst), ChunkData::Record(_)) => {
            for (name, buf) in dst.iter_mut() {
                let src = chunk.data.field(name)?;
                copy_region(
                    src,
                    &chunk.shape,
                    &from_chunk,
                    buf,
                    &src_region.shape,
                    &into_region,
                    &inter_shape,
                )?;
            }
            Ok(())
        }
        _ => Err(Error::Invariant(
            "chunk payload kind does not match array dtype".into(),
        )),
    }
}

/// Expand a compact buffer of shape `padded` (leading 1s allowed) to
/// `out_shape`, repeating along every size-1 dimension.
fn expand(compact: &Buffer, padded: &[usize], out_shape: &[usize]) -> Result<Buffer> {
    let out_n: usize = out_shape.iter().product();
    let mut out = Buffer::zeros(&compact.dtype(), out_n)?;
    if out_n == 0 {
        return Ok(out);
    }
    let mut strides = row_major_strides(padded);
    for d in 0..padded.len() {
        if padded[d] == 1 {
            strides[d] = 0;
        }
    }

    let rank = out_shape.len();
    let run_matches = rank > 0 && padded[rank - 1] == out_shape[rank - 1];
    let mut result = Ok(());
    if run_matches {
        // Innermost dimension is not broadcast: copy whole runs.
        let run = out_shape[rank - 1];
        let mut dst = 0usize;
        for_each_index(&out_shape[..rank - 1], |idx| {
            if result.is_err() {
                return;
            }
            let src = ravel(idx, &strides[..rank - 1]);
            result = out.copy_run(dst, compact, src, run);
            dst += run;
        });
    } else {
        let mut dst = 0usize;
        for_each_index(out_shape, |idx| {
            if result.is_err() {
                return;
            }
            let src = ravel(idx, &strides);
            result = out.set_from(dst, compact, src);
            dst += 1;
        });
    }
    result?;
    Ok(out)
}
