//! Row filtering by boolean mask.
//!
//! The source must be a one-dimensional structured array. Its chunks are
//! streamed in order; for each chunk the mask expression is evaluated
//! over the same region and the rows where it holds are appended to the
//! result. Output order is source order; peak memory is one source chunk
//! plus the survivors.

use std::sync::Arc;

use lazarr_core::buffer::{Buffer, ChunkData, NdArray};
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};

use lazarr_exec::Engine;
use lazarr_expr::Expression;
use lazarr_store::ChunkStore;

use crate::parser::parse_query;

/// Filter the rows of a structured array by a boolean expression.
pub fn filter(
    engine: &Engine,
    store: &Arc<dyn ChunkStore>,
    cond: &Expression,
) -> Result<NdArray> {
    let (defs, rows) = check_source(store)?;
    check_mask(cond, rows)?;

    let mut out: Vec<(String, Buffer)> = defs
        .iter()
        .map(|f| Ok((f.name.clone(), Buffer::zeros(&f.dtype, 0)?)))
        .collect::<Result<Vec<_>>>()?;
    let mut kept = 0usize;

    stream_rows(engine, store, cond, |chunk, mask| {
        for (i, &keep) in mask.iter().enumerate() {
            if !keep {
                continue;
            }
            for (name, dst) in out.iter_mut() {
                dst.push_from(chunk.field(name)?, i)?;
            }
            kept += 1;
        }
        Ok(())
    })?;

    tracing::debug!(rows, kept, "filtered structured array");
    Ok(NdArray {
        shape: vec![kept],
        dtype: store.meta().dtype.clone(),
        data: ChunkData::Record(out),
    })
}

/// Filter, keeping a single field's surviving values.
pub fn filter_field(
    engine: &Engine,
    store: &Arc<dyn ChunkStore>,
    cond: &Expression,
    field: &str,
) -> Result<NdArray> {
    let (_, rows) = check_source(store)?;
    let fdef = store.meta().dtype.field(field)?.clone();
    check_mask(cond, rows)?;

    let mut out = Buffer::zeros(&fdef.dtype, 0)?;
    stream_rows(engine, store, cond, |chunk, mask| {
        let src = chunk.field(field)?;
        for (i, &keep) in mask.iter().enumerate() {
            if keep {
                out.push_from(src, i)?;
            }
        }
        Ok(())
    })?;

    let kept = out.len();
    Ok(NdArray {
        shape: vec![kept],
        dtype: fdef.dtype,
        data: ChunkData::Cells(out),
    })
}

/// Parse `text` against the source's fields, then filter.
pub fn filter_text(
    engine: &Engine,
    store: &Arc<dyn ChunkStore>,
    text: &str,
) -> Result<NdArray> {
    let base = Expression::from_store(Arc::clone(store))?;
    let cond = parse_query(text, &base)?;
    filter(engine, store, &cond)
}

fn check_source(store: &Arc<dyn ChunkStore>) -> Result<(Vec<lazarr_core::dtype::FieldDef>, usize)> {
    let meta = store.meta();
    let DType::Struct(defs) = &meta.dtype else {
        return Err(Error::DType(format!(
            "row filtering requires a structured array, got {}",
            meta.dtype
        )));
    };
    if meta.rank() != 1 {
        return Err(Error::Shape(format!(
            "row filtering requires a one-dimensional array, got shape {:?}",
            meta.shape
        )));
    }
    Ok((defs.clone(), meta.shape[0]))
}

fn check_mask(cond: &Expression, rows: usize) -> Result<()> {
    if cond.dtype() != &DType::Bool {
        return Err(Error::DType(format!(
            "filter condition must be bool, got {}",
            cond.dtype()
        )));
    }
    if cond.shape() != [rows].as_slice() {
        return Err(Error::Shape(format!(
            "filter condition has shape {:?}, source has {rows} rows",
            cond.shape()
        )));
    }
    Ok(())
}

/// Walk source chunks in order, handing each chunk and its mask to `f`.
fn stream_rows(
    engine: &Engine,
    store: &Arc<dyn ChunkStore>,
    cond: &Expression,
    mut f: impl FnMut(&ChunkData, &[bool]) -> Result<()>,
) -> Result<()> {
    let grid = store.meta().grid()?;
    for linear in 0..grid.num_chunks() {
        let index = grid.chunk_index(linear);
        let region = grid.chunk_region(&index);
        let chunk = store.read_chunk(&index)?;
        let mask = engine.eval_region(cond, &region)?;
        let ChunkData::Cells(mask) = mask else {
            return Err(Error::Invariant("mask evaluation produced a record".into()));
        };
        f(&chunk.data, mask.as_bools()?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarr_store::MemArray;

    fn source() -> Arc<dyn ChunkStore> {
        MemArray::from_record(
            vec![5],
            vec![2],
            vec![
                ("a".into(), Buffer::F64(vec![1.0, 5.0, 2.0, 8.0, 3.0])),
                ("b".into(), Buffer::F64(vec![2.0, 2.0, 2.0, 2.0, 2.0])),
                ("n".into(), Buffer::I64(vec![10, 20, 30, 40, 50])),
            ],
        )
        .unwrap() as Arc<dyn ChunkStore>
    }

    #[test]
    fn filter_retains_matching_rows_in_order() {
        let store = source();
        let engine = Engine::default();
        let out = filter_text(&engine, &store, "a > b").unwrap();
        assert_eq!(out.shape, vec![2]);
        assert_eq!(out.field("a").unwrap(), &Buffer::F64(vec![5.0, 8.0]));
        assert_eq!(out.field("n").unwrap(), &Buffer::I64(vec![20, 40]));
    }

    #[test]
    fn compound_condition_with_math() {
        let store = source();
        let engine = Engine::default();
        // sin(20) and sin(40) are the only values above 0.5 here
        let out = filter_text(&engine, &store, "(b >= 2) & (sin(n) > .5)").unwrap();
        assert_eq!(out.field("n").unwrap(), &Buffer::I64(vec![20, 40]));
    }

    #[test]
    fn filter_field_projects_one_column() {
        let store = source();
        let engine = Engine::default();
        let base = Expression::from_store(Arc::clone(&store)).unwrap();
        let cond = parse_query("a < 3", &base).unwrap();
        let out = filter_field(&engine, &store, &cond, "n").unwrap();
        assert_eq!(out.cells().unwrap(), &Buffer::I64(vec![10, 30]));
    }

    #[test]
    fn empty_result_keeps_the_schema() {
        let store = source();
        let engine = Engine::default();
        let out = filter_text(&engine, &store, "a > 100").unwrap();
        assert_eq!(out.shape, vec![0]);
        assert_eq!(out.field("a").unwrap().len(), 0);
    }

    #[test]
    fn bad_field_fails_before_any_read() {
        let store = source();
        let engine = Engine::default();
        assert!(matches!(
            filter_text(&engine, &store, "missing > 1"),
            Err(Error::Name(_))
        ));
    }

    #[test]
    fn non_bool_condition_is_rejected() {
        let store = source();
        let engine = Engine::default();
        let base = Expression::from_store(Arc::clone(&store)).unwrap();
        let cond = base.field("a").unwrap();
        assert!(matches!(
            filter(&engine, &store, &cond),
            Err(Error::DType(_))
        ));
    }
}
