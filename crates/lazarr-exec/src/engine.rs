//! The materialization driver.
//!
//! `compute` returns a fully resident `NdArray`; `compute_to` streams the
//! result into a destination sink chunk by chunk. Both first splice any
//! reductions into in-memory operands, then walk the output chunk grid.
//! With more than one worker the grid is consumed from a shared cursor;
//! the first failure aborts the walk and the staged destination is
//! discarded.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lazarr_core::buffer::{copy_region, Buffer, Chunk, ChunkData, NdArray};
use lazarr_core::config::EngineConfig;
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;
use lazarr_core::shape::{ChunkGrid, Region};

use lazarr_expr::resolve;
use lazarr_expr::{BoundOperand, Expression, Node};

use lazarr_store::{open_sink, ChunkStore, Destination};

use crate::kernels;
use crate::reduce::splice_reductions;

pub struct Engine {
    config: EngineConfig,
}

/// A graph ready for the chunk walk: reductions spliced, geometry resolved.
struct Prepared {
    node: Node,
    operands: Vec<BoundOperand>,
    metas: Vec<ArrayMeta>,
    shape: Vec<usize>,
    dtype: DType,
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine { config }
    }

    /// Engine configured from `LAZARR_*` environment variables.
    pub fn from_env() -> Engine {
        Engine::new(EngineConfig::from_env())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn prepare(&self, expr: &Expression) -> Result<Prepared> {
        let mut node = expr.node().clone();
        let mut operands = expr.operands().to_vec();
        splice_reductions(&mut node, &mut operands, &self.config)?;
        let metas: Vec<ArrayMeta> = operands.iter().map(|o| o.meta().clone()).collect();
        let (shape, dtype) = resolve::resolve(&node, &metas)?;
        Ok(Prepared {
            node,
            operands,
            metas,
            shape,
            dtype,
        })
    }

    /// Materialize the whole result in memory.
    pub fn compute(&self, expr: &Expression) -> Result<NdArray> {
        let p = self.prepare(expr)?;
        let chunks = resolve::iteration_chunks(&p.metas, &p.shape);
        let grid = ChunkGrid::new(p.shape.clone(), chunks)?;
        tracing::debug!(
            shape = ?p.shape,
            chunks = grid.num_chunks(),
            workers = self.config.workers,
            "computing in-memory result"
        );

        let n: usize = p.shape.iter().product();
        let full = match &p.dtype {
            DType::Struct(defs) => ChunkData::Record(
                defs.iter()
                    .map(|f| Ok((f.name.clone(), Buffer::zeros(&f.dtype, n)?)))
                    .collect::<Result<Vec<_>>>()?,
            ),
            scalar => ChunkData::Cells(Buffer::zeros(scalar, n)?),
        };
        let full = Mutex::new(full);
        let out_shape = p.shape.clone();

        self.walk_chunks(&p, &grid, |_, region, chunk| {
            let mut full = full.lock().expect("result buffer poisoned");
            write_into(&mut full, &out_shape, region, &chunk)
        })?;

        Ok(NdArray {
            shape: p.shape,
            dtype: p.dtype,
            data: full.into_inner().expect("result buffer poisoned"),
        })
    }

    /// Materialize into a destination, returning the finalized store.
    pub fn compute_to(
        &self,
        expr: &Expression,
        dest: &Destination,
    ) -> Result<Arc<dyn ChunkStore>> {
        let p = self.prepare(expr)?;
        let chunks = match &dest.chunks {
            Some(c) => c.clone(),
            None => resolve::iteration_chunks(&p.metas, &p.shape),
        };
        let meta = ArrayMeta::new(p.shape.clone(), p.dtype.clone(), chunks)?;
        let grid = meta.grid()?;
        tracing::info!(
            shape = ?meta.shape,
            chunks = grid.num_chunks(),
            workers = self.config.workers,
            "materializing to destination"
        );

        let sink = Mutex::new(Some(open_sink(dest, meta)?));
        self.walk_chunks(&p, &grid, |linear, _, chunk| {
            let index = grid.chunk_index(linear);
            let mut slot = sink.lock().expect("sink poisoned");
            match slot.as_mut() {
                Some(s) => s.put_chunk(&index, &chunk),
                None => Err(Error::Invariant("sink consumed mid-walk".into())),
            }
        })?;

        let sink = sink
            .into_inner()
            .expect("sink poisoned")
            .ok_or_else(|| Error::Invariant("sink consumed mid-walk".into()))?;
        sink.finalize()
    }

    /// Evaluate a reduction-free expression over one output region.
    ///
    /// This is the streaming entry point row filters build on; full
    /// materialization goes through `compute`/`compute_to`.
    pub fn eval_region(&self, expr: &Expression, region: &Region) -> Result<ChunkData> {
        if expr.node().contains_reduce() {
            return Err(Error::Invariant(
                "region evaluation does not support reductions".into(),
            ));
        }
        let metas: Vec<ArrayMeta> = expr.operands().iter().map(|o| o.meta().clone()).collect();
        kernels::eval(expr.node(), expr.operands(), &metas, region)
    }

    /// Drive the chunk walk, sequentially or from a shared cursor.
    fn walk_chunks<F>(&self, p: &Prepared, grid: &ChunkGrid, emit: F) -> Result<()>
    where
        F: Fn(usize, &Region, Chunk) -> Result<()> + Sync,
    {
        let total = grid.num_chunks();
        let workers = self.config.workers.max(1).min(total.max(1));
        let step = |linear: usize| -> Result<()> {
            let region = grid.chunk_region(&grid.chunk_index(linear));
            let data = kernels::eval(&p.node, &p.operands, &p.metas, &region)?;
            let chunk = Chunk {
                shape: region.shape.clone(),
                data,
            };
            emit(linear, &region, chunk)
        };

        if workers <= 1 {
            for linear in 0..total {
                step(linear)?;
            }
            return Ok(());
        }

        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let failure: Mutex<Option<Error>> = Mutex::new(None);
        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    if abort.load(Ordering::Relaxed) {
                        return;
                    }
                    let linear = cursor.fetch_add(1, Ordering::Relaxed);
                    if linear >= total {
                        return;
                    }
                    if let Err(e) = step(linear) {
                        abort.store(true, Ordering::Relaxed);
                        let mut slot = failure.lock().expect("failure slot poisoned");
                        if slot.is_none() {
                            *slot = Some(e);
                        }
                        return;
                    }
                });
            }
        });
        match failure.into_inner().expect("failure slot poisoned") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Place one finished chunk into the full result buffers.
fn write_into(
    full: &mut ChunkData,
    out_shape: &[usize],
    region: &Region,
    chunk: &Chunk,
) -> Result<()> {
    let zero = vec![0usize; region.shape.len()];
    match (full, &chunk.data) {
        (ChunkData::Cells(dst), ChunkData::Cells(src)) => copy_region(
            src,
            &region.shape,
            &zero,
            dst,
            out_shape,
            &region.start,
            &region.shape,
        ),
        (ChunkData::Record(dst), ChunkData::Record(_)) => {
            for (name, buf) in dst.iter_mut() {
                let src = chunk.data.field(name)?;
                copy_region(
                    src,
                    &region.shape,
                    &zero,
                    buf,
                    out_shape,
                    &region.start,
                    &region.shape,
                )?;
            }
            Ok(())
        }
        _ => Err(Error::Invariant(
            "chunk payload kind does not match result dtype".into(),
        )),
    }
}
