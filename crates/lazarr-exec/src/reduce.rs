//! Eager reduction evaluation.
//!
//! Reductions break the chunk-local dataflow of elementwise evaluation,
//! so before the output walk starts every `Reduce` node is evaluated
//! bottom-up: its input is streamed chunk by chunk into typed
//! accumulators, the result is registered as a fresh in-memory operand,
//! and the node is replaced by a reference to it. The surrounding graph
//! then broadcasts the reduced value like any other operand.

use lazarr_core::buffer::{Buffer, ChunkData, NdArray};
use lazarr_core::config::EngineConfig;
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;
use lazarr_core::shape::{default_chunk_shape, for_each_index, row_major_strides, ChunkGrid};

use lazarr_expr::resolve;
use lazarr_expr::{Axes, BoundOperand, Node, ReduceOp};

use lazarr_store::MemArray;

use crate::kernels;

/// Replace every `Reduce` node in the tree with an in-memory operand
/// holding its eagerly computed value. Inner reductions run first, so
/// nested forms like `sum(x - mean(x))` work naturally.
pub fn splice_reductions(
    node: &mut Node,
    operands: &mut Vec<BoundOperand>,
    config: &EngineConfig,
) -> Result<()> {
    match node {
        Node::Operand(_) | Node::Const(_) => Ok(()),
        Node::Unary { input, .. } | Node::Field { input, .. } => {
            splice_reductions(input, operands, config)
        }
        Node::Binary { lhs, rhs, .. } => {
            splice_reductions(lhs, operands, config)?;
            splice_reductions(rhs, operands, config)
        }
        Node::Where { cond, lhs, rhs } => {
            splice_reductions(cond, operands, config)?;
            splice_reductions(lhs, operands, config)?;
            splice_reductions(rhs, operands, config)
        }
        Node::Reduce { .. } => {
            // take ownership of op/axes/input out of the node
            let Node::Reduce { op, axes, input } =
                std::mem::replace(node, Node::Const(lazarr_core::buffer::Scalar::Bool(false)))
            else {
                unreachable!()
            };
            let mut input = *input;
            splice_reductions(&mut input, operands, config)?;

            let nd = evaluate_reduction(op, &axes, &input, operands)?;
            let chunks = default_chunk_shape(&nd.shape, config.chunk_elems_hint);
            let arr = MemArray::from_ndarray(&nd, chunks)?;
            let idx = operands.len();
            operands.push(BoundOperand {
                name: format!("o{idx}"),
                store: arr,
            });
            *node = Node::Operand(idx);
            Ok(())
        }
    }
}

/// Stream the reduction input chunk by chunk and fold into accumulators.
fn evaluate_reduction(
    op: ReduceOp,
    axes: &Axes,
    input: &Node,
    operands: &[BoundOperand],
) -> Result<NdArray> {
    let metas: Vec<ArrayMeta> = operands.iter().map(|o| o.meta().clone()).collect();
    let (in_shape, in_dt) = resolve::resolve(input, &metas)?;
    let out_shape = resolve::reduced_shape(&in_shape, axes)?;
    let out_dt = resolve::reduce_dtype(op, &in_dt);

    let rank = in_shape.len();
    let reduced: Vec<bool> = match axes {
        Axes::All => vec![true; rank],
        Axes::Axes(list) => {
            let mut r = vec![false; rank];
            for &a in list {
                r[a] = true;
            }
            r
        }
    };
    // elements folded into each output slot
    let fold_count: usize = in_shape
        .iter()
        .zip(&reduced)
        .filter(|(_, &r)| r)
        .map(|(&s, _)| s)
        .product();
    if fold_count == 0 && matches!(op, ReduceOp::Min | ReduceOp::Max) {
        return Err(Error::Shape(format!(
            "cannot take {} over zero elements",
            op.symbol()
        )));
    }

    let out_n: usize = out_shape.iter().product();
    let mut acc = Accumulator::new(op, &in_dt, out_n);
    let out_strides = row_major_strides(&out_shape);

    let iter_chunks = resolve::iteration_chunks(&metas, &in_shape);
    let grid = ChunkGrid::new(in_shape.clone(), iter_chunks)?;
    tracing::debug!(
        op = op.symbol(),
        input_shape = ?in_shape,
        chunks = grid.num_chunks(),
        "evaluating reduction"
    );

    for linear in 0..grid.num_chunks() {
        let region = grid.chunk_region(&grid.chunk_index(linear));
        let data = kernels::eval(input, operands, &metas, &region)?;
        let ChunkData::Cells(buf) = data else {
            return Err(Error::DType(
                "cannot reduce a structured array; select a field first".into(),
            ));
        };
        let mut i = 0usize;
        for_each_index(&region.shape, |local| {
            let mut off = 0usize;
            let mut out_d = 0usize;
            for d in 0..rank {
                if !reduced[d] {
                    off += (region.start[d] + local[d]) * out_strides[out_d];
                    out_d += 1;
                }
            }
            acc.fold(off, &buf, i);
            i += 1;
        });
    }

    acc.finish(&out_shape, &out_dt, fold_count)
}

/// Typed reduction state: integers fold in i64, floats in f64, the
/// boolean reductions in bool.
enum Accumulator {
    SumI(Vec<i64>),
    SumF(Vec<f64>),
    Mean(Vec<f64>),
    MinI(Vec<i64>),
    MaxI(Vec<i64>),
    MinF(Vec<f64>),
    MaxF(Vec<f64>),
    Any(Vec<bool>),
    All(Vec<bool>),
}

impl Accumulator {
    fn new(op: ReduceOp, in_dt: &DType, n: usize) -> Accumulator {
        let float = in_dt.is_float();
        match op {
            ReduceOp::Sum if !float => Accumulator::SumI(vec![0; n]),
            ReduceOp::Sum => Accumulator::SumF(vec![0.0; n]),
            ReduceOp::Mean => Accumulator::Mean(vec![0.0; n]),
            ReduceOp::Min if !float => Accumulator::MinI(vec![i64::MAX; n]),
            ReduceOp::Max if !float => Accumulator::MaxI(vec![i64::MIN; n]),
            ReduceOp::Min => Accumulator::MinF(vec![f64::INFINITY; n]),
            ReduceOp::Max => Accumulator::MaxF(vec![f64::NEG_INFINITY; n]),
            ReduceOp::Any => Accumulator::Any(vec![false; n]),
            ReduceOp::All => Accumulator::All(vec![true; n]),
        }
    }

    fn fold(&mut self, off: usize, buf: &Buffer, i: usize) {
        match self {
            Accumulator::SumI(v) => v[off] = v[off].wrapping_add(buf.get_i64(i)),
            Accumulator::SumF(v) | Accumulator::Mean(v) => v[off] += buf.get_f64(i),
            Accumulator::MinI(v) => v[off] = v[off].min(buf.get_i64(i)),
            Accumulator::MaxI(v) => v[off] = v[off].max(buf.get_i64(i)),
            Accumulator::MinF(v) => v[off] = v[off].min(buf.get_f64(i)),
            Accumulator::MaxF(v) => v[off] = v[off].max(buf.get_f64(i)),
            Accumulator::Any(v) => v[off] |= buf.get_bool(i),
            Accumulator::All(v) => v[off] &= buf.get_bool(i),
        }
    }

    fn finish(self, shape: &[usize], out_dt: &DType, fold_count: usize) -> Result<NdArray> {
        let cells = match self {
            Accumulator::SumI(v) => Buffer::I64(v).cast(out_dt)?,
            Accumulator::SumF(v) => Buffer::F64(v).cast(out_dt)?,
            Accumulator::Mean(mut v) => {
                let count = fold_count as f64;
                for slot in &mut v {
                    *slot /= count;
                }
                Buffer::F64(v)
            }
            Accumulator::MinI(v) | Accumulator::MaxI(v) => Buffer::I64(v).cast(out_dt)?,
            Accumulator::MinF(v) | Accumulator::MaxF(v) => Buffer::F64(v).cast(out_dt)?,
            Accumulator::Any(v) | Accumulator::All(v) => Buffer::Bool(v),
        };
        Ok(NdArray {
            shape: shape.to_vec(),
            dtype: out_dt.clone(),
            data: ChunkData::Cells(cells),
        })
    }
}
