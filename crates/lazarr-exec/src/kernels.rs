//! Per-chunk evaluation kernels.
//!
//! `eval` walks the node tree bottom-up over one output region. Children
//! are evaluated to buffers of the region's element count (operands arrive
//! already broadcast by the gather layer), then combined elementwise.
//! Integer arithmetic runs in wrapping i64 and narrows to the result
//! dtype; float arithmetic runs in f64 and narrows likewise, so kernel
//! results always agree with the dtypes the resolver promised.

use lazarr_core::buffer::{Buffer, ChunkData};
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;
use lazarr_core::shape::Region;

use lazarr_expr::resolve;
use lazarr_expr::{BinaryOp, BoundOperand, Node, UnaryOp};

use crate::gather::gather;

/// Evaluate `node` over one output region.
pub fn eval(
    node: &Node,
    operands: &[BoundOperand],
    metas: &[ArrayMeta],
    region: &Region,
) -> Result<ChunkData> {
    let n = region.num_elements();
    match node {
        Node::Operand(i) => {
            let op = operands
                .get(*i)
                .ok_or_else(|| Error::Invariant(format!("operand index {i} out of table range")))?;
            gather(op.store.as_ref(), region)
        }
        Node::Const(s) => Ok(ChunkData::Cells(Buffer::splat(*s, &s.dtype(), n)?)),
        Node::Field { name, input } => {
            let data = eval(input, operands, metas, region)?;
            Ok(ChunkData::Cells(data.field(name)?.clone()))
        }
        Node::Unary { op, input } => {
            let b = cells(eval(input, operands, metas, region)?)?;
            Ok(ChunkData::Cells(apply_unary(*op, &b)?))
        }
        Node::Binary { op, lhs, rhs } => {
            let l = cells(eval(lhs, operands, metas, region)?)?;
            let r = cells(eval(rhs, operands, metas, region)?)?;
            let out_dt = resolve::binary_dtype(*op, lhs, &l.dtype(), rhs, &r.dtype())?;
            Ok(ChunkData::Cells(apply_binary(*op, &l, &r, &out_dt)?))
        }
        Node::Where { cond, lhs, rhs } => {
            let c = cells(eval(cond, operands, metas, region)?)?;
            let a = cells(eval(lhs, operands, metas, region)?)?;
            let b = cells(eval(rhs, operands, metas, region)?)?;
            let out_dt = resolve::promote_valued(lhs, &a.dtype(), rhs, &b.dtype())?;
            Ok(ChunkData::Cells(select(c.as_bools()?, &a, &b, &out_dt)?))
        }
        Node::Reduce { .. } => Err(Error::Invariant(
            "reduction node reached the chunk kernels without being spliced".into(),
        )),
    }
}

fn cells(data: ChunkData) -> Result<Buffer> {
    match data {
        ChunkData::Cells(b) => Ok(b),
        ChunkData::Record(_) => Err(Error::DType(
            "structured values only support field selection".into(),
        )),
    }
}

fn apply_unary(op: UnaryOp, b: &Buffer) -> Result<Buffer> {
    let dt = b.dtype();
    let out_dt = resolve::unary_dtype(op, &dt)?;
    let n = b.len();
    match op {
        UnaryOp::Not => {
            let flipped: Vec<bool> = b.as_bools()?.iter().map(|v| !v).collect();
            Ok(Buffer::Bool(flipped))
        }
        UnaryOp::Neg | UnaryOp::Abs => {
            if dt.is_float() {
                let v: Vec<f64> = (0..n)
                    .map(|i| {
                        let x = b.get_f64(i);
                        if op == UnaryOp::Neg {
                            -x
                        } else {
                            x.abs()
                        }
                    })
                    .collect();
                Buffer::F64(v).cast(&out_dt)
            } else {
                let v: Vec<i64> = (0..n)
                    .map(|i| {
                        let x = b.get_i64(i);
                        if op == UnaryOp::Neg {
                            x.wrapping_neg()
                        } else {
                            x.wrapping_abs()
                        }
                    })
                    .collect();
                Buffer::I64(v).cast(&out_dt)
            }
        }
        _ => {
            let f = math_fn(op);
            let v: Vec<f64> = (0..n).map(|i| f(b.get_f64(i))).collect();
            Buffer::F64(v).cast(&out_dt)
        }
    }
}

fn math_fn(op: UnaryOp) -> fn(f64) -> f64 {
    match op {
        UnaryOp::Sqrt => f64::sqrt,
        UnaryOp::Sin => f64::sin,
        UnaryOp::Cos => f64::cos,
        UnaryOp::Tan => f64::tan,
        UnaryOp::ArcSin => f64::asin,
        UnaryOp::ArcCos => f64::acos,
        UnaryOp::ArcTan => f64::atan,
        UnaryOp::Sinh => f64::sinh,
        UnaryOp::Cosh => f64::cosh,
        UnaryOp::Tanh => f64::tanh,
        UnaryOp::Exp => f64::exp,
        UnaryOp::Log => f64::ln,
        UnaryOp::Log10 => f64::log10,
        // dtype-preserving ops are handled before this point
        UnaryOp::Neg | UnaryOp::Not | UnaryOp::Abs => |_| f64::NAN,
    }
}

fn apply_binary(op: BinaryOp, l: &Buffer, r: &Buffer, out_dt: &DType) -> Result<Buffer> {
    let n = l.len();
    if op.is_logical() {
        let lb = l.as_bools()?;
        let rb = r.as_bools()?;
        let v: Vec<bool> = lb
            .iter()
            .zip(rb)
            .map(|(&a, &b)| if op == BinaryOp::And { a && b } else { a || b })
            .collect();
        return Ok(Buffer::Bool(v));
    }
    if op.is_comparison() {
        // exact integer comparison when neither side is float
        let exact = !l.dtype().is_float() && !r.dtype().is_float();
        let v: Vec<bool> = (0..n)
            .map(|i| {
                if exact {
                    compare_ord(op, &l.get_i64(i).cmp(&r.get_i64(i)))
                } else {
                    compare_f64(op, l.get_f64(i), r.get_f64(i))
                }
            })
            .collect();
        return Ok(Buffer::Bool(v));
    }
    if out_dt.is_float() {
        let v: Vec<f64> = (0..n)
            .map(|i| {
                let a = l.get_f64(i);
                let b = r.get_f64(i);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                    _ => f64::NAN,
                }
            })
            .collect();
        Buffer::F64(v).cast(out_dt)
    } else {
        let v: Vec<i64> = (0..n)
            .map(|i| {
                let a = l.get_i64(i);
                let b = r.get_i64(i);
                match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    _ => 0,
                }
            })
            .collect();
        Buffer::I64(v).cast(out_dt)
    }
}

fn compare_ord(op: BinaryOp, ord: &std::cmp::Ordering) -> bool {
    match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Ge => ord.is_ge(),
        BinaryOp::Eq => ord.is_eq(),
        BinaryOp::Ne => ord.is_ne(),
        _ => false,
    }
}

fn compare_f64(op: BinaryOp, a: f64, b: f64) -> bool {
    match op {
        BinaryOp::Lt => a < b,
        BinaryOp::Le => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::Ge => a >= b,
        BinaryOp::Eq => a == b,
        BinaryOp::Ne => a != b,
        _ => false,
    }
}

fn select(cond: &[bool], a: &Buffer, b: &Buffer, out_dt: &DType) -> Result<Buffer> {
    let a = a.cast(out_dt)?;
    let b = b.cast(out_dt)?;
    let mut out = Buffer::zeros(out_dt, cond.len())?;
    for (i, &c) in cond.iter().enumerate() {
        out.set_from(i, if c { &a } else { &b }, i)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarr_expr::Expression;
    use lazarr_store::MemArray;

    fn full_region(shape: &[usize]) -> Region {
        Region {
            start: vec![0; shape.len()],
            shape: shape.to_vec(),
        }
    }

    fn eval_expr(expr: &Expression, region: &Region) -> Buffer {
        let metas: Vec<ArrayMeta> = expr.operands().iter().map(|o| o.meta().clone()).collect();
        match eval(expr.node(), expr.operands(), &metas, region).unwrap() {
            ChunkData::Cells(b) => b,
            ChunkData::Record(_) => panic!("expected cells"),
        }
    }

    #[test]
    fn arithmetic_promotes_like_the_resolver() {
        let a = MemArray::from_cells(vec![3], vec![3], Buffer::I32(vec![1, 2, 3])).unwrap();
        let e = Expression::from_store(a).unwrap().add(0.5).unwrap();
        assert_eq!(e.dtype(), &DType::Float64);
        let b = eval_expr(&e, &full_region(&[3]));
        assert_eq!(b, Buffer::F64(vec![1.5, 2.5, 3.5]));
    }

    #[test]
    fn integer_division_widens() {
        let a = MemArray::from_cells(vec![2], vec![2], Buffer::I64(vec![7, 8])).unwrap();
        let e = Expression::from_store(a).unwrap().div(2i64).unwrap();
        let b = eval_expr(&e, &full_region(&[2]));
        assert_eq!(b, Buffer::F64(vec![3.5, 4.0]));
    }

    #[test]
    fn comparisons_yield_bool_masks() {
        let a = MemArray::from_cells(vec![4], vec![2], Buffer::I64(vec![1, 5, 3, 9])).unwrap();
        let e = Expression::from_store(a).unwrap().gt(3i64).unwrap();
        let b = eval_expr(&e, &full_region(&[4]));
        assert_eq!(b, Buffer::Bool(vec![false, true, false, true]));
    }

    #[test]
    fn where_selects_elementwise() {
        let a = MemArray::from_cells(vec![3], vec![3], Buffer::F64(vec![-1.0, 2.0, -3.0])).unwrap();
        let x = Expression::from_store(a).unwrap();
        let e = lazarr_expr::where_(&x.lt(0.0).unwrap(), x.neg().unwrap(), &x).unwrap();
        let b = eval_expr(&e, &full_region(&[3]));
        assert_eq!(b, Buffer::F64(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn float32_stays_narrow_through_math() {
        let a = MemArray::from_cells(vec![2], vec![2], Buffer::F32(vec![0.0, 1.0])).unwrap();
        let e = Expression::from_store(a).unwrap().exp().unwrap();
        assert_eq!(e.dtype(), &DType::Float32);
        let b = eval_expr(&e, &full_region(&[2]));
        assert_eq!(b.dtype(), DType::Float32);
    }

    #[test]
    fn field_selection_reads_one_buffer() {
        let rec = MemArray::from_record(
            vec![3],
            vec![2],
            vec![
                ("x".into(), Buffer::F64(vec![1.0, 2.0, 3.0])),
                ("n".into(), Buffer::I64(vec![10, 20, 30])),
            ],
        )
        .unwrap();
        let e = Expression::from_store(rec).unwrap().field("n").unwrap();
        let b = eval_expr(&e, &full_region(&[3]));
        assert_eq!(b, Buffer::I64(vec![10, 20, 30]));
    }
}
