//! Bottom-up shape and dtype resolution.
//!
//! Runs at expression-construction time so that broadcast and dtype
//! mistakes surface immediately, and again (cheaply) inside the engine to
//! type intermediate buffers. Both callers must agree, so this is the
//! single source of truth for result dtypes.

use lazarr_core::dtype::{promote, DType};
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;
use lazarr_core::shape::broadcast_shapes;

use crate::node::{Axes, BinaryOp, Node, ReduceOp, UnaryOp};

/// Resolve one node given the operand table's metadata.
pub fn resolve(node: &Node, metas: &[ArrayMeta]) -> Result<(Vec<usize>, DType)> {
    match node {
        Node::Operand(i) => {
            let meta = metas.get(*i).ok_or_else(|| {
                Error::Invariant(format!("operand index {i} out of table range"))
            })?;
            Ok((meta.shape.clone(), meta.dtype.clone()))
        }
        Node::Const(s) => Ok((vec![], s.dtype())),
        Node::Unary { op, input } => {
            let (shape, dt) = resolve(input, metas)?;
            Ok((shape, unary_dtype(*op, &dt)?))
        }
        Node::Binary { op, lhs, rhs } => {
            let (ls, ldt) = resolve(lhs, metas)?;
            let (rs, rdt) = resolve(rhs, metas)?;
            let shape = broadcast_shapes(&ls, &rs)?;
            let dtype = binary_dtype(*op, lhs, &ldt, rhs, &rdt)?;
            Ok((shape, dtype))
        }
        Node::Where { cond, lhs, rhs } => {
            let (cs, cdt) = resolve(cond, metas)?;
            if !cdt.is_bool() {
                return Err(Error::DType(format!(
                    "where condition must be bool, got {cdt}"
                )));
            }
            let (ls, ldt) = resolve(lhs, metas)?;
            let (rs, rdt) = resolve(rhs, metas)?;
            let shape = broadcast_shapes(&cs, &broadcast_shapes(&ls, &rs)?)?;
            let dtype = promote_valued(lhs, &ldt, rhs, &rdt)?;
            Ok((shape, dtype))
        }
        Node::Field { name, input } => {
            if !matches!(input.as_ref(), Node::Operand(_)) {
                return Err(Error::DType(
                    "field access requires a structured array operand".into(),
                ));
            }
            let (shape, dt) = resolve(input, metas)?;
            let field = dt.field(name)?;
            Ok((shape, field.dtype.clone()))
        }
        Node::Reduce { op, axes, input } => {
            let (shape, dt) = resolve(input, metas)?;
            if dt.is_struct() {
                return Err(Error::DType(
                    "cannot reduce a structured array; select a field first".into(),
                ));
            }
            let out_shape = reduced_shape(&shape, axes)?;
            Ok((out_shape, reduce_dtype(*op, &dt)))
        }
    }
}

/// Output shape of a reduction: `All` collapses to rank 0, otherwise the
/// named axes are removed. Axes must be in range and free of duplicates.
pub fn reduced_shape(shape: &[usize], axes: &Axes) -> Result<Vec<usize>> {
    match axes {
        Axes::All => Ok(vec![]),
        Axes::Axes(list) => {
            let rank = shape.len();
            let mut seen = vec![false; rank];
            for &axis in list {
                if axis >= rank || seen[axis] {
                    return Err(Error::Axis { axis, rank });
                }
                seen[axis] = true;
            }
            Ok(shape
                .iter()
                .enumerate()
                .filter(|(d, _)| !seen[*d])
                .map(|(_, &s)| s)
                .collect())
        }
    }
}

pub fn unary_dtype(op: UnaryOp, dt: &DType) -> Result<DType> {
    match op {
        UnaryOp::Not => {
            if dt.is_bool() {
                Ok(DType::Bool)
            } else {
                Err(Error::DType(format!("'~' requires bool, got {dt}")))
            }
        }
        UnaryOp::Neg | UnaryOp::Abs => {
            if dt.is_numeric() {
                Ok(dt.clone())
            } else {
                Err(Error::DType(format!(
                    "'{}' requires a numeric dtype, got {dt}",
                    op.symbol()
                )))
            }
        }
        _ => {
            if !dt.is_numeric() {
                return Err(Error::DType(format!(
                    "'{}' requires a numeric dtype, got {dt}",
                    op.symbol()
                )));
            }
            // float32 is closed under the math functions; everything else
            // widens to float64
            Ok(if *dt == DType::Float32 {
                DType::Float32
            } else {
                DType::Float64
            })
        }
    }
}

pub fn binary_dtype(
    op: BinaryOp,
    lhs: &Node,
    ldt: &DType,
    rhs: &Node,
    rdt: &DType,
) -> Result<DType> {
    if op.is_logical() {
        if ldt.is_bool() && rdt.is_bool() {
            return Ok(DType::Bool);
        }
        return Err(Error::DType(format!(
            "'{}' requires bool operands, got {ldt} and {rdt}",
            op.symbol()
        )));
    }
    if op.is_comparison() {
        if ldt.is_struct() || rdt.is_struct() {
            return Err(Error::DType(
                "cannot compare whole structured records; select a field first".into(),
            ));
        }
        return Ok(DType::Bool);
    }
    let out = promote_valued(lhs, ldt, rhs, rdt)?;
    Ok(match op {
        // integer division and integer powers widen to float64
        BinaryOp::Div | BinaryOp::Pow if !out.is_float() => DType::Float64,
        _ => out,
    })
}

/// Promotion with value-kind demotion for scalar constants: a bare float
/// constant combined with a float32 array stays float32, and an integer
/// constant adopts the array's integer width instead of forcing int64.
pub fn promote_valued(lhs: &Node, ldt: &DType, rhs: &Node, rdt: &DType) -> Result<DType> {
    match (
        matches!(lhs, Node::Const(_)),
        matches!(rhs, Node::Const(_)),
    ) {
        (true, false) => promote_const(ldt, rdt),
        (false, true) => promote_const(rdt, ldt),
        _ => promote(ldt, rdt),
    }
}

fn promote_const(const_dt: &DType, array_dt: &DType) -> Result<DType> {
    if array_dt.is_struct() {
        return Err(Error::DType(
            "structured dtypes do not support arithmetic; select a field first".into(),
        ));
    }
    Ok(match const_dt {
        DType::Bool => array_dt.clone(),
        dt if dt.is_integer() => {
            if array_dt.is_numeric() {
                array_dt.clone()
            } else {
                DType::Int64
            }
        }
        _ => {
            // float constant
            if array_dt.is_float() {
                array_dt.clone()
            } else {
                DType::Float64
            }
        }
    })
}

pub fn reduce_dtype(op: ReduceOp, dt: &DType) -> DType {
    match op {
        ReduceOp::Sum => match dt {
            DType::Float32 => DType::Float32,
            DType::Float64 => DType::Float64,
            _ => DType::Int64,
        },
        ReduceOp::Mean => DType::Float64,
        ReduceOp::Min | ReduceOp::Max => dt.clone(),
        ReduceOp::Any | ReduceOp::All => DType::Bool,
    }
}

/// Iteration chunk shape for an expression: taken from the operand with
/// the largest rank (first named wins ties), clipped to the output shape.
pub fn iteration_chunks(metas: &[ArrayMeta], out_shape: &[usize]) -> Vec<usize> {
    let best = metas
        .iter()
        .enumerate()
        .filter(|(_, m)| m.rank() == out_shape.len())
        .map(|(i, _)| i)
        .next();
    match best {
        Some(i) => metas[i]
            .chunks
            .iter()
            .zip(out_shape)
            .map(|(&c, &s)| c.min(s).max(usize::from(s > 0)))
            .collect(),
        None => out_shape.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarr_core::buffer::Scalar;

    fn meta(shape: &[usize], dtype: DType, chunks: &[usize]) -> ArrayMeta {
        ArrayMeta::new(shape.to_vec(), dtype, chunks.to_vec()).unwrap()
    }

    #[test]
    fn binary_broadcast_and_promotion() {
        let metas = vec![
            meta(&[500, 1000], DType::Float32, &[100, 250]),
            meta(&[1000], DType::Int32, &[250]),
        ];
        let node = Node::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Node::Operand(0)),
            rhs: Box::new(Node::Operand(1)),
        };
        let (shape, dtype) = resolve(&node, &metas).unwrap();
        assert_eq!(shape, vec![500, 1000]);
        assert_eq!(dtype, DType::Float64);
    }

    #[test]
    fn float_scalar_keeps_float32() {
        let metas = vec![meta(&[4], DType::Float32, &[4])];
        let node = Node::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(Node::Operand(0)),
            rhs: Box::new(Node::Const(Scalar::F64(2.0))),
        };
        let (_, dtype) = resolve(&node, &metas).unwrap();
        assert_eq!(dtype, DType::Float32);
    }

    #[test]
    fn comparison_always_bool() {
        let metas = vec![meta(&[4], DType::Int64, &[2])];
        let node = Node::Binary {
            op: BinaryOp::Gt,
            lhs: Box::new(Node::Operand(0)),
            rhs: Box::new(Node::Const(Scalar::F64(1.5))),
        };
        assert_eq!(resolve(&node, &metas).unwrap().1, DType::Bool);
    }

    #[test]
    fn reduce_shapes() {
        assert_eq!(
            reduced_shape(&[3, 4, 5], &Axes::Axes(vec![1])).unwrap(),
            vec![3, 5]
        );
        assert_eq!(reduced_shape(&[3, 4], &Axes::All).unwrap(), Vec::<usize>::new());
        assert!(matches!(
            reduced_shape(&[3, 4], &Axes::Axes(vec![2])),
            Err(Error::Axis { axis: 2, rank: 2 })
        ));
        assert!(reduced_shape(&[3, 4], &Axes::Axes(vec![0, 0])).is_err());
    }

    #[test]
    fn iteration_chunks_clip_to_output() {
        let metas = vec![
            meta(&[10, 10], DType::Float64, &[4, 12]),
            meta(&[10], DType::Float64, &[3]),
        ];
        assert_eq!(iteration_chunks(&metas, &[10, 10]), vec![4, 10]);
    }
}
