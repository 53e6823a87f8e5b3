//! The user-facing `Expression` handle: an immutable node graph plus its
//! operand table and cached output geometry.
//!
//! Builders never mutate: each one produces a fresh `Expression`, and
//! every validation (broadcast compatibility, dtype support, axis range,
//! field names) happens here, at construction.

use std::fmt;
use std::sync::Arc;

use lazarr_core::buffer::Scalar;
use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;

use lazarr_store::{open_array, ChunkStore};

use crate::node::{Axes, BinaryOp, Node, ReduceOp, UnaryOp};
use crate::resolve;

/// One named operand binding: a stable short name plus the live store.
#[derive(Clone)]
pub struct BoundOperand {
    pub name: String,
    pub store: Arc<dyn ChunkStore>,
}

impl BoundOperand {
    pub fn token(&self) -> &str {
        self.store.token()
    }

    pub fn meta(&self) -> &ArrayMeta {
        self.store.meta()
    }
}

#[derive(Clone)]
pub struct Expression {
    node: Node,
    operands: Vec<BoundOperand>,
    shape: Vec<usize>,
    dtype: DType,
}

impl Expression {
    /// Assemble and validate an expression from raw parts.
    pub fn from_parts(node: Node, operands: Vec<BoundOperand>) -> Result<Expression> {
        let metas = operand_metas(&operands);
        let (shape, dtype) = resolve::resolve(&node, &metas)?;
        Ok(Expression {
            node,
            operands,
            shape,
            dtype,
        })
    }

    /// Wrap a chunk store as a single-operand expression (`o0`).
    pub fn from_store(store: Arc<dyn ChunkStore>) -> Result<Expression> {
        Expression::from_parts(
            Node::Operand(0),
            vec![BoundOperand {
                name: "o0".to_string(),
                store,
            }],
        )
    }

    /// Resolve an identity token and wrap the store it names.
    pub fn from_token(token: &str) -> Result<Expression> {
        Expression::from_store(open_array(token)?)
    }

    /// Scalar constant leaf.
    pub fn scalar(value: Scalar) -> Expression {
        Expression {
            node: Node::Const(value),
            operands: vec![],
            shape: vec![],
            dtype: value.dtype(),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn operands(&self) -> &[BoundOperand] {
        &self.operands
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> &DType {
        &self.dtype
    }

    // ---- elementwise arithmetic -------------------------------------

    pub fn add(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Add, rhs.into())
    }

    pub fn sub(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Sub, rhs.into())
    }

    pub fn mul(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Mul, rhs.into())
    }

    pub fn div(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Div, rhs.into())
    }

    pub fn pow(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Pow, rhs.into())
    }

    // ---- comparisons (always bool-valued) ---------------------------

    pub fn lt(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Lt, rhs.into())
    }

    pub fn le(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Le, rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Gt, rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Ge, rhs.into())
    }

    pub fn eq(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Eq, rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Ne, rhs.into())
    }

    // ---- boolean combinators ----------------------------------------

    pub fn and(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::And, rhs.into())
    }

    pub fn or(&self, rhs: impl Into<Expression>) -> Result<Expression> {
        self.binary(BinaryOp::Or, rhs.into())
    }

    pub fn not(&self) -> Result<Expression> {
        self.unary(UnaryOp::Not)
    }

    // ---- math functions ---------------------------------------------

    pub fn neg(&self) -> Result<Expression> {
        self.unary(UnaryOp::Neg)
    }

    pub fn abs(&self) -> Result<Expression> {
        self.unary(UnaryOp::Abs)
    }

    pub fn sqrt(&self) -> Result<Expression> {
        self.unary(UnaryOp::Sqrt)
    }

    pub fn sin(&self) -> Result<Expression> {
        self.unary(UnaryOp::Sin)
    }

    pub fn cos(&self) -> Result<Expression> {
        self.unary(UnaryOp::Cos)
    }

    pub fn tan(&self) -> Result<Expression> {
        self.unary(UnaryOp::Tan)
    }

    pub fn arcsin(&self) -> Result<Expression> {
        self.unary(UnaryOp::ArcSin)
    }

    pub fn arccos(&self) -> Result<Expression> {
        self.unary(UnaryOp::ArcCos)
    }

    pub fn arctan(&self) -> Result<Expression> {
        self.unary(UnaryOp::ArcTan)
    }

    pub fn sinh(&self) -> Result<Expression> {
        self.unary(UnaryOp::Sinh)
    }

    pub fn cosh(&self) -> Result<Expression> {
        self.unary(UnaryOp::Cosh)
    }

    pub fn tanh(&self) -> Result<Expression> {
        self.unary(UnaryOp::Tanh)
    }

    pub fn exp(&self) -> Result<Expression> {
        self.unary(UnaryOp::Exp)
    }

    pub fn log(&self) -> Result<Expression> {
        self.unary(UnaryOp::Log)
    }

    pub fn log10(&self) -> Result<Expression> {
        self.unary(UnaryOp::Log10)
    }

    // ---- structured fields ------------------------------------------

    /// Select one field of a structured operand.
    pub fn field(&self, name: &str) -> Result<Expression> {
        Expression::from_parts(
            Node::Field {
                name: name.to_string(),
                input: Box::new(self.node.clone()),
            },
            self.operands.clone(),
        )
    }

    // ---- reductions (evaluated eagerly by the engine) ---------------

    pub fn sum(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::Sum, axes)
    }

    pub fn mean(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::Mean, axes)
    }

    pub fn min(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::Min, axes)
    }

    pub fn max(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::Max, axes)
    }

    pub fn any(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::Any, axes)
    }

    pub fn all(&self, axes: Axes) -> Result<Expression> {
        self.reduce(ReduceOp::All, axes)
    }

    fn reduce(&self, op: ReduceOp, axes: Axes) -> Result<Expression> {
        Expression::from_parts(
            Node::Reduce {
                op,
                axes,
                input: Box::new(self.node.clone()),
            },
            self.operands.clone(),
        )
    }

    // ---- internals ---------------------------------------------------

    fn unary(&self, op: UnaryOp) -> Result<Expression> {
        Expression::from_parts(
            Node::Unary {
                op,
                input: Box::new(self.node.clone()),
            },
            self.operands.clone(),
        )
    }

    fn binary(&self, op: BinaryOp, rhs: Expression) -> Result<Expression> {
        let (operands, rhs_node) = merge_operands(&self.operands, &rhs);
        Expression::from_parts(
            Node::Binary {
                op,
                lhs: Box::new(self.node.clone()),
                rhs: Box::new(rhs_node),
            },
            operands,
        )
    }
}

/// Three-argument elementwise selection: `cond ? a : b`, with ordinary
/// broadcasting across all three.
pub fn where_(
    cond: &Expression,
    a: impl Into<Expression>,
    b: impl Into<Expression>,
) -> Result<Expression> {
    let a = a.into();
    let b = b.into();
    let (operands, a_node) = merge_operands(&cond.operands, &a);
    let lhs = Expression {
        node: Node::Where {
            // placeholder; rebuilt below once b is merged too
            cond: Box::new(cond.node.clone()),
            lhs: Box::new(a_node),
            rhs: Box::new(Node::Const(Scalar::Bool(false))),
        },
        operands,
        shape: vec![],
        dtype: DType::Bool,
    };
    let (operands, b_node) = merge_operands(&lhs.operands, &b);
    let Node::Where { cond, lhs: a_node, .. } = lhs.node else {
        return Err(Error::Invariant("where_ lost its own node".into()));
    };
    Expression::from_parts(
        Node::Where {
            cond,
            lhs: a_node,
            rhs: Box::new(b_node),
        },
        operands,
    )
}

/// Merge `rhs`'s operand table into `base`, reusing entries with the same
/// identity token and renumbering the rest. Returns the widened table and
/// the rhs node rewritten against it.
fn merge_operands(base: &[BoundOperand], rhs: &Expression) -> (Vec<BoundOperand>, Node) {
    let mut operands: Vec<BoundOperand> = base.to_vec();
    let mut map = Vec::with_capacity(rhs.operands.len());
    for op in &rhs.operands {
        let existing = operands.iter().position(|o| o.token() == op.token());
        let idx = match existing {
            Some(i) => i,
            None => {
                let i = operands.len();
                operands.push(BoundOperand {
                    name: format!("o{i}"),
                    store: Arc::clone(&op.store),
                });
                i
            }
        };
        map.push(idx);
    }
    let mut node = rhs.node.clone();
    node.remap_operands(&map);
    (operands, node)
}

pub(crate) fn operand_metas(operands: &[BoundOperand]) -> Vec<ArrayMeta> {
    operands.iter().map(|o| o.meta().clone()).collect()
}

impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        Expression::scalar(Scalar::F64(v))
    }
}

impl From<i64> for Expression {
    fn from(v: i64) -> Self {
        Expression::scalar(Scalar::I64(v))
    }
}

impl From<bool> for Expression {
    fn from(v: bool) -> Self {
        Expression::scalar(Scalar::Bool(v))
    }
}

impl From<&Expression> for Expression {
    fn from(e: &Expression) -> Self {
        e.clone()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_node(&self.node, &self.operands, f)
    }
}

fn fmt_node(node: &Node, operands: &[BoundOperand], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match node {
        Node::Operand(i) => match operands.get(*i) {
            Some(op) => write!(f, "{}", op.name),
            None => write!(f, "o?{i}"),
        },
        Node::Const(Scalar::Bool(b)) => write!(f, "{b}"),
        Node::Const(Scalar::I64(v)) => write!(f, "{v}"),
        Node::Const(Scalar::F64(v)) => write!(f, "{v}"),
        Node::Unary { op, input } => {
            if matches!(op, UnaryOp::Neg | UnaryOp::Not) {
                write!(f, "{}", op.symbol())?;
                fmt_node(input, operands, f)
            } else {
                write!(f, "{}(", op.symbol())?;
                fmt_node(input, operands, f)?;
                write!(f, ")")
            }
        }
        Node::Binary { op, lhs, rhs } => {
            write!(f, "(")?;
            fmt_node(lhs, operands, f)?;
            write!(f, " {} ", op.symbol())?;
            fmt_node(rhs, operands, f)?;
            write!(f, ")")
        }
        Node::Reduce { op, axes, input } => {
            write!(f, "{}(", op.symbol())?;
            fmt_node(input, operands, f)?;
            if let Axes::Axes(list) = axes {
                write!(f, ", axes={list:?}")?;
            }
            write!(f, ")")
        }
        Node::Where { cond, lhs, rhs } => {
            write!(f, "where(")?;
            fmt_node(cond, operands, f)?;
            write!(f, ", ")?;
            fmt_node(lhs, operands, f)?;
            write!(f, ", ")?;
            fmt_node(rhs, operands, f)?;
            write!(f, ")")
        }
        Node::Field { name, input } => {
            fmt_node(input, operands, f)?;
            write!(f, ".{name}")
        }
    }
}
