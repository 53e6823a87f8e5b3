//! The closed node vocabulary of expression graphs.
//!
//! Graphs are strict trees: children are exclusively owned boxes, and
//! every leaf is an operand reference or a scalar constant. Operand
//! references index into the owning expression's operand table.

use serde::{Deserialize, Serialize};

use lazarr_core::buffer::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    ArcSin,
    ArcCos,
    ArcTan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Log10,
}

impl UnaryOp {
    /// True for the float-valued math functions (everything except the
    /// dtype-preserving `Neg`/`Not`/`Abs`).
    pub fn is_transcendental(&self) -> bool {
        !matches!(self, UnaryOp::Neg | UnaryOp::Not | UnaryOp::Abs)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "~",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::ArcSin => "arcsin",
            UnaryOp::ArcCos => "arccos",
            UnaryOp::ArcTan => "arctan",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Log10 => "log10",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "**",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Mean,
    Min,
    Max,
    Any,
    All,
}

impl ReduceOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Any => "any",
            ReduceOp::All => "all",
        }
    }
}

/// Reduction axis selection. `All` collapses to a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axes {
    All,
    Axes(Vec<usize>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Index into the owning expression's operand table.
    Operand(usize),
    Const(Scalar),
    Unary {
        op: UnaryOp,
        input: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Reduce {
        op: ReduceOp,
        axes: Axes,
        input: Box<Node>,
    },
    Where {
        cond: Box<Node>,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Field {
        name: String,
        input: Box<Node>,
    },
}

impl Node {
    /// Visit every node in the tree, children before parents.
    pub fn visit_post(&self, f: &mut impl FnMut(&Node)) {
        match self {
            Node::Operand(_) | Node::Const(_) => {}
            Node::Unary { input, .. } | Node::Field { input, .. } | Node::Reduce { input, .. } => {
                input.visit_post(f)
            }
            Node::Binary { lhs, rhs, .. } => {
                lhs.visit_post(f);
                rhs.visit_post(f);
            }
            Node::Where { cond, lhs, rhs } => {
                cond.visit_post(f);
                lhs.visit_post(f);
                rhs.visit_post(f);
            }
        }
        f(self);
    }

    /// Rewrite operand indices through `map` (used when merging tables).
    pub fn remap_operands(&mut self, map: &[usize]) {
        match self {
            Node::Operand(i) => *i = map[*i],
            Node::Const(_) => {}
            Node::Unary { input, .. } | Node::Field { input, .. } | Node::Reduce { input, .. } => {
                input.remap_operands(map)
            }
            Node::Binary { lhs, rhs, .. } => {
                lhs.remap_operands(map);
                rhs.remap_operands(map);
            }
            Node::Where { cond, lhs, rhs } => {
                cond.remap_operands(map);
                lhs.remap_operands(map);
                rhs.remap_operands(map);
            }
        }
    }

    pub fn contains_reduce(&self) -> bool {
        let mut found = false;
        self.visit_post(&mut |n| {
            if matches!(n, Node::Reduce { .. }) {
                found = true;
            }
        });
        found
    }
}
