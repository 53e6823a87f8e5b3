//! Expression graph persistence.
//!
//! A saved expression is a small JSON document: the node tree plus, for
//! each operand, its identity token and the metadata recorded at save
//! time. Loading rebinds tokens to live stores and verifies the recorded
//! metadata still matches; no chunk data is ever stored or computed here.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use lazarr_core::dtype::DType;
use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;

use lazarr_store::open_array;

use crate::expr::{BoundOperand, Expression};
use crate::node::Node;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SavedExpression {
    format_version: u32,
    node: Node,
    operands: Vec<SavedOperand>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SavedOperand {
    name: String,
    token: String,
    shape: Vec<usize>,
    dtype: DType,
    chunks: Vec<usize>,
}

impl Expression {
    /// Persist the graph and its operand bindings as JSON.
    ///
    /// Fails when any operand lives only in process memory: `mem://`
    /// tokens cannot outlive the process, so a graph over them has no
    /// meaningful saved form.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut operands = Vec::with_capacity(self.operands().len());
        for op in self.operands() {
            let token = op.token();
            if token.starts_with("mem://") {
                return Err(Error::Persist(format!(
                    "operand '{}' is an in-memory array ('{token}'); \
                     only durable operands can be saved",
                    op.name
                )));
            }
            let meta = op.meta();
            operands.push(SavedOperand {
                name: op.name.clone(),
                token: token.to_string(),
                shape: meta.shape.clone(),
                dtype: meta.dtype.clone(),
                chunks: meta.chunks.clone(),
            });
        }
        let saved = SavedExpression {
            format_version: FORMAT_VERSION,
            node: self.node().clone(),
            operands,
        };
        let text = serde_json::to_string_pretty(&saved)?;
        fs::write(path.as_ref(), text)?;
        Ok(())
    }
}

/// Load a saved expression and rebind its operands.
///
/// Each recorded token is reopened and its live metadata compared against
/// what was recorded at save time; any drift is a stale reference.
pub fn open_expression(path: impl AsRef<Path>) -> Result<Expression> {
    let text = fs::read_to_string(path.as_ref())?;
    let saved: SavedExpression = serde_json::from_str(&text)?;
    if saved.format_version != FORMAT_VERSION {
        return Err(Error::Persist(format!(
            "unsupported expression format version {}",
            saved.format_version
        )));
    }
    let mut operands = Vec::with_capacity(saved.operands.len());
    for rec in saved.operands {
        let recorded = ArrayMeta::new(rec.shape, rec.dtype, rec.chunks)?;
        let store = open_array(&rec.token)?;
        recorded.check_matches(store.meta(), &rec.token)?;
        operands.push(BoundOperand {
            name: rec.name,
            store,
        });
    }
    Expression::from_parts(saved.node, operands)
}
