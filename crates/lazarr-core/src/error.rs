use thiserror::Error;

/// Canonical result used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Workspace-wide error taxonomy.
///
/// Graph-construction errors (`Shape`, `Broadcast`, `DType`, `Axis`,
/// `Name`, `Syntax`) surface when an expression is built, never at
/// materialization time. Execution errors (`Io`, `StaleReference`,
/// `Codec`) abort the in-flight materialization and discard partial
/// destination state.
#[derive(Debug, Error)]
pub enum Error {
    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("cannot broadcast shapes {0:?} and {1:?}")]
    Broadcast(Vec<usize>, Vec<usize>),

    #[error("dtype error: {0}")]
    DType(String),

    #[error("axis {axis} out of range for rank {rank}")]
    Axis { axis: usize, rank: usize },

    #[error("unknown name '{0}'")]
    Name(String),

    #[error("query syntax error: {0}")]
    Syntax(String),

    #[error("stale operand reference: {0}")]
    StaleReference(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("codec not built into this binary: {0}")]
    CodecUnsupported(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Persist(String),

    #[error("internal invariant failed: {0}")]
    Invariant(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Persist(e.to_string())
    }
}
