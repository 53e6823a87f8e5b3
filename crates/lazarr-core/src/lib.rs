#![forbid(unsafe_code)]
//! lazarr-core: dtypes, shapes, buffers, array metadata, configuration,
//! and the shared error taxonomy.
//!
//! This crate is pure data and math; it performs no I/O and knows nothing
//! about where chunks live. Storage adapters and the execution engine
//! build on top of it.

pub mod buffer;
pub mod config;
pub mod dtype;
pub mod error;
pub mod hash;
pub mod meta;
pub mod prelude;
pub mod shape;

pub use error::{Error, Result};

/// Engine version string recorded in persisted artifacts.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
