//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker threads per materialization call. 1 evaluates the chunk
    /// grid sequentially in row-major order; >1 evaluates independent
    /// cells concurrently (the destination is index-addressed, so output
    /// contents are identical either way).
    pub workers: usize,

    /// Element budget per chunk when the engine has to pick a chunk shape
    /// itself (reduction splices, destinations without an override).
    pub chunk_elems_hint: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            chunk_elems_hint: 64 * 1024,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `LAZARR_WORKERS`: worker threads per materialization
    /// - `LAZARR_CHUNK_ELEMS`: element budget per auto-chosen chunk
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("LAZARR_WORKERS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.workers = v.max(1);
            }
        }

        if let Ok(s) = std::env::var("LAZARR_CHUNK_ELEMS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.chunk_elems_hint = v.max(1);
            }
        }

        cfg
    }
}
