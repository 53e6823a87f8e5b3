//! Token → adapter dispatch.
//!
//! Every operand carries an identity token; this module rebinds tokens to
//! live stores (`open_array`) and builds sinks for destinations
//! (`open_sink`). The scheme decides the backing: `mem://` for the
//! in-process registry, `file://` or a bare path for on-disk containers,
//! and object-store URLs behind the remote features.

use std::path::PathBuf;
use std::sync::Arc;

use lazarr_core::error::{Error, Result};
use lazarr_core::meta::ArrayMeta;

use crate::codec::{Codec, DEFAULT_ZSTD_LEVEL};
use crate::dir::{DirArray, DirSink};
use crate::mem::{MemArray, MemSink};
use crate::traits::{ChunkSink, ChunkStore};

fn scheme(token: &str) -> Option<&str> {
    token
        .split_once("://")
        .map(|(s, _)| s.trim())
        .filter(|s| !s.is_empty())
}

/// Rebind an identity token to a live chunk store.
pub fn open_array(token: &str) -> Result<Arc<dyn ChunkStore>> {
    match scheme(token) {
        Some("mem") => Ok(MemArray::lookup(token)? as Arc<dyn ChunkStore>),
        Some("file") => {
            let path = token.trim_start_matches("file://");
            Ok(DirArray::open(path)? as Arc<dyn ChunkStore>)
        }
        Some("s3") | Some("gs") | Some("gcs") | Some("azure") | Some("azblob") => {
            #[cfg(any(feature = "s3", feature = "gcs", feature = "azure"))]
            {
                Ok(crate::remote::RemoteArray::open(token)? as Arc<dyn ChunkStore>)
            }
            #[cfg(not(any(feature = "s3", feature = "gcs", feature = "azure")))]
            {
                Err(Error::Config(format!(
                    "lazarr was built without remote array support; cannot open '{token}'"
                )))
            }
        }
        None => Ok(DirArray::open(token)? as Arc<dyn ChunkStore>),
        Some(other) => Err(Error::Config(format!("unsupported token scheme '{other}'"))),
    }
}

/// Where a materialization writes, plus output-only overrides. Operand
/// configuration is never touched by these settings.
#[derive(Debug, Clone)]
pub struct Destination {
    target: Target,
    pub chunks: Option<Vec<usize>>,
    pub codec: Codec,
    pub zstd_level: i32,
}

#[derive(Debug, Clone)]
enum Target {
    Memory,
    Path(PathBuf),
}

impl Destination {
    /// In-process result registered under a fresh `mem://` token.
    pub fn memory() -> Self {
        Self {
            target: Target::Memory,
            chunks: None,
            codec: Codec::None,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        }
    }

    /// On-disk container at `path` (created or replaced).
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::Path(path.into()),
            chunks: None,
            codec: Codec::None,
            zstd_level: DEFAULT_ZSTD_LEVEL,
        }
    }

    /// Override the output chunk shape.
    pub fn with_chunks(mut self, chunks: Vec<usize>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Compress output chunk payloads.
    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Override the zstd compression level (ignored by other codecs).
    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }
}

/// Build the sink for a destination. The staged state is discarded unless
/// the returned sink is finalized.
pub fn open_sink(dest: &Destination, meta: ArrayMeta) -> Result<Box<dyn ChunkSink>> {
    match &dest.target {
        Target::Memory => Ok(Box::new(MemSink::new(meta)?)),
        Target::Path(path) => Ok(Box::new(DirSink::create(
            path,
            meta,
            dest.codec,
            dest.zstd_level,
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lazarr_core::buffer::Buffer;

    #[test]
    fn mem_tokens_resolve_through_registry() {
        let arr = MemArray::from_cells(vec![3], vec![3], Buffer::I64(vec![1, 2, 3])).unwrap();
        let token = arr.token().to_string();
        let reopened = open_array(&token).unwrap();
        assert_eq!(reopened.meta(), arr.meta());
    }

    #[test]
    fn destination_overrides_compose() {
        let dest = Destination::path("/tmp/out")
            .with_chunks(vec![8])
            .with_codec(Codec::Zstd)
            .with_zstd_level(9);
        assert_eq!(dest.chunks, Some(vec![8]));
        assert_eq!(dest.codec, Codec::Zstd);
        assert_eq!(dest.zstd_level, 9);
    }

    #[test]
    fn unknown_scheme_is_a_config_error() {
        assert!(matches!(
            open_array("ftp://nope/array"),
            Err(Error::Config(_))
        ));
    }
}
