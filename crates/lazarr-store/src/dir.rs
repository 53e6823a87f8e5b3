//! On-disk chunked containers: one directory per array.
//!
//! Layout:
//! ```text
//! <path>/
//!   meta.json          # ContainerMeta (ArrayMeta + codec + fingerprint)
//!   c<i0>.<i1>...      # one frame per chunk (see format.rs); "c" at rank 0
//! ```
//!
//! `DirSink` stages everything under `<path>.part` and renames on
//! finalize, so a crashed or aborted materialization never leaves a
//! readable half-written container behind. Dropping an unfinalized sink
//! removes the staging directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lazarr_core::buffer::Chunk;
use lazarr_core::error::{Error, Result};
use lazarr_core::hash::fingerprint_serde;
use lazarr_core::meta::ArrayMeta;

use crate::codec::Codec;
use crate::format::{decode_chunk, encode_chunk};
use crate::traits::{ChunkSink, ChunkStore};

const FORMAT_VERSION: u32 = 1;
pub(crate) const META_FILE: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ContainerMeta {
    pub(crate) format_version: u32,
    pub(crate) meta: ArrayMeta,
    pub(crate) codec: Codec,
    /// blake3 of (format_version, meta, codec); checked on open.
    pub(crate) fingerprint: String,
}

impl ContainerMeta {
    pub(crate) fn new(meta: ArrayMeta, codec: Codec) -> Result<Self> {
        let fingerprint = fingerprint_serde(&(FORMAT_VERSION, &meta, codec))?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            meta,
            codec,
            fingerprint,
        })
    }

    pub(crate) fn verify(&self) -> Result<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(Error::Persist(format!(
                "unsupported container format version {}",
                self.format_version
            )));
        }
        let expected = fingerprint_serde(&(self.format_version, &self.meta, self.codec))?;
        if expected != self.fingerprint {
            return Err(Error::StaleReference(
                "container metadata fingerprint mismatch".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn chunk_file_name(index: &[usize]) -> String {
    if index.is_empty() {
        "c".to_string()
    } else {
        let parts: Vec<String> = index.iter().map(|i| i.to_string()).collect();
        format!("c{}", parts.join("."))
    }
}

/// Read side of an on-disk container.
pub struct DirArray {
    token: String,
    path: PathBuf,
    meta: ArrayMeta,
    codec: Codec,
}

impl DirArray {
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<DirArray>> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read(path.join(META_FILE))
            .map_err(|e| Error::Io(format!("open {}: {e}", path.display())))?;
        let container: ContainerMeta = serde_json::from_slice(&raw)?;
        container.verify()?;
        let token = path.to_string_lossy().into_owned();
        Ok(Arc::new(DirArray {
            token,
            path,
            meta: container.meta,
            codec: container.codec,
        }))
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }
}

impl ChunkStore for DirArray {
    fn token(&self) -> &str {
        &self.token
    }

    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn read_chunk(&self, index: &[usize]) -> Result<Chunk> {
        let file = self.path.join(chunk_file_name(index));
        let bytes =
            fs::read(&file).map_err(|e| Error::Io(format!("read {}: {e}", file.display())))?;
        let chunk = decode_chunk(&bytes)?;
        let expected = self.meta.grid()?.chunk_region(index).shape;
        if chunk.shape != expected {
            return Err(Error::Io(format!(
                "chunk {index:?} has shape {:?}, expected {:?}",
                chunk.shape, expected
            )));
        }
        Ok(chunk)
    }
}

/// Write side: staged container that commits on finalize.
pub struct DirSink {
    final_path: PathBuf,
    part_path: PathBuf,
    meta: ArrayMeta,
    codec: Codec,
    zstd_level: i32,
    finalized: bool,
}

impl DirSink {
    /// Create (or truncate) the staging directory and write its metadata.
    pub fn create(
        path: impl AsRef<Path>,
        meta: ArrayMeta,
        codec: Codec,
        zstd_level: i32,
    ) -> Result<DirSink> {
        let final_path = path.as_ref().to_path_buf();
        let part_path = staging_path(&final_path);
        if part_path.exists() {
            fs::remove_dir_all(&part_path)
                .map_err(|e| Error::Io(format!("truncate {}: {e}", part_path.display())))?;
        }
        fs::create_dir_all(&part_path)
            .map_err(|e| Error::Io(format!("create {}: {e}", part_path.display())))?;
        let container = ContainerMeta::new(meta.clone(), codec)?;
        fs::write(
            part_path.join(META_FILE),
            serde_json::to_vec_pretty(&container)?,
        )
        .map_err(|e| Error::Io(format!("write meta: {e}")))?;
        debug!(path = %final_path.display(), "staged destination container");
        Ok(DirSink {
            final_path,
            part_path,
            meta,
            codec,
            zstd_level,
            finalized: false,
        })
    }
}

fn staging_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "array".to_string());
    name.push_str(".part");
    final_path.with_file_name(name)
}

impl ChunkSink for DirSink {
    fn meta(&self) -> &ArrayMeta {
        &self.meta
    }

    fn put_chunk(&mut self, index: &[usize], chunk: &Chunk) -> Result<()> {
        let bytes = encode_chunk(chunk, self.codec, self.zstd_level)?;
        let file = self.part_path.join(chunk_file_name(index));
        fs::write(&file, bytes)
            .map_err(|e| Error::Io(format!("write {}: {e}", file.display())))?;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<Arc<dyn ChunkStore>> {
        if self.final_path.exists() {
            fs::remove_dir_all(&self.final_path)
                .map_err(|e| Error::Io(format!("replace {}: {e}", self.final_path.display())))?;
        }
        fs::rename(&self.part_path, &self.final_path)
            .map_err(|e| Error::Io(format!("commit {}: {e}", self.final_path.display())))?;
        self.finalized = true;
        debug!(path = %self.final_path.display(), "committed destination container");
        let arr = DirArray::open(&self.final_path)?;
        Ok(arr as Arc<dyn ChunkStore>)
    }
}

impl Drop for DirSink {
    fn drop(&mut self) {
        if !self.finalized && self.part_path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.part_path) {
                warn!(path = %self.part_path.display(), "failed to discard partial container: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DEFAULT_ZSTD_LEVEL;
    use lazarr_core::buffer::{Buffer, ChunkData};
    use lazarr_core::dtype::DType;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "lazarr-dir-test-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn one_chunk() -> Chunk {
        Chunk {
            shape: vec![2],
            data: ChunkData::Cells(Buffer::F64(vec![1.5, 2.5])),
        }
    }

    #[test]
    fn write_finalize_reopen() {
        let root = temp_dir("roundtrip");
        let dest = root.join("out");
        let meta = ArrayMeta::new(vec![2], DType::Float64, vec![2]).unwrap();
        let mut sink = Box::new(DirSink::create(&dest, meta, Codec::None, DEFAULT_ZSTD_LEVEL).unwrap());
        sink.put_chunk(&[0], &one_chunk()).unwrap();
        let store = sink.finalize().unwrap();
        assert_eq!(store.read_chunk(&[0]).unwrap(), one_chunk());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn dropped_sink_discards_staging() {
        let root = temp_dir("discard");
        let dest = root.join("out");
        let meta = ArrayMeta::new(vec![2], DType::Float64, vec![2]).unwrap();
        {
            let mut sink = DirSink::create(&dest, meta, Codec::None, DEFAULT_ZSTD_LEVEL).unwrap();
            sink.put_chunk(&[0], &one_chunk()).unwrap();
            // dropped without finalize
        }
        assert!(!dest.exists());
        assert!(!staging_path(&dest).exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn tampered_meta_is_rejected() {
        let root = temp_dir("tamper");
        let dest = root.join("out");
        let meta = ArrayMeta::new(vec![2], DType::Float64, vec![2]).unwrap();
        let mut sink = Box::new(DirSink::create(&dest, meta, Codec::None, DEFAULT_ZSTD_LEVEL).unwrap());
        sink.put_chunk(&[0], &one_chunk()).unwrap();
        sink.finalize().unwrap();

        let meta_path = dest.join(META_FILE);
        let text = fs::read_to_string(&meta_path).unwrap();
        fs::write(&meta_path, text.replace("Float64", "Float32")).unwrap();
        assert!(DirArray::open(&dest).is_err());
        let _ = fs::remove_dir_all(&root);
    }
}
