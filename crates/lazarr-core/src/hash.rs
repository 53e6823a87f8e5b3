//! Stable fingerprints for metadata documents and chunk payloads.

use serde::Serialize;

use crate::error::Result;

/// Hex blake3 fingerprint of any serde-serializable value (via JSON).
/// Used to stamp container metadata so tampering is detectable.
pub fn fingerprint_serde<T: Serialize>(v: &T) -> Result<String> {
    let bytes = serde_json::to_vec(v)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// Cheap 64-bit payload checksum (leading bytes of blake3), stored in
/// every chunk frame and verified on read.
pub fn checksum64(bytes: &[u8]) -> u64 {
    let hash = blake3::hash(bytes);
    u64::from_le_bytes(hash.as_bytes()[0..8].try_into().unwrap_or([0; 8]))
}
