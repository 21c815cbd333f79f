//! Request fingerprinting.
//!
//! A cache key is the SHA-256 digest of a canonical, length-prefixed encoding
//! of the semantic fields of an [`ExecutionRequest`]. The encoding is fixed:
//! changing it invalidates every key already held by the shared cache, so any
//! change must bump [`DOMAIN_RUN_QUIL`].

use sha2::{Digest, Sha256};

use crate::types::{CacheKey, ExecutionRequest};

/// Domain separation tag for run-quil fingerprints.
pub const DOMAIN_RUN_QUIL: &[u8] = b"qpu-gateway/run-quil/v1";

/// Derive the cache key for a request.
///
/// Only program, backend, shot count and parameters participate;
/// `metadata` is ignored.
pub fn derive(request: &ExecutionRequest) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RUN_QUIL);
    update_len_prefixed(&mut hasher, request.program.as_bytes());
    update_len_prefixed(&mut hasher, request.backend.as_bytes());
    hasher.update(request.shots.to_be_bytes());

    // BTreeMap iteration is ordered by name, so insertion order is irrelevant.
    hasher.update((request.params.len() as u64).to_be_bytes());
    for (name, value) in &request.params {
        update_len_prefixed(&mut hasher, name.as_bytes());
        hasher.update(canonical_f64_bits(*value).to_be_bytes());
    }

    CacheKey::from_bytes(hasher.finalize().into())
}

fn update_len_prefixed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// IEEE-754 bits with `-0.0` folded into `0.0` and a single NaN pattern.
fn canonical_f64_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}
