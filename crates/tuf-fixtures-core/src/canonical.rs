//! Canonical encoding and content digests
//!
//! Signatures are computed over the canonical (RFC 8785) encoding of the
//! `signed` body, so identical inputs always produce byte-identical signing
//! payloads regardless of how maps were built.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

/// Canonical byte encoding of a value
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_jcs::to_vec(value)?)
}

/// Hex-encoded SHA-256 of some bytes
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hex-encoded SHA-512 of some bytes
pub fn sha512_hex(bytes: &[u8]) -> String {
    hex::encode(Sha512::digest(bytes))
}

/// The digests recorded for targets and referenced metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hashes {
    pub sha256: String,
    pub sha512: String,
}

impl Hashes {
    /// Digest some content with every supported algorithm
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            sha256: sha256_hex(bytes),
            sha512: sha512_hex(bytes),
        }
    }
}
