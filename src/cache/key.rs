//! Key Hashing Module
//!
//! Maps caller-supplied keys onto fixed-length, filesystem-safe store keys.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept (128 bits)
const DIGEST_BYTES: usize = 16;

// == Hash Key ==
/// Hashes an arbitrary logical key into a 32-character lowercase hex key.
///
/// The SHA-256 digest of the UTF-8 bytes is truncated to 128 bits. Collisions
/// are not detected.
pub fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..DIGEST_BYTES])
}
