//! Irreversible identity hashing.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept.
const HASHED_ID_BYTES: usize = 8;

/// Length of a hashed identity in hex characters.
pub const HASHED_ID_LEN: usize = HASHED_ID_BYTES * 2;

/// Hash an identity for storage.
///
/// SHA-256 digest of the UTF-8 identity, truncated to 8 bytes and
/// hex-encoded. An absent identity hashes to the empty string.
#[must_use]
pub fn hash_id(id: Option<&str>) -> String {
    let Some(id) = id else {
        return String::new();
    };
    let digest = Sha256::digest(id.as_bytes());
    digest[..HASHED_ID_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
