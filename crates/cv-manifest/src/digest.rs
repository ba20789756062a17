//! SHA-256 helpers over hex-encoded hashes

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// SHA-256 of `data`, raw 32 bytes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 over the concatenation of two byte strings
pub fn sha256_pair(left: &[u8], right: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Drop a leading `0x` marker.
pub fn strip_hex_prefix(hash: &str) -> &str {
    hash.strip_prefix("0x")
        .or_else(|| hash.strip_prefix("0X"))
        .unwrap_or(hash)
}

/// Canonical form used for all comparisons: trimmed, unprefixed, lowercase.
pub fn normalize_hash(hash: &str) -> String {
    strip_hex_prefix(hash.trim()).to_ascii_lowercase()
}
