//! Merkle root reconstruction
//!
//! Leaves are paired in order; each pair's raw bytes are concatenated and
//! hashed into the next layer. An unpaired last element is carried into the
//! next layer untouched until it finds a partner.

use crate::digest::{normalize_hash, sha256_pair};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MerkleError {
    #[error("manifest has no leaves")]
    Empty,

    #[error("leaf {index} is not valid hex: {reason}")]
    InvalidLeaf { index: usize, reason: String },
}

/// Rebuild the root of `leaves` as lowercase hex.
///
/// Leaves may carry a `0x` prefix. A single leaf is its own root.
pub fn merkle_root<S: AsRef<str>>(leaves: &[S]) -> Result<String, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::Empty);
    }

    let mut layer = leaves
        .iter()
        .enumerate()
        .map(|(index, leaf)| {
            hex::decode(normalize_hash(leaf.as_ref())).map_err(|e| MerkleError::InvalidLeaf {
                index,
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<Vec<u8>>, _>>()?;

    while layer.len() > 1 {
        let next = layer
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => sha256_pair(left, right).to_vec(),
                _ => pair[0].clone(),
            })
            .collect();
        layer = next;
    }

    Ok(hex::encode(&layer[0]))
}
