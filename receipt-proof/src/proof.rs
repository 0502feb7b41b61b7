use alloy::primitives::{keccak256, B256};
use log::trace;

use crate::errors::ProofError;

pub type ProofResult<T> = Result<T, ProofError>;
pub const HASH_LENGTH: usize = 32;

/// One level of an authentication path.
///
/// The digest carried up from the level below sits between `left` and `right`; the parent digest is
/// `keccak256(left[0] ‖ .. ‖ left[n] ‖ current ‖ right[0] ‖ .. ‖ right[m])`. For a binary tree this degenerates to a
/// single sibling whose position flag is the side it appears on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProofNode {
    pub left: Vec<B256>,
    pub right: Vec<B256>,
}

impl ProofNode {
    pub fn new(left: Vec<B256>, right: Vec<B256>) -> Self {
        ProofNode { left, right }
    }

    /// Parses the hex form nodes use on the wire. Every entry must decode to exactly [HASH_LENGTH] bytes.
    pub fn from_hex<S: AsRef<str>>(left: &[S], right: &[S]) -> ProofResult<Self> {
        Ok(ProofNode {
            left: left.iter().map(parse_hash).collect::<ProofResult<_>>()?,
            right: right.iter().map(parse_hash).collect::<ProofResult<_>>()?,
        })
    }

    /// Hashes `current` together with this level's siblings.
    pub fn parent_of(&self, current: B256) -> B256 {
        let mut input = Vec::with_capacity((self.left.len() + self.right.len() + 1) * HASH_LENGTH);
        for sibling in &self.left {
            input.extend_from_slice(sibling.as_slice());
        }
        input.extend_from_slice(current.as_slice());
        for sibling in &self.right {
            input.extend_from_slice(sibling.as_slice());
        }
        keccak256(&input)
    }
}

fn parse_hash<S: AsRef<str>>(entry: S) -> ProofResult<B256> {
    let entry = entry.as_ref();
    let malformed = |reason: String| ProofError::MalformedHash {
        entry: entry.to_owned(),
        reason,
    };

    let bytes = hex::decode(entry.strip_prefix("0x").unwrap_or(entry))
        .map_err(|e| malformed(e.to_string()))?;
    if bytes.len() != HASH_LENGTH {
        return Err(malformed(format!(
            "expected {HASH_LENGTH} bytes, got {}",
            bytes.len()
        )));
    }

    Ok(B256::from_slice(&bytes))
}

/// Folds `leaf` up through `path`. An empty path means the leaf is the root.
pub fn compute_root(leaf: B256, path: &[ProofNode]) -> B256 {
    path.iter().fold(leaf, |current, node| node.parent_of(current))
}

/// Succeeds only if the root recomputed from `leaf` and `path` equals `root` byte-for-byte.
pub fn verify_proof(root: B256, leaf: B256, path: &[ProofNode]) -> ProofResult<()> {
    let computed = compute_root(leaf, path);
    trace!("leaf {leaf} with {} levels folds to {computed}", path.len());

    if computed != root {
        return Err(ProofError::RootMismatch {
            expected: root,
            computed,
        });
    }

    Ok(())
}
