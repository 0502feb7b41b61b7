use alloy::primitives::{keccak256, B256};

use crate::proof::{ProofNode, HASH_LENGTH};

/// Number of children hashed together at each level of the receipts trie.
pub const BRANCH_FACTOR: usize = 16;

/// A receipts trie built bottom-up from leaf digests.
///
/// Level 0 holds the leaves. Each higher level hashes consecutive groups of up to [BRANCH_FACTOR] digests from the
/// level below, until one digest remains. A tree with one leaf has that leaf as its root and every proof is empty.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<B256>>,
}

impl MerkleTree {
    pub fn new(leaves: Vec<B256>) -> Self {
        let mut levels = vec![leaves];

        while levels.last().map_or(0, Vec::len) > 1 {
            let below = levels.last().map(Vec::as_slice).unwrap_or_default();
            let above = below
                .chunks(BRANCH_FACTOR)
                .map(|group| {
                    let mut input = Vec::with_capacity(group.len() * HASH_LENGTH);
                    for digest in group {
                        input.extend_from_slice(digest.as_slice());
                    }
                    keccak256(&input)
                })
                .collect();
            levels.push(above);
        }

        MerkleTree { levels }
    }

    /// Root of the tree. The root of an empty tree is the hash of no input.
    pub fn root(&self) -> B256 {
        self.levels
            .last()
            .and_then(|level| level.first().copied())
            .unwrap_or_else(|| keccak256(b""))
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Authentication path for the leaf at `index`, or `None` if there is no such leaf.
    pub fn proof(&self, index: usize) -> Option<Vec<ProofNode>> {
        if index >= self.len() {
            return None;
        }

        let mut path = Vec::with_capacity(self.levels.len().saturating_sub(1));
        let mut position = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let start = position - position % BRANCH_FACTOR;
            let end = (start + BRANCH_FACTOR).min(level.len());
            path.push(ProofNode::new(
                level[start..position].to_vec(),
                level[position + 1..end].to_vec(),
            ));
            position /= BRANCH_FACTOR;
        }

        Some(path)
    }
}
