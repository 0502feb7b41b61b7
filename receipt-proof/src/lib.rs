//! ## Description
//!
//! Authentication paths over a BCOS receipts trie.
//!
//! A block commits to all of its transaction receipts through a single root in its header. Each level of the tree
//! hashes up to [BRANCH_FACTOR] children together, so a proof for one receipt lists, per level, the sibling digests
//! that sit to the left and to the right of the digest being carried upwards.
//!
//! ## Usage
//!
//! ```rust
//! use alloy::primitives::keccak256;
//! use receipt_proof::{verify_proof, MerkleTree};
//!
//! let leaves: Vec<_> = (0u8..20).map(|i| keccak256([i])).collect();
//! let tree = MerkleTree::new(leaves.clone());
//!
//! let path = tree.proof(7).unwrap();
//! assert!(verify_proof(tree.root(), leaves[7], &path).is_ok());
//! assert!(verify_proof(tree.root(), leaves[8], &path).is_err());
//! ```

mod errors;
mod proof;
mod tree;

pub use errors::ProofError;
pub use proof::{compute_root, verify_proof, ProofNode, ProofResult, HASH_LENGTH};
pub use tree::{MerkleTree, BRANCH_FACTOR};
