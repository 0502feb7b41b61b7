use alloy::primitives::B256;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("malformed proof entry {entry:?}: {reason}")]
    MalformedHash { entry: String, reason: String },
    #[error("receipts root mismatch: expected {expected}, computed {computed}")]
    RootMismatch { expected: B256, computed: B256 },
}
