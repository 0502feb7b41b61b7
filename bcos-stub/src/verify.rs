use alloy::primitives::B256;
use receipt_proof::verify_proof;
use tracing::{debug, warn};

use crate::{
    block_header::BlockHeader,
    error::{Result, StubError},
    transaction::TransactionReceipt,
};

/// Checks that `receipt` is the receipt of transaction `transaction_hash`, included in block `block_number` whose
/// header is `header`.
///
/// The receipt is trusted only if its authentication path folds up to `header.receipts_root`. Any failure is a
/// [StubError::ProofMismatch].
pub fn verify_transaction_receipt_proof(
    block_number: u64,
    transaction_hash: B256,
    header: &BlockHeader,
    receipt: &TransactionReceipt,
) -> Result<()> {
    let mismatch = |reason: String| {
        warn!(block_number, %transaction_hash, reason = %reason, "receipt verification failed");
        StubError::ProofMismatch(reason)
    };

    if header.number != block_number {
        return Err(mismatch(format!(
            "header is for block {}, expected {block_number}",
            header.number
        )));
    }
    if receipt.block_number != block_number {
        return Err(mismatch(format!(
            "receipt is for block {}, expected {block_number}",
            receipt.block_number
        )));
    }
    if receipt.transaction_hash != transaction_hash {
        return Err(mismatch(format!(
            "receipt is for transaction {}, expected {transaction_hash}",
            receipt.transaction_hash
        )));
    }

    let path = receipt.proof().map_err(|e| mismatch(e.to_string()))?;
    verify_proof(header.receipts_root, receipt.leaf_hash(), &path)
        .map_err(|e| mismatch(e.to_string()))?;

    debug!(block_number, %transaction_hash, levels = path.len(), "receipt verified");
    Ok(())
}
