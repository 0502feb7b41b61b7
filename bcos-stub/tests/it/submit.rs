use alloy::primitives::{keccak256, Address, Bytes};
use bcos_stub::{
    block_header::{BlockHeader, BlockHeaderManager},
    submitter::TransactionSpec,
    transaction::{SignedTransaction, TransactionRequest, BLOCK_LIMIT_OFFSET},
    StubError,
};

use crate::Stub;

fn set_request() -> TransactionRequest {
    TransactionRequest::new("set", vec!["hello".to_owned()])
}

#[tokio::test]
async fn send_transaction_is_verified() {
    let stub = Stub::new();
    let to = Address::repeat_byte(0x42);

    let receipt = stub
        .submitter
        .send_transaction(
            to,
            set_request(),
            Bytes::from_static(&[0xde, 0xad]),
            &stub.credentials,
        )
        .await
        .unwrap();

    assert!(receipt.is_status_ok());
    assert_eq!(receipt.to, Some(to));
    assert_eq!(receipt.from, Some(stub.credentials.address()));
    assert_eq!(receipt.block_number, 1);
    assert!(!receipt.receipt_proof.is_empty());

    let header = stub.submitter.confirm(&receipt).await.unwrap();
    assert_eq!(header.number, receipt.block_number);
}

#[tokio::test]
async fn transaction_is_signed_for_the_connection() {
    let stub = Stub::new();
    let spec = TransactionSpec::send(
        Address::repeat_byte(0x42),
        set_request(),
        Bytes::from_static(&[0x01]),
    );

    let (hash, receipt) = stub
        .submitter
        .sign_and_send(&spec, &stub.credentials)
        .await
        .unwrap();

    assert_eq!(receipt.transaction_hash, hash);
    // The node checks group id, chain id and block limit before sealing.
    let header = stub
        .submitter
        .confirm_transaction(hash, &receipt)
        .await
        .unwrap();
    assert_eq!(header.number, 1);
}

#[tokio::test]
async fn block_limit_is_offset_from_current_height() {
    let stub = Stub::new();
    for _ in 0..3 {
        stub.submitter
            .send_transaction(Address::ZERO, set_request(), Bytes::new(), &stub.credentials)
            .await
            .unwrap();
    }
    let height = stub.chain.block_number().await.unwrap();
    assert_eq!(height, 3);

    let signed = bcos_stub::transaction::sign_transaction(
        &stub.credentials,
        None,
        1,
        1,
        height,
        &[0x60, 0x80],
    )
    .unwrap();
    let signed = SignedTransaction::from_hex(&signed).unwrap();

    assert_eq!(signed.tx.block_limit, height + BLOCK_LIMIT_OFFSET);
    assert_eq!(signed.recover_signer().unwrap(), stub.credentials.address());
}

#[tokio::test]
async fn receipt_for_another_transaction_is_rejected() {
    let stub = Stub::new();
    let receipt = stub
        .submitter
        .send_transaction(Address::ZERO, set_request(), Bytes::new(), &stub.credentials)
        .await
        .unwrap();

    let other = keccak256(b"another transaction");
    let result = stub.submitter.confirm_transaction(other, &receipt).await;

    assert!(matches!(result, Err(StubError::ProofMismatch(_))), "{result:?}");
}

#[tokio::test]
async fn tampered_receipt_is_rejected() {
    let stub = Stub::new();
    let mut receipt = stub
        .submitter
        .send_transaction(Address::ZERO, set_request(), Bytes::new(), &stub.credentials)
        .await
        .unwrap();

    receipt.gas_used += 1;
    let result = stub.submitter.confirm(&receipt).await;

    assert!(matches!(result, Err(StubError::ProofMismatch(_))), "{result:?}");
}

#[tokio::test]
async fn receipt_claiming_wrong_block_is_rejected() {
    let stub = Stub::new();
    let spec = TransactionSpec::send(Address::ZERO, set_request(), Bytes::new());
    stub.submitter.submit(&spec, &stub.credentials).await.unwrap();
    let mut receipt = stub.submitter.submit(&spec, &stub.credentials).await.unwrap();

    receipt.block_number -= 1;
    let result = stub.submitter.confirm(&receipt).await;

    assert!(matches!(result, Err(StubError::ProofMismatch(_))), "{result:?}");
}

#[tokio::test]
async fn missing_header() {
    let stub = Stub::new();
    assert_eq!(stub.chain.block_header(999).await.unwrap(), None);

    stub.chain.set_headers_unavailable(true);
    let result = stub
        .submitter
        .send_transaction(Address::ZERO, set_request(), Bytes::new(), &stub.credentials)
        .await;

    assert!(
        matches!(result, Err(StubError::BlockHeaderUnavailable(_))),
        "{result:?}"
    );
}

#[tokio::test]
async fn headers_match_the_chain() {
    let stub = Stub::new();
    for _ in 0..2 {
        stub.submitter
            .send_transaction(Address::ZERO, set_request(), Bytes::new(), &stub.credentials)
            .await
            .unwrap();
    }

    let parent = BlockHeader::decode(&stub.chain.block_header(1).await.unwrap().unwrap()).unwrap();
    let child = BlockHeader::decode(&stub.chain.block_header(2).await.unwrap().unwrap()).unwrap();

    assert_eq!(child.parent_hash, parent.hash);
    assert_eq!(child.number, 2);
}

#[tokio::test]
async fn call_reads_without_sending() {
    let stub = Stub::new();

    let output = stub
        .submitter
        .call(&TransactionSpec::cns_select_by_name("Hello").unwrap())
        .await
        .unwrap();

    assert!(output.is_status_ok());
    assert_eq!(output.current_block_number, 0);
    assert_eq!(stub.chain.sends(), 0);
    assert_eq!(stub.chain.calls(), 1);
}

#[tokio::test]
async fn failed_call_is_chain_rejected() {
    let stub = Stub::new();
    stub.chain.set_call_failure(Some("execution reverted"));

    let result = stub
        .submitter
        .call(&TransactionSpec::cns_select_by_name("Hello").unwrap())
        .await;

    assert_eq!(
        result.map(|output| output.status),
        Err(StubError::ChainRejected("execution reverted".to_owned()))
    );
}
