use bcos_stub::{
    deploy::DeployRequest,
    test_util::{GREETER_ABI, HELLO_ABI},
    StubError,
};

use crate::Stub;

#[tokio::test]
async fn deploy_and_register() {
    let stub = Stub::new();

    let address = stub.deploy("Hello", "Hello", "1", &[]).await.unwrap();

    assert_eq!(
        stub.chain.code_at(address).unwrap().to_vec(),
        vec![0x60, 0x80, 0x60, 0x40, 0x01]
    );
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), Some(address));
    assert_eq!(
        stub.cns.resolve_abi("Hello").await.unwrap().as_deref(),
        Some(HELLO_ABI)
    );
    // One transaction to create the contract and one to register it.
    assert_eq!(stub.chain.sends(), 2);
    assert_eq!(stub.chain.height(), 2);
}

#[tokio::test]
async fn new_version_supersedes_old() {
    let stub = Stub::new();

    let v1 = stub.deploy("Hello", "Hello", "1", &[]).await.unwrap();
    let v2 = stub.deploy("Hello", "Hello", "2", &[]).await.unwrap();

    assert_ne!(v1, v2);
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), Some(v2));
    assert_eq!(stub.cns.select_by_name("Hello").await.unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_version_is_rejected_before_sending() {
    let stub = Stub::new();
    stub.deploy("Hello", "Hello", "1", &[]).await.unwrap();
    let sends = stub.chain.sends();
    let compilations = stub.compiler.compilations();

    let result = stub.deploy("Hello", "Hello", "1", &[]).await;

    assert_eq!(
        result,
        Err(StubError::DuplicateVersion {
            name: "Hello".to_owned(),
            version: "1".to_owned()
        })
    );
    assert_eq!(stub.chain.sends(), sends);
    assert_eq!(stub.compiler.compilations(), compilations);
}

#[tokio::test]
async fn constructor_args_are_appended_to_code() {
    let stub = Stub::new();

    let address = stub
        .deploy("Greeter", "Greeter", "1", &["hello", "3"])
        .await
        .unwrap();

    let code = stub.chain.code_at(address).unwrap();
    let args = ethabi::encode(&[
        ethabi::Token::String("hello".to_owned()),
        ethabi::Token::Uint(3u64.into()),
    ]);
    assert_eq!(code[..5].to_vec(), vec![0x60, 0x80, 0x60, 0x40, 0x02]);
    assert_eq!(code[5..].to_vec(), args);
    assert_eq!(
        stub.cns.resolve_abi("Greeter").await.unwrap().as_deref(),
        Some(GREETER_ABI)
    );
}

#[tokio::test]
async fn missing_constructor_args() {
    let stub = Stub::new();

    let result = stub.deploy("Greeter", "Greeter", "1", &[]).await;

    assert_eq!(
        result,
        Err(StubError::MissingConstructorArgs("Greeter".to_owned()))
    );
    assert!(result.unwrap_err().is_input_error());
    assert_eq!(stub.chain.sends(), 0);
}

#[tokio::test]
async fn unencodable_constructor_args() {
    let stub = Stub::new();

    let wrong_count = stub.deploy("Greeter", "Greeter", "1", &["hello"]).await;
    let wrong_type = stub
        .deploy("Greeter", "Greeter", "1", &["hello", "three"])
        .await;

    for result in [wrong_count, wrong_type] {
        match result {
            Err(StubError::ConstructorEncoding { contract, .. }) => assert_eq!(contract, "Greeter"),
            result => panic!("unexpected result: {result:?}"),
        }
    }
    assert_eq!(stub.chain.sends(), 0);
}

#[tokio::test]
async fn compile_failure() {
    let stub = Stub::new();

    let result = stub.deploy("Missing", "Missing", "1", &[]).await;

    assert!(matches!(result, Err(StubError::Compile(_))), "{result:?}");
    assert_eq!(stub.chain.sends(), 0);
}

#[tokio::test]
async fn corrupt_proof_stops_registration() {
    let stub = Stub::new();
    stub.chain.set_corrupt_proofs(true);

    let result = stub.deploy("Hello", "Hello", "1", &[]).await;

    assert!(matches!(result, Err(StubError::ProofMismatch(_))), "{result:?}");
    assert_eq!(stub.chain.sends(), 1);
    assert!(stub.chain.cns_entries().is_empty());
}

#[tokio::test]
async fn missing_header_stops_registration() {
    let stub = Stub::new();
    stub.chain.set_headers_unavailable(true);

    let result = stub.deploy("Hello", "Hello", "1", &[]).await;

    assert!(
        matches!(result, Err(StubError::BlockHeaderUnavailable(_))),
        "{result:?}"
    );
    assert!(stub.chain.cns_entries().is_empty());
}

#[tokio::test]
async fn rejected_transaction() {
    let stub = Stub::new();
    stub.chain.set_rejection(Some("permission denied"));

    let result = stub.deploy("Hello", "Hello", "1", &[]).await;

    assert_eq!(
        result,
        Err(StubError::ChainRejected("permission denied".to_owned()))
    );
    assert!(!result.unwrap_err().is_input_error());
}

#[tokio::test]
async fn incomplete_request() {
    let result = DeployRequest::from_args(&["Hello", "contract Hello {}"]);
    assert_eq!(
        result,
        Err(StubError::InvalidArgs("incomplete args".to_owned()))
    );
}

#[tokio::test]
async fn registration_fails_after_verified_deploy() {
    let stub = Stub::new();
    stub.chain.set_registration_rejection(Some("CNS permission denied"));

    let result = stub.deploy("Hello", "Hello", "1", &[]).await;

    assert_eq!(
        result,
        Err(StubError::ChainRejected("CNS permission denied".to_owned()))
    );
    // The contract was created and verified; only its registration was refused.
    assert_eq!(stub.chain.sends(), 2);
    assert_eq!(stub.chain.height(), 1);
    assert!(stub.chain.cns_entries().is_empty());
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), None);
}
