use std::{num::NonZeroUsize, time::Duration};

use alloy::primitives::Address;
use bcos_stub::{
    cns::{CnsConfig, CnsInfo},
    test_util::HELLO_ABI,
    StubError,
};
use futures::future::join_all;

use crate::Stub;

fn hello(version: &str, address: &str) -> CnsInfo {
    CnsInfo {
        name: "Hello".to_owned(),
        version: version.to_owned(),
        address: address.to_owned(),
        abi: format!("{HELLO_ABI}/{version}"),
    }
}

#[tokio::test]
async fn select_filters_by_name_and_version() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain
        .insert_cns(hello("2", "0x00000000000000000000000000000000000000a2"));

    let all = stub.cns.select_by_name("Hello").await.unwrap();
    assert_eq!(all.len(), 2);

    let v2 = stub
        .cns
        .select_by_name_and_version("Hello", "2")
        .await
        .unwrap();
    assert_eq!(v2, vec![hello("2", "0x00000000000000000000000000000000000000a2")]);

    assert!(stub.cns.select_by_name("Nobody").await.unwrap().is_empty());
    assert!(stub
        .cns
        .select_by_name_and_version("Hello", "3")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn resolves_newest_version() {
    let stub = Stub::new();
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), None);
    assert_eq!(stub.cns.resolve_abi("Hello").await.unwrap(), None);

    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain
        .insert_cns(hello("2", "0x00000000000000000000000000000000000000a2"));

    let address = stub.cns.resolve_address("Hello").await.unwrap().unwrap();
    assert_eq!(
        address,
        "0x00000000000000000000000000000000000000a2"
            .parse::<Address>()
            .unwrap()
    );
    let abi = stub.cns.resolve_abi("Hello").await.unwrap().unwrap();
    assert_eq!(abi, format!("{HELLO_ABI}/2"));
}

#[tokio::test]
async fn invalid_registered_address() {
    let stub = Stub::new();
    stub.chain.insert_cns(hello("1", "not an address"));

    let result = stub.cns.resolve_address("Hello").await;
    assert!(matches!(result, Err(StubError::Transport(_))), "{result:?}");
}

#[tokio::test]
async fn abi_is_cached() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));

    let first = stub.cns.resolve_abi("Hello").await.unwrap();
    let calls = stub.chain.calls();
    let second = stub.cns.resolve_abi("Hello").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(stub.chain.calls(), calls);

    stub.cns.clear_abi_cache();
    stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(stub.chain.calls(), calls + 1);
}

#[tokio::test]
async fn absent_abi_is_not_cached() {
    let stub = Stub::new();

    assert_eq!(stub.cns.resolve_abi("Hello").await.unwrap(), None);
    let calls = stub.chain.calls();

    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    let abi = stub.cns.resolve_abi("Hello").await.unwrap();

    assert_eq!(abi, Some(format!("{HELLO_ABI}/1")));
    assert_eq!(stub.chain.calls(), calls + 1);
}

#[tokio::test]
async fn concurrent_lookups_share_one_call() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain.set_call_latency(Duration::from_millis(50));

    let calls = stub.chain.calls();
    let results = join_all((0..16).map(|_| stub.cns.resolve_abi("Hello"))).await;

    assert_eq!(stub.chain.calls(), calls + 1);
    for result in results {
        assert_eq!(result.unwrap(), Some(format!("{HELLO_ABI}/1")));
    }
}

#[tokio::test]
async fn lookups_of_different_names_do_not_wait_for_each_other() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain.set_call_latency(Duration::from_millis(50));

    let calls = stub.chain.calls();
    let (hello_abi, other_abi) = tokio::join!(
        stub.cns.resolve_abi("Hello"),
        stub.cns.resolve_abi("Other")
    );

    assert_eq!(stub.chain.calls(), calls + 2);
    assert!(hello_abi.unwrap().is_some());
    assert_eq!(other_abi.unwrap(), None);
}

#[tokio::test]
async fn concurrent_lookups_share_one_failure() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain.set_call_latency(Duration::from_millis(50));
    stub.chain.set_call_failure(Some("node is syncing"));

    let calls = stub.chain.calls();
    let results = join_all((0..12).map(|_| stub.cns.resolve_abi("Hello"))).await;

    assert_eq!(stub.chain.calls(), calls + 1);
    for result in results {
        assert_eq!(
            result,
            Err(StubError::ChainRejected("node is syncing".to_owned()))
        );
    }

    // The failure is not cached, so the next lookup goes to the node again.
    stub.chain.set_call_failure(None);
    let abi = stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(abi, Some(format!("{HELLO_ABI}/1")));
    assert_eq!(stub.chain.calls(), calls + 2);
}

#[tokio::test]
async fn least_recently_used_abi_is_evicted() {
    let stub = Stub::with_config(CnsConfig {
        cache_capacity: NonZeroUsize::new(1).unwrap(),
        ..Default::default()
    });
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));
    stub.chain.insert_cns(CnsInfo {
        name: "World".to_owned(),
        ..hello("1", "0x00000000000000000000000000000000000000a2")
    });

    let calls = stub.chain.calls();
    stub.cns.resolve_abi("Hello").await.unwrap();
    stub.cns.resolve_abi("World").await.unwrap();
    stub.cns.resolve_abi("World").await.unwrap();
    assert_eq!(stub.chain.calls(), calls + 2);

    stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(stub.chain.calls(), calls + 3);
}

#[tokio::test(start_paused = true)]
async fn cache_is_cleared_periodically() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));

    stub.cns.resolve_abi("Hello").await.unwrap();
    let calls = stub.chain.calls();

    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(stub.chain.calls(), calls);

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(stub.chain.calls(), calls + 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_clearing() {
    let stub = Stub::new();
    stub.chain
        .insert_cns(hello("1", "0x00000000000000000000000000000000000000a1"));

    stub.cns.resolve_abi("Hello").await.unwrap();
    let calls = stub.chain.calls();
    stub.cns.shutdown();

    tokio::time::sleep(Duration::from_secs(2 * 60 * 60)).await;
    stub.cns.resolve_abi("Hello").await.unwrap();
    assert_eq!(stub.chain.calls(), calls);
}

#[tokio::test]
async fn register_then_resolve() {
    let stub = Stub::new();
    let address = "0x00000000000000000000000000000000000000b7"
        .parse::<Address>()
        .unwrap();

    stub.cns
        .register("Hello", "1", address, HELLO_ABI, &stub.credentials)
        .await
        .unwrap();

    assert_eq!(stub.chain.cns_entries().len(), 1);
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), Some(address));
    assert_eq!(
        stub.cns.resolve_abi("Hello").await.unwrap().as_deref(),
        Some(HELLO_ABI)
    );
}

#[tokio::test]
async fn register_with_unverifiable_receipt() {
    let stub = Stub::new();
    let address = "0x00000000000000000000000000000000000000b7"
        .parse::<Address>()
        .unwrap();
    stub.chain.set_corrupt_proofs(true);

    let result = stub
        .cns
        .register("Hello", "1", address, HELLO_ABI, &stub.credentials)
        .await;

    assert!(matches!(result, Err(StubError::ProofMismatch(_))), "{result:?}");
    // The node sealed the insert, but its receipt could not be authenticated.
    assert_eq!(stub.chain.cns_entries().len(), 1);
}

#[tokio::test]
async fn register_without_block_header() {
    let stub = Stub::new();
    let address = "0x00000000000000000000000000000000000000b7"
        .parse::<Address>()
        .unwrap();
    stub.chain.set_headers_unavailable(true);

    let result = stub
        .cns
        .register("Hello", "1", address, HELLO_ABI, &stub.credentials)
        .await;

    assert!(
        matches!(result, Err(StubError::BlockHeaderUnavailable(_))),
        "{result:?}"
    );
}

#[tokio::test]
async fn register_rejected_by_node() {
    let stub = Stub::new();
    let address = "0x00000000000000000000000000000000000000b7"
        .parse::<Address>()
        .unwrap();
    stub.chain.set_rejection(Some("permission denied"));

    let result = stub
        .cns
        .register("Hello", "1", address, HELLO_ABI, &stub.credentials)
        .await;

    assert_eq!(
        result,
        Err(StubError::ChainRejected("permission denied".to_owned()))
    );
    assert!(stub.chain.cns_entries().is_empty());
    assert_eq!(stub.cns.resolve_address("Hello").await.unwrap(), None);
}
