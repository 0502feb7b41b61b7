use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Result;
use tracing::info;

use crate::{
    cfg::StubConfig,
    cns::{CnsConfig, CnsService},
    connection::{Properties, BCOS_CHAIN_ID, BCOS_GROUP_ID},
    jsonrpc::{self, JsonRpcConnection, RpcBlockHeaderManager},
    submitter::TransactionSubmitter,
};

/// A connection to one chain, built from its `stub.toml`.
pub struct StubConnection {
    pub config: StubConfig,
    pub connection: Arc<JsonRpcConnection>,
    pub block_header_manager: Arc<RpcBlockHeaderManager>,
}

impl StubConnection {
    pub fn submitter(&self) -> TransactionSubmitter {
        TransactionSubmitter::new(self.connection.clone(), self.block_header_manager.clone())
    }

    /// Starts a CNS service for this chain with the `[cns]` cache settings. Must be called from within a Tokio
    /// runtime.
    pub fn cns_service(&self) -> crate::Result<CnsService> {
        CnsService::start(
            self.connection.clone(),
            self.block_header_manager.clone(),
            CnsConfig::from(&self.config.cns),
        )
    }
}

pub fn build(stub_config_path: impl AsRef<Path>) -> Result<StubConnection> {
    let path = stub_config_path.as_ref();
    info!(path = %path.display(), "loading stub config");
    build_from_config(StubConfig::load(path)?)
}

/// Creates the node client and publishes the chain coordinates and every configured resource as connection
/// properties. No request is sent to the node.
pub fn build_from_config(config: StubConfig) -> Result<StubConnection> {
    let mut properties = HashMap::from([
        (BCOS_GROUP_ID.to_owned(), config.chain.group_id.to_string()),
        (BCOS_CHAIN_ID.to_owned(), config.chain.chain_id.to_string()),
    ]);
    for resource in &config.resources {
        properties.insert(resource.name.clone(), resource.value.clone());
    }

    let client = jsonrpc::http_client(&config.channel_service)?;
    let connection = JsonRpcConnection::new(
        client.clone(),
        &config.channel_service,
        config.chain.group_id,
        Properties::new(properties),
    );
    let block_header_manager = RpcBlockHeaderManager::new(client, config.chain.group_id);
    info!(
        rpc_url = %config.channel_service.rpc_url,
        group_id = config.chain.group_id,
        resources = config.resources.len(),
        "connection built"
    );

    Ok(StubConnection {
        config,
        connection: Arc::new(connection),
        block_header_manager: Arc::new(block_header_manager),
    })
}
