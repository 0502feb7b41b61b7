//! [Connection] and [BlockHeaderManager] backed by a BCOS 2.x node's JSON-RPC API.

use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use jsonrpsee::{
    core::{client::ClientT, ClientError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, trace, warn};

use crate::{
    block_header::{BlockHeader, BlockHeaderManager},
    cfg::ChannelServiceConfig,
    connection::{
        Connection, Properties, Request, RequestKind, Response, NODE_ERROR, TRANSPORT_ERROR,
    },
    error::{Result, StubError},
    serde_util::quantity,
    transaction::{CallOutput, MerkleProofUnit, TransactionParams, TransactionReceipt},
};

/// Error code a BCOS 2.x node answers with when asked for a block it does not have.
pub const BLOCK_NUMBER_NOT_EXIST: i32 = -40004;

pub fn http_client(config: &ChannelServiceConfig) -> anyhow::Result<HttpClient> {
    Ok(HttpClientBuilder::default()
        .request_timeout(config.request_timeout())
        .build(&config.rpc_url)?)
}

pub struct JsonRpcConnection {
    client: HttpClient,
    group_id: u64,
    properties: Properties,
    receipt_poll_attempts: u32,
    receipt_poll_interval: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptWithProof {
    transaction_receipt: TransactionReceipt,
    #[serde(default)]
    receipt_proof: Vec<MerkleProofUnit>,
}

impl JsonRpcConnection {
    pub fn new(
        client: HttpClient,
        config: &ChannelServiceConfig,
        group_id: u64,
        properties: Properties,
    ) -> Self {
        JsonRpcConnection {
            client,
            group_id,
            properties,
            receipt_poll_attempts: config.receipt_poll_attempts,
            receipt_poll_interval: config.receipt_poll_interval(),
        }
    }

    async fn call(&self, params: &TransactionParams) -> std::result::Result<CallOutput, Response> {
        let call = json!({
            "from": params.from,
            "to": params.to,
            "value": "0x0",
            "data": params.data,
        });
        self.client
            .request("call", rpc_params![self.group_id, call])
            .await
            .map_err(error_response)
    }

    async fn send_transaction(
        &self,
        params: &TransactionParams,
    ) -> std::result::Result<TransactionReceipt, Response> {
        let hash: B256 = self
            .client
            .request("sendRawTransaction", rpc_params![self.group_id, &params.data])
            .await
            .map_err(error_response)?;
        debug!(%hash, "transaction accepted by node");

        for attempt in 1..=self.receipt_poll_attempts {
            let found: Option<ReceiptWithProof> = self
                .client
                .request(
                    "getTransactionReceiptByHashWithProof",
                    rpc_params![self.group_id, hash],
                )
                .await
                .map_err(error_response)?;
            if let Some(ReceiptWithProof {
                mut transaction_receipt,
                receipt_proof,
            }) = found
            {
                if transaction_receipt.receipt_proof.is_empty() {
                    transaction_receipt.receipt_proof = receipt_proof;
                }
                return Ok(transaction_receipt);
            }
            trace!(%hash, attempt, "receipt not available yet");
            tokio::time::sleep(self.receipt_poll_interval).await;
        }

        Err(Response::error(
            TRANSPORT_ERROR,
            format!(
                "no receipt for {hash} after {} attempts",
                self.receipt_poll_attempts
            ),
        ))
    }
}

#[async_trait]
impl Connection for JsonRpcConnection {
    async fn send(&self, request: Request) -> Response {
        let params: TransactionParams = match serde_json::from_slice(&request.payload) {
            Ok(params) => params,
            Err(e) => return Response::error(TRANSPORT_ERROR, format!("malformed request: {e}")),
        };

        match request.kind {
            RequestKind::Call => to_response(self.call(&params).await),
            RequestKind::SendTransaction => to_response(self.send_transaction(&params).await),
        }
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }
}

fn to_response<T: Serialize>(result: std::result::Result<T, Response>) -> Response {
    match result {
        Ok(data) => match serde_json::to_vec(&data) {
            Ok(data) => Response::success(data),
            Err(e) => Response::error(TRANSPORT_ERROR, e.to_string()),
        },
        Err(response) => response,
    }
}

/// A JSON-RPC error object came from the node; anything else means the node was not reached.
fn error_response(error: ClientError) -> Response {
    match error {
        ClientError::Call(e) => Response::error(NODE_ERROR, e.message()),
        e => {
            warn!(error = %e, "JSON-RPC request failed");
            Response::error(TRANSPORT_ERROR, e.to_string())
        }
    }
}

pub struct RpcBlockHeaderManager {
    client: HttpClient,
    group_id: u64,
}

impl RpcBlockHeaderManager {
    pub fn new(client: HttpClient, group_id: u64) -> Self {
        RpcBlockHeaderManager { client, group_id }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: jsonrpsee::core::params::ArrayParams,
    ) -> std::result::Result<T, ClientError> {
        self.client.request(method, params).await
    }
}

#[async_trait]
impl BlockHeaderManager for RpcBlockHeaderManager {
    async fn block_number(&self) -> Result<u64> {
        let number: String = self
            .request("getBlockNumber", rpc_params![self.group_id])
            .await
            .map_err(|e| StubError::BlockNumberUnavailable(e.to_string()))?;
        quantity::parse(&number)
            .map_err(|e| StubError::BlockNumberUnavailable(format!("{number:?}: {e}")))
    }

    async fn block_header(&self, number: u64) -> Result<Option<Vec<u8>>> {
        let header: std::result::Result<Option<BlockHeader>, _> = self
            .request(
                "getBlockHeaderByNumber",
                rpc_params![self.group_id, format!("{number:#x}"), false],
            )
            .await;

        match header {
            Ok(header) => Ok(header.map(|h| h.encode())),
            Err(ClientError::Call(e)) if e.code() == BLOCK_NUMBER_NOT_EXIST => {
                debug!(number, error = e.message(), "block header not found");
                Ok(None)
            }
            Err(ClientError::Call(e)) => Err(StubError::BlockHeaderUnavailable(format!(
                "block {number}: {} ({})",
                e.message(),
                e.code()
            ))),
            Err(e) => Err(StubError::BlockHeaderUnavailable(e.to_string())),
        }
    }
}
