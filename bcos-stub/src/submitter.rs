use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256};
use tracing::{debug, info, trace, warn};

use crate::{
    block_header::{BlockHeader, BlockHeaderManager},
    connection::{Connection, Request, RequestKind},
    contracts::cns,
    crypto::Credentials,
    error::{Result, StubError},
    transaction::{
        CallOutput, RawTransaction, TransactionParams, TransactionReceipt, TransactionRequest,
        TxType,
    },
    verify::verify_transaction_receipt_proof,
};

pub const METHOD_DEPLOY: &str = "deploy";

/// A call or transaction to be sent to the chain, before it is signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSpec {
    pub request: TransactionRequest,
    /// `None` deploys `data` as contract code.
    pub to: Option<Address>,
    /// ABI-encoded input, or contract bytecode for a deployment.
    pub data: Bytes,
    pub tx_type: TxType,
}

impl TransactionSpec {
    pub fn call(to: Address, request: TransactionRequest, data: impl Into<Bytes>) -> Self {
        TransactionSpec {
            request,
            to: Some(to),
            data: data.into(),
            tx_type: TxType::Call,
        }
    }

    pub fn send(to: Address, request: TransactionRequest, data: impl Into<Bytes>) -> Self {
        TransactionSpec {
            request,
            to: Some(to),
            data: data.into(),
            tx_type: TxType::SendTransaction,
        }
    }

    pub fn deploy(bytecode: impl Into<Bytes>) -> Self {
        TransactionSpec {
            request: TransactionRequest::new(METHOD_DEPLOY, vec![]),
            to: None,
            data: bytecode.into(),
            tx_type: TxType::Deploy,
        }
    }

    pub fn cns_insert(name: &str, version: &str, address: Address, abi: &str) -> Result<Self> {
        Ok(TransactionSpec {
            request: TransactionRequest::new(
                cns::METHOD_INSERT,
                vec![
                    name.to_owned(),
                    version.to_owned(),
                    address.to_string(),
                    abi.to_owned(),
                ],
            ),
            to: Some(cns::ADDRESS),
            data: cns::encode_insert(name, version, address, abi)?.into(),
            tx_type: TxType::CnsInsert,
        })
    }

    pub fn cns_select_by_name(name: &str) -> Result<Self> {
        Ok(TransactionSpec {
            request: TransactionRequest::new(cns::METHOD_SELECT_BY_NAME, vec![name.to_owned()]),
            to: Some(cns::ADDRESS),
            data: cns::encode_select_by_name(name)?.into(),
            tx_type: TxType::CnsSelectByName,
        })
    }

    pub fn cns_select_by_name_and_version(name: &str, version: &str) -> Result<Self> {
        Ok(TransactionSpec {
            request: TransactionRequest::new(
                cns::METHOD_SELECT_BY_NAME_AND_VERSION,
                vec![name.to_owned(), version.to_owned()],
            ),
            to: Some(cns::ADDRESS),
            data: cns::encode_select_by_name_and_version(name, version)?.into(),
            tx_type: TxType::CnsSelectByNameAndVersion,
        })
    }
}

/// Sends calls and signed transactions over a [Connection], and checks transaction receipts against block headers
/// from an independent [BlockHeaderManager].
#[derive(Clone)]
pub struct TransactionSubmitter {
    connection: Arc<dyn Connection>,
    block_header_manager: Arc<dyn BlockHeaderManager>,
}

impl TransactionSubmitter {
    pub fn new(
        connection: Arc<dyn Connection>,
        block_header_manager: Arc<dyn BlockHeaderManager>,
    ) -> Self {
        TransactionSubmitter {
            connection,
            block_header_manager,
        }
    }

    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Executes a read-only call. Nothing is signed.
    pub async fn call(&self, spec: &TransactionSpec) -> Result<CallOutput> {
        let params = TransactionParams {
            transaction_request: spec.request.clone(),
            data: spec.data.to_string(),
            to: spec.to,
            from: Some(Address::ZERO),
            tx_type: spec.tx_type,
        };
        let response = self
            .connection
            .send(Request::new(RequestKind::Call, &params)?)
            .await;
        let output: CallOutput = response.into_data()?;
        debug!(
            method = %spec.request.method,
            status = output.status,
            block_number = output.current_block_number,
            "call returned"
        );

        if !output.is_status_ok() {
            return Err(StubError::ChainRejected(format!(
                "call failed with status {:#x}",
                output.status
            )));
        }
        Ok(output)
    }

    /// Signs and sends a transaction, returning its receipt. The receipt has not been verified.
    pub async fn submit(
        &self,
        spec: &TransactionSpec,
        credentials: &Credentials,
    ) -> Result<TransactionReceipt> {
        let (_, receipt) = self.sign_and_send(spec, credentials).await?;
        Ok(receipt)
    }

    /// Fetches the header of the block `receipt` claims to be in and verifies the receipt against it.
    pub async fn confirm(&self, receipt: &TransactionReceipt) -> Result<BlockHeader> {
        self.confirm_transaction(receipt.transaction_hash, receipt)
            .await
    }

    /// Signs and sends a transaction, then verifies that its receipt is included in the chain.
    pub async fn submit_and_verify(
        &self,
        spec: &TransactionSpec,
        credentials: &Credentials,
    ) -> Result<TransactionReceipt> {
        let (hash, receipt) = self.sign_and_send(spec, credentials).await?;
        self.confirm_transaction(hash, &receipt).await?;
        Ok(receipt)
    }

    /// Sends `data` to the contract at `to` and waits until the transaction is verified.
    pub async fn send_transaction(
        &self,
        to: Address,
        request: TransactionRequest,
        data: impl Into<Bytes>,
        credentials: &Credentials,
    ) -> Result<TransactionReceipt> {
        self.submit_and_verify(&TransactionSpec::send(to, request, data), credentials)
            .await
    }

    /// Signs and sends a transaction, returning the hash it was signed with and its unverified receipt. Fails if the
    /// receipt reports a failed execution.
    pub async fn sign_and_send(
        &self,
        spec: &TransactionSpec,
        credentials: &Credentials,
    ) -> Result<(B256, TransactionReceipt)> {
        let properties = self.connection.properties();
        let group_id = properties.group_id()?;
        let chain_id = properties.chain_id()?;

        let block_number = self
            .block_header_manager
            .block_number()
            .await
            .map_err(|e| match e {
                StubError::BlockNumberUnavailable(_) => e,
                e => StubError::BlockNumberUnavailable(e.to_string()),
            })?;

        let signed = RawTransaction::new(
            spec.to,
            spec.data.clone(),
            chain_id,
            group_id,
            block_number,
        )
        .sign(credentials)?;
        let hash = signed.hash();
        info!(
            %hash,
            method = %spec.request.method,
            tx_type = ?spec.tx_type,
            block_number,
            "sending transaction"
        );
        trace!(data = %spec.data, "transaction payload");

        let params = TransactionParams {
            transaction_request: spec.request.clone(),
            data: signed.to_hex(),
            to: spec.to,
            from: Some(credentials.address()),
            tx_type: spec.tx_type,
        };
        let response = self
            .connection
            .send(Request::new(RequestKind::SendTransaction, &params)?)
            .await;
        let receipt: TransactionReceipt = response.into_data()?;

        if !receipt.is_status_ok() {
            warn!(%hash, status = receipt.status, "transaction failed");
            return Err(StubError::ChainRejected(format!(
                "transaction {hash} failed with status {:#x}",
                receipt.status
            )));
        }

        Ok((hash, receipt))
    }

    /// Verifies that `receipt` is the receipt of `transaction_hash` and is included in the chain.
    pub async fn confirm_transaction(
        &self,
        transaction_hash: B256,
        receipt: &TransactionReceipt,
    ) -> Result<BlockHeader> {
        let block_number = receipt.block_number;
        let header = self
            .block_header_manager
            .block_header(block_number)
            .await
            .map_err(|e| match e {
                StubError::BlockHeaderUnavailable(_) => e,
                e => StubError::BlockHeaderUnavailable(e.to_string()),
            })?
            .ok_or_else(|| {
                StubError::BlockHeaderUnavailable(format!("block {block_number} does not exist"))
            })?;
        let header = BlockHeader::decode(&header)?;

        verify_transaction_receipt_proof(block_number, transaction_hash, &header, receipt)?;
        Ok(header)
    }
}
