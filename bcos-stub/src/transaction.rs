//! Transactions in the shape BCOS 2.x nodes accept, and the receipts and call outputs they return.

use alloy::{
    primitives::{keccak256, Address, Bytes, B256, U256},
    rlp::{self, Decodable, Encodable, Header, EMPTY_STRING_CODE},
};
use bytes::{BufMut, BytesMut};
use k256::ecdsa::{RecoveryId, Signature};
use receipt_proof::{ProofNode, ProofResult};
use serde::{Deserialize, Serialize};

use crate::{
    crypto::{self, Credentials},
    error::{Result, StubError},
    serde_util::{option_address, quantity},
};

/// Both gas price and gas limit are fixed on BCOS; nodes do not charge for gas.
pub const GAS_PRICE: u128 = 30_000_000;
pub const GAS_LIMIT: u128 = 30_000_000;
/// A transaction is valid until this many blocks after the block number it was signed against.
pub const BLOCK_LIMIT_OFFSET: u64 = 500;

/// Describes what a request carries. Nodes and routers treat this as metadata; it does not change how the request
/// is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Call,
    SendTransaction,
    Deploy,
    CnsInsert,
    CnsSelectByName,
    CnsSelectByNameAndVersion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub method: String,
    pub args: Vec<String>,
}

impl TransactionRequest {
    pub fn new(method: impl Into<String>, args: Vec<String>) -> Self {
        TransactionRequest {
            method: method.into(),
            args,
        }
    }
}

/// The payload of a [crate::connection::Request].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    pub transaction_request: TransactionRequest,
    /// Hex ABI-encoded input for a call, or the hex signed transaction for a send.
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(rename = "tp_ype")]
    pub tx_type: TxType,
}

/// An unsigned BCOS 2.x transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    /// Replaces the account nonce. Nodes reject a second transaction with the same id.
    pub random_id: u128,
    pub gas_price: u128,
    pub gas_limit: u128,
    pub block_limit: u64,
    /// `None` deploys a contract.
    pub to: Option<Address>,
    pub value: u128,
    pub data: Bytes,
    pub chain_id: u64,
    pub group_id: u64,
    pub extra_data: Bytes,
}

impl RawTransaction {
    /// Builds a transaction anchored to `block_number`, with a fresh random id.
    pub fn new(
        to: Option<Address>,
        data: Bytes,
        chain_id: u64,
        group_id: u64,
        block_number: u64,
    ) -> Self {
        RawTransaction {
            random_id: rand::random(),
            gas_price: GAS_PRICE,
            gas_limit: GAS_LIMIT,
            block_limit: block_number.saturating_add(BLOCK_LIMIT_OFFSET),
            to,
            value: 0,
            data,
            chain_id,
            group_id,
            extra_data: Bytes::new(),
        }
    }

    fn fields_len(&self) -> usize {
        self.random_id.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.block_limit.length()
            + self.to.map_or(1, |to| to.length())
            + self.value.length()
            + self.data.length()
            + self.chain_id.length()
            + self.group_id.length()
            + self.extra_data.length()
    }

    fn encode_fields(&self, out: &mut BytesMut) {
        self.random_id.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.block_limit.encode(out);
        encode_option_addr(&self.to, out);
        self.value.encode(out);
        self.data.encode(out);
        self.chain_id.encode(out);
        self.group_id.encode(out);
        self.extra_data.encode(out);
    }

    fn decode_fields(buf: &mut &[u8]) -> rlp::Result<RawTransaction> {
        Ok(RawTransaction {
            random_id: u128::decode(buf)?,
            gas_price: u128::decode(buf)?,
            gas_limit: u128::decode(buf)?,
            block_limit: u64::decode(buf)?,
            to: decode_option_addr(buf)?,
            value: u128::decode(buf)?,
            data: Bytes::decode(buf)?,
            chain_id: u64::decode(buf)?,
            group_id: u64::decode(buf)?,
            extra_data: Bytes::decode(buf)?,
        })
    }

    /// The digest that is signed: the hash of the RLP list of the unsigned fields.
    pub fn signing_hash(&self) -> B256 {
        let payload_length = self.fields_len();
        let mut buffer = BytesMut::with_capacity(payload_length + 9);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut buffer);
        self.encode_fields(&mut buffer);
        keccak256(&buffer)
    }

    pub fn sign(self, credentials: &Credentials) -> Result<SignedTransaction> {
        let (signature, recovery_id) = credentials.sign_prehash(self.signing_hash())?;
        let bytes = signature.to_bytes();
        Ok(SignedTransaction {
            v: recovery_id.to_byte() as u64 + 27,
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
            tx: self,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: RawTransaction,
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

impl SignedTransaction {
    fn payload_length(&self) -> usize {
        self.tx.fields_len() + self.v.length() + self.r.length() + self.s.length()
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload_length = self.payload_length();
        let mut out = BytesMut::with_capacity(payload_length + 9);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.tx.encode_fields(&mut out);
        self.v.encode(&mut out);
        self.r.encode(&mut out);
        self.s.encode(&mut out);
        out.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<SignedTransaction> {
        Self::decode_rlp(bytes)
            .map_err(|e| StubError::Signature(format!("malformed transaction: {e}")))
    }

    fn decode_rlp(mut buf: &[u8]) -> rlp::Result<SignedTransaction> {
        let header = Header::decode(&mut buf)?;
        if !header.list {
            return Err(rlp::Error::UnexpectedString);
        }
        if buf.len() != header.payload_length {
            return Err(rlp::Error::ListLengthMismatch {
                expected: header.payload_length,
                got: buf.len(),
            });
        }

        let signed = SignedTransaction {
            tx: RawTransaction::decode_fields(&mut buf)?,
            v: u64::decode(&mut buf)?,
            r: U256::decode(&mut buf)?,
            s: U256::decode(&mut buf)?,
        };
        if !buf.is_empty() {
            return Err(rlp::Error::Custom("trailing bytes after transaction fields"));
        }

        Ok(signed)
    }

    pub fn from_hex(s: &str) -> Result<SignedTransaction> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| StubError::Signature(e.to_string()))?;
        Self::decode(&bytes)
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.encode()))
    }

    /// The transaction hash nodes report in receipts.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    pub fn recover_signer(&self) -> Result<Address> {
        let recovery_id = self
            .v
            .checked_sub(27)
            .and_then(|v| u8::try_from(v).ok())
            .and_then(RecoveryId::from_byte)
            .ok_or_else(|| StubError::Signature(format!("invalid recovery id {}", self.v)))?;

        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r.to_be_bytes::<32>());
        bytes[32..].copy_from_slice(&self.s.to_be_bytes::<32>());
        let signature =
            Signature::from_slice(&bytes).map_err(|e| StubError::Signature(e.to_string()))?;

        crypto::recover_address(self.tx.signing_hash(), &signature, recovery_id)
    }
}

/// Signs `payload` as a transaction to `to` (or a deployment if `None`), valid for [BLOCK_LIMIT_OFFSET] blocks after
/// `block_number`. Returns the hex-encoded signed transaction.
pub fn sign_transaction(
    credentials: &Credentials,
    to: Option<Address>,
    group_id: u64,
    chain_id: u64,
    block_number: u64,
    payload: &[u8],
) -> Result<String> {
    let raw = RawTransaction::new(
        to,
        Bytes::copy_from_slice(payload),
        chain_id,
        group_id,
        block_number,
    );
    Ok(raw.sign(credentials)?.to_hex())
}

/// RLP-encode an `Option<Address>`.
/// `None` is represented as an empty string.
fn encode_option_addr(addr: &Option<Address>, out: &mut BytesMut) {
    match addr {
        Some(addr) => {
            addr.encode(out);
        }
        None => {
            out.put_u8(EMPTY_STRING_CODE);
        }
    }
}

fn decode_option_addr(buf: &mut &[u8]) -> rlp::Result<Option<Address>> {
    let bytes = Bytes::decode(buf)?;
    match bytes.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(&bytes))),
        _ => Err(rlp::Error::Custom("address must be empty or 20 bytes")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

impl Log {
    fn fields_len(&self) -> usize {
        self.address.length() + self.topics.length() + self.data.length()
    }
}

impl Encodable for Log {
    fn encode(&self, out: &mut dyn BufMut) {
        Header {
            list: true,
            payload_length: self.fields_len(),
        }
        .encode(out);
        self.address.encode(out);
        self.topics.encode(out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        payload_length + rlp::length_of_length(payload_length)
    }
}

/// One level of a receipt's authentication path, as the node sends it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProofUnit {
    #[serde(default)]
    pub left: Vec<String>,
    #[serde(default)]
    pub right: Vec<String>,
}

impl From<&ProofNode> for MerkleProofUnit {
    fn from(node: &ProofNode) -> Self {
        MerkleProofUnit {
            left: node.left.iter().map(ToString::to_string).collect(),
            right: node.right.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(with = "quantity")]
    pub transaction_index: u64,
    #[serde(default)]
    pub block_hash: B256,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(with = "quantity", default)]
    pub gas_used: u64,
    #[serde(with = "option_address", default)]
    pub contract_address: Option<Address>,
    #[serde(with = "option_address", default)]
    pub from: Option<Address>,
    #[serde(with = "option_address", default)]
    pub to: Option<Address>,
    #[serde(with = "quantity")]
    pub status: u64,
    #[serde(default)]
    pub output: Bytes,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub receipt_proof: Vec<MerkleProofUnit>,
}

impl TransactionReceipt {
    pub fn is_status_ok(&self) -> bool {
        self.status == 0
    }

    fn fields_len(&self) -> usize {
        self.transaction_hash.length()
            + self.transaction_index.length()
            + self.status.length()
            + self.gas_used.length()
            + self.contract_address.map_or(1, |address| address.length())
            + self.output.length()
            + self.logs.length()
    }

    /// The canonical encoding of this receipt as a leaf of the receipts trie.
    pub fn encode_leaf(&self) -> Vec<u8> {
        let payload_length = self.fields_len();
        let mut out = BytesMut::with_capacity(payload_length + 9);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.transaction_hash.encode(&mut out);
        self.transaction_index.encode(&mut out);
        self.status.encode(&mut out);
        self.gas_used.encode(&mut out);
        encode_option_addr(&self.contract_address, &mut out);
        self.output.encode(&mut out);
        self.logs.encode(&mut out);
        out.to_vec()
    }

    pub fn leaf_hash(&self) -> B256 {
        keccak256(self.encode_leaf())
    }

    /// Parses the receipt's authentication path. Fails on the first entry that is not a 32-byte hash.
    pub fn proof(&self) -> ProofResult<Vec<ProofNode>> {
        self.receipt_proof
            .iter()
            .map(|unit| ProofNode::from_hex(&unit.left, &unit.right))
            .collect()
    }
}

/// The result of a read-only call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutput {
    #[serde(with = "quantity")]
    pub current_block_number: u64,
    pub output: Bytes,
    #[serde(with = "quantity")]
    pub status: u64,
}

impl CallOutput {
    pub fn is_status_ok(&self) -> bool {
        self.status == 0
    }
}
