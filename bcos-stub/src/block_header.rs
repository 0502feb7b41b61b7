use alloy::{
    primitives::B256,
    rlp::{self, Decodable, Encodable, Header},
};
use async_trait::async_trait;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, StubError},
    serde_util::quantity,
};

/// The header fields of a BCOS block that receipt verification depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    #[serde(with = "quantity")]
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub state_root: B256,
    pub transactions_root: B256,
    pub receipts_root: B256,
    #[serde(with = "quantity")]
    pub timestamp: u64,
}

impl BlockHeader {
    fn fields_len(&self) -> usize {
        self.number.length()
            + self.hash.length()
            + self.parent_hash.length()
            + self.state_root.length()
            + self.transactions_root.length()
            + self.receipts_root.length()
            + self.timestamp.length()
    }

    /// The bytes exchanged with a [BlockHeaderManager].
    pub fn encode(&self) -> Vec<u8> {
        let payload_length = self.fields_len();
        let mut out = BytesMut::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.number.encode(&mut out);
        self.hash.encode(&mut out);
        self.parent_hash.encode(&mut out);
        self.state_root.encode(&mut out);
        self.transactions_root.encode(&mut out);
        self.receipts_root.encode(&mut out);
        self.timestamp.encode(&mut out);
        out.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<BlockHeader> {
        Self::decode_rlp(bytes)
            .map_err(|e| StubError::BlockHeaderUnavailable(format!("malformed header: {e}")))
    }

    fn decode_rlp(mut buf: &[u8]) -> rlp::Result<BlockHeader> {
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

        let block_header = BlockHeader {
            number: u64::decode(&mut buf)?,
            hash: B256::decode(&mut buf)?,
            parent_hash: B256::decode(&mut buf)?,
            state_root: B256::decode(&mut buf)?,
            transactions_root: B256::decode(&mut buf)?,
            receipts_root: B256::decode(&mut buf)?,
            timestamp: u64::decode(&mut buf)?,
        };
        if !buf.is_empty() {
            return Err(rlp::Error::Custom("trailing bytes after header fields"));
        }

        Ok(block_header)
    }
}

/// A source of block numbers and block headers for one chain.
#[async_trait]
pub trait BlockHeaderManager: Send + Sync {
    async fn block_number(&self) -> Result<u64>;

    /// The encoded [BlockHeader] of block `number`, or `None` if the chain has no such block.
    async fn block_header(&self, number: u64) -> Result<Option<Vec<u8>>>;
}
