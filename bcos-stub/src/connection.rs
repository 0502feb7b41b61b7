use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Result, StubError};

pub const BCOS_GROUP_ID: &str = "BCOS_GROUP_ID";
pub const BCOS_CHAIN_ID: &str = "BCOS_CHAIN_ID";
/// Logical name of the router's proxy contract. Its deployed address is remembered in the connection's properties.
pub const BCOS_PROXY_NAME: &str = "WeCrossProxy";

/// Status code of a successful [Response].
pub const SUCCESS: i32 = 0;
/// The node could not be reached, or answered with something that is not a response.
pub const TRANSPORT_ERROR: i32 = 1;
/// The node answered with an error of its own.
pub const NODE_ERROR: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Call,
    SendTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub kind: RequestKind,
    /// JSON-serialized [crate::transaction::TransactionParams].
    pub payload: Vec<u8>,
}

impl Request {
    pub fn new<T: Serialize>(kind: RequestKind, params: &T) -> Result<Request> {
        Ok(Request {
            kind,
            payload: serde_json::to_vec(params)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Response {
    pub error_code: i32,
    pub error_message: String,
    /// For a call, a JSON [crate::transaction::CallOutput]. For a transaction, a JSON
    /// [crate::transaction::TransactionReceipt].
    pub data: Vec<u8>,
}

impl Response {
    pub fn success(data: Vec<u8>) -> Response {
        Response {
            error_code: SUCCESS,
            error_message: "success".to_owned(),
            data,
        }
    }

    pub fn error(error_code: i32, error_message: impl Into<String>) -> Response {
        Response {
            error_code,
            error_message: error_message.into(),
            data: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_code == SUCCESS
    }

    /// Deserializes the payload of a successful response. [TRANSPORT_ERROR] becomes [StubError::Transport]; any
    /// other failure status becomes [StubError::ChainRejected] carrying the node's message.
    pub fn into_data<T: for<'de> Deserialize<'de>>(self) -> Result<T> {
        match self.error_code {
            SUCCESS => Ok(serde_json::from_slice(&self.data)?),
            TRANSPORT_ERROR => Err(StubError::Transport(self.error_message)),
            _ => Err(StubError::ChainRejected(self.error_message)),
        }
    }
}

/// An already-connected channel to a chain node.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn send(&self, request: Request) -> Response;

    fn properties(&self) -> &Properties;
}

/// String properties attached to a connection: chain coordinates, resource addresses and the proxy address.
#[derive(Debug, Default)]
pub struct Properties(RwLock<HashMap<String, String>>);

impl Properties {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Properties(RwLock::new(properties))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.0.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.0.write().insert(key.into(), value.into());
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.0.read().clone()
    }

    pub fn group_id(&self) -> Result<u64> {
        self.parse(BCOS_GROUP_ID)
    }

    pub fn chain_id(&self) -> Result<u64> {
        self.parse(BCOS_CHAIN_ID)
    }

    pub fn has_proxy_deployed(&self) -> bool {
        self.0.read().contains_key(BCOS_PROXY_NAME)
    }

    fn parse(&self, key: &str) -> Result<u64> {
        let value = self.get(key).ok_or_else(|| StubError::Property {
            key: key.to_owned(),
            reason: "missing".to_owned(),
        })?;
        value.trim().parse().map_err(|e| StubError::Property {
            key: key.to_owned(),
            reason: format!("{value:?}: {e}"),
        })
    }
}
