use std::{
    num::{NonZeroU64, NonZeroUsize},
    path::Path,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cns::CnsConfig;

/// Contents of a chain's `stub.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubConfig {
    #[serde(default)]
    pub chain: ChainConfig,
    pub channel_service: ChannelServiceConfig,
    #[serde(default)]
    pub cns: CnsCacheConfig,
    /// Resources exposed by this chain. Each is published as a connection property named after the resource.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl StubConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<StubConfig> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading stub config {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("parsing stub config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<StubConfig> {
        let config: StubConfig = toml::from_str(contents)?;
        if config.channel_service.rpc_url.is_empty() {
            return Err(anyhow!("channel_service.rpc_url must not be empty"));
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    #[serde(default = "group_id_default")]
    pub group_id: u64,
    #[serde(default = "chain_id_default")]
    pub chain_id: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        ChainConfig {
            group_id: group_id_default(),
            chain_id: chain_id_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelServiceConfig {
    /// JSON-RPC endpoint of the node.
    pub rpc_url: String,
    #[serde(default = "request_timeout_ms_default")]
    pub request_timeout_ms: u64,
    /// How many times to ask for a transaction's receipt before giving up.
    #[serde(default = "receipt_poll_attempts_default")]
    pub receipt_poll_attempts: u32,
    #[serde(default = "receipt_poll_interval_ms_default")]
    pub receipt_poll_interval_ms: u64,
}

impl ChannelServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CnsCacheConfig {
    #[serde(default = "cache_capacity_default")]
    pub cache_capacity: NonZeroUsize,
    /// Cached ABIs are dropped this often.
    #[serde(default = "cache_clear_interval_secs_default")]
    pub cache_clear_interval_secs: NonZeroU64,
}

impl Default for CnsCacheConfig {
    fn default() -> Self {
        CnsCacheConfig {
            cache_capacity: cache_capacity_default(),
            cache_clear_interval_secs: cache_clear_interval_secs_default(),
        }
    }
}

impl From<&CnsCacheConfig> for CnsConfig {
    fn from(config: &CnsCacheConfig) -> Self {
        CnsConfig {
            cache_capacity: config.cache_capacity,
            cache_clear_interval: Duration::from_secs(config.cache_clear_interval_secs.get()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// For a contract resource, its address or CNS name.
    pub value: String,
}

pub fn group_id_default() -> u64 {
    1
}

pub fn chain_id_default() -> u64 {
    1
}

pub fn request_timeout_ms_default() -> u64 {
    30_000
}

pub fn receipt_poll_attempts_default() -> u32 {
    20
}

pub fn receipt_poll_interval_ms_default() -> u64 {
    500
}

pub fn cache_capacity_default() -> NonZeroUsize {
    NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN)
}

pub fn cache_clear_interval_secs_default() -> NonZeroU64 {
    NonZeroU64::new(30 * 60).unwrap_or(NonZeroU64::MIN)
}
