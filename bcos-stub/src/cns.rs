//! Resolution of contract names through the chain's CNS precompile.
//!
//! The chain is the only source of truth for registry entries. The ABI of the newest entry for each name is cached
//! in a bounded LRU which is also emptied on a fixed interval, so no cached ABI outlives that interval. Concurrent
//! cache misses for the same name share a single remote lookup.

use std::{collections::HashMap, num::NonZeroUsize, sync::Arc, time::Duration};

use alloy::primitives::Address;
use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, info, trace};

use crate::{
    block_header::BlockHeaderManager,
    connection::Connection,
    contracts::cns,
    crypto::Credentials,
    error::{Result, StubError},
    submitter::{TransactionSpec, TransactionSubmitter},
};

/// A registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CnsInfo {
    pub name: String,
    pub version: String,
    pub address: String,
    pub abi: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CnsConfig {
    pub cache_capacity: NonZeroUsize,
    pub cache_clear_interval: Duration,
}

impl Default for CnsConfig {
    fn default() -> Self {
        CnsConfig {
            cache_capacity: NonZeroUsize::new(32).unwrap_or(NonZeroUsize::MIN),
            cache_clear_interval: Duration::from_secs(30 * 60),
        }
    }
}

type AbiLookup = Shared<BoxFuture<'static, Result<Option<String>>>>;

struct AbiCache {
    entries: LruCache<String, String>,
    /// Remote lookups which have not finished yet. A name is never in both maps at once.
    in_flight: HashMap<String, AbiLookup>,
}

pub struct CnsService {
    submitter: TransactionSubmitter,
    config: CnsConfig,
    abi_cache: Arc<Mutex<AbiCache>>,
    clear_task: JoinHandle<()>,
}

impl CnsService {
    /// Creates the service and starts the task which periodically clears the ABI cache. Must be called from within a
    /// Tokio runtime. Fails if the clear interval is zero.
    pub fn start(
        connection: Arc<dyn Connection>,
        block_header_manager: Arc<dyn BlockHeaderManager>,
        config: CnsConfig,
    ) -> Result<CnsService> {
        if config.cache_clear_interval.is_zero() {
            return Err(StubError::InvalidArgs(
                "ABI cache clear interval must be non-zero".to_owned(),
            ));
        }

        let abi_cache = Arc::new(Mutex::new(AbiCache {
            entries: LruCache::new(config.cache_capacity),
            in_flight: HashMap::new(),
        }));

        let period = config.cache_clear_interval;
        let clear_task = tokio::spawn({
            let abi_cache = abi_cache.clone();
            async move {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                loop {
                    interval.tick().await;
                    let mut cache = abi_cache.lock();
                    let cleared = cache.entries.len();
                    cache.entries.clear();
                    info!(cleared, "ABI cache cleared");
                }
            }
        });

        Ok(CnsService {
            submitter: TransactionSubmitter::new(connection, block_header_manager),
            config,
            abi_cache,
            clear_task,
        })
    }

    pub fn config(&self) -> &CnsConfig {
        &self.config
    }

    /// Stops the periodic cache clear. The service stays usable; cached entries then only leave by LRU eviction.
    pub fn shutdown(&self) {
        self.clear_task.abort();
    }

    pub fn clear_abi_cache(&self) {
        self.abi_cache.lock().entries.clear();
    }

    pub async fn select_by_name(&self, name: &str) -> Result<Vec<CnsInfo>> {
        select(&self.submitter, TransactionSpec::cns_select_by_name(name)?).await
    }

    pub async fn select_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<CnsInfo>> {
        select(
            &self.submitter,
            TransactionSpec::cns_select_by_name_and_version(name, version)?,
        )
        .await
    }

    /// The address of the newest registered version of `name`.
    pub async fn resolve_address(&self, name: &str) -> Result<Option<Address>> {
        let Some(info) = self.select_by_name(name).await?.pop() else {
            return Ok(None);
        };
        let address = info.address.parse().map_err(|e| {
            StubError::transport(format!("invalid address {:?} for {name}: {e}", info.address))
        })?;
        Ok(Some(address))
    }

    /// The ABI of the newest registered version of `name`.
    ///
    /// Served from the cache when possible. If another caller is already looking up `name`, this waits for and
    /// returns that lookup's result, whether it succeeds or fails.
    pub async fn resolve_abi(&self, name: &str) -> Result<Option<String>> {
        let lookup = {
            let mut cache = self.abi_cache.lock();
            if let Some(lookup) = cache.in_flight.get(name) {
                debug!(name, "joining in-flight ABI lookup");
                lookup.clone()
            } else if let Some(abi) = cache.entries.get(name) {
                trace!(name, "ABI cache hit");
                return Ok(Some(abi.clone()));
            } else {
                debug!(name, "ABI cache miss");
                let lookup = self.abi_lookup(name.to_owned());
                cache.in_flight.insert(name.to_owned(), lookup.clone());
                lookup
            }
        };

        lookup.await
    }

    fn abi_lookup(&self, name: String) -> AbiLookup {
        let submitter = self.submitter.clone();
        let abi_cache = self.abi_cache.clone();

        async move {
            let result = match TransactionSpec::cns_select_by_name(&name) {
                Ok(spec) => select(&submitter, spec)
                    .await
                    .map(|mut infos| infos.pop().map(|info| info.abi)),
                Err(e) => Err(e),
            };

            let mut cache = abi_cache.lock();
            cache.in_flight.remove(&name);
            if let Ok(Some(abi)) = &result {
                trace!(name = %name, abi = %abi, "ABI cached");
                cache.entries.put(name, abi.clone());
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Registers `address` as `version` of `name`. Succeeds only once the registering transaction's receipt has been
    /// verified against the chain.
    pub async fn register(
        &self,
        name: &str,
        version: &str,
        address: Address,
        abi: &str,
        credentials: &Credentials,
    ) -> Result<()> {
        info!(name, version, %address, "registering contract");
        trace!(abi, "registered ABI");

        let spec = TransactionSpec::cns_insert(name, version, address, abi)?;
        self.submitter.submit_and_verify(&spec, credentials).await?;
        Ok(())
    }
}

impl Drop for CnsService {
    fn drop(&mut self) {
        self.clear_task.abort();
    }
}

async fn select(submitter: &TransactionSubmitter, spec: TransactionSpec) -> Result<Vec<CnsInfo>> {
    let output = submitter.call(&spec).await?;
    let json = cns::decode_select_output(&output.output)?;
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&json)?)
}
