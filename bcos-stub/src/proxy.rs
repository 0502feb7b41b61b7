use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy::primitives::Address;
use tracing::info;

use crate::{
    connection::{Connection, BCOS_PROXY_NAME},
    crypto::Credentials,
    deploy::{ContractDeployer, DeployRequest},
    error::{Result, StubError},
};

pub const PROXY_VERSION: &str = "1";
pub const DEPLOY_TIMEOUT: Duration = Duration::from_secs(10);

/// Deploys the router's proxy contract to a chain which does not have one yet.
pub struct ProxyContract {
    connection: Arc<dyn Connection>,
    deployer: Arc<ContractDeployer>,
    credentials: Credentials,
    /// Solidity source of the proxy. The contract in it is named [BCOS_PROXY_NAME].
    source_file: PathBuf,
}

impl ProxyContract {
    pub fn new(
        connection: Arc<dyn Connection>,
        deployer: Arc<ContractDeployer>,
        credentials: Credentials,
        source_file: impl Into<PathBuf>,
    ) -> Self {
        ProxyContract {
            connection,
            deployer,
            credentials,
            source_file: source_file.into(),
        }
    }

    /// Returns the proxy's address, deploying it first if the connection has none recorded.
    pub async fn deploy(&self) -> Result<Address> {
        if let Some(address) = proxy_address(self.connection.as_ref())? {
            info!(%address, "proxy already deployed");
            return Ok(address);
        }

        info!(source = %self.source_file.display(), "deploying proxy");
        let source = tokio::fs::read_to_string(&self.source_file)
            .await
            .map_err(|e| {
                StubError::InvalidArgs(format!("reading {}: {e}", self.source_file.display()))
            })?;
        let request = DeployRequest {
            cns_name: BCOS_PROXY_NAME.to_owned(),
            source,
            class_name: BCOS_PROXY_NAME.to_owned(),
            version: PROXY_VERSION.to_owned(),
            constructor_args: None,
        };

        tokio::time::timeout(
            DEPLOY_TIMEOUT,
            self.deployer.deploy(&request, &self.credentials),
        )
        .await
        .map_err(|_| {
            StubError::transport(format!(
                "deploying {BCOS_PROXY_NAME} timed out after {DEPLOY_TIMEOUT:?}"
            ))
        })?
    }

    /// Whether the proxy has been deployed on the chain behind `connection`.
    pub fn check(connection: &dyn Connection) -> bool {
        let deployed = connection.properties().has_proxy_deployed();
        if deployed {
            info!("{BCOS_PROXY_NAME} has been deployed");
        } else {
            info!("{BCOS_PROXY_NAME} has not been deployed");
        }
        deployed
    }
}

fn proxy_address(connection: &dyn Connection) -> Result<Option<Address>> {
    let Some(address) = connection.properties().get(BCOS_PROXY_NAME) else {
        return Ok(None);
    };
    address
        .parse()
        .map(Some)
        .map_err(|e| StubError::Property {
            key: BCOS_PROXY_NAME.to_owned(),
            reason: format!("{address:?}: {e}"),
        })
}
