use std::{fmt, sync::Arc};

use alloy::primitives::Address;
use ethabi::token::{LenientTokenizer, Tokenizer};
use tracing::{debug, info, trace, warn};

use crate::{
    cns::CnsService,
    compiler::{CompiledContract, Compiler},
    connection::BCOS_PROXY_NAME,
    crypto::Credentials,
    error::{Result, StubError},
    submitter::{TransactionSpec, TransactionSubmitter},
};

/// Stages of a deployment, in the order they are reached. A failure at any stage ends the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeployStage {
    Start,
    VersionChecked,
    Compiled,
    ConstructorEncoded,
    Submitted,
    ConfirmedAndVerified,
    Registered,
    Done,
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStage::Start => "START",
            DeployStage::VersionChecked => "VERSION_CHECKED",
            DeployStage::Compiled => "COMPILED",
            DeployStage::ConstructorEncoded => "CONSTRUCTOR_ENCODED",
            DeployStage::Submitted => "SUBMITTED",
            DeployStage::ConfirmedAndVerified => "CONFIRMED_AND_VERIFIED",
            DeployStage::Registered => "REGISTERED",
            DeployStage::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRequest {
    /// The name the contract is registered under.
    pub cns_name: String,
    pub source: String,
    /// The contract to deploy out of those defined in `source`.
    pub class_name: String,
    pub version: String,
    /// `None` if no arguments were given at all.
    pub constructor_args: Option<Vec<String>>,
}

impl DeployRequest {
    /// Parses a command's arguments: `[cns_name, source, class_name, version, constructor_args...]`.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<DeployRequest> {
        let [cns_name, source, class_name, version, rest @ ..] = args else {
            return Err(StubError::InvalidArgs("incomplete args".to_owned()));
        };

        Ok(DeployRequest {
            cns_name: cns_name.as_ref().to_owned(),
            source: source.as_ref().to_owned(),
            class_name: class_name.as_ref().to_owned(),
            version: version.as_ref().to_owned(),
            constructor_args: (!rest.is_empty())
                .then(|| rest.iter().map(|a| a.as_ref().to_owned()).collect()),
        })
    }
}

/// Compiles, deploys and registers contracts.
pub struct ContractDeployer {
    cns: Arc<CnsService>,
    submitter: TransactionSubmitter,
    compiler: Arc<dyn Compiler>,
}

impl ContractDeployer {
    pub fn new(
        cns: Arc<CnsService>,
        submitter: TransactionSubmitter,
        compiler: Arc<dyn Compiler>,
    ) -> Self {
        ContractDeployer {
            cns,
            submitter,
            compiler,
        }
    }

    /// Deploys the contract and registers it in CNS, returning its address. Input errors are reported before
    /// anything is sent to the chain.
    pub async fn deploy(
        &self,
        request: &DeployRequest,
        credentials: &Credentials,
    ) -> Result<Address> {
        let mut stage = DeployStage::Start;
        let result = self.run(request, credentials, &mut stage).await;

        match &result {
            Ok(address) => info!(
                name = %request.cns_name,
                version = %request.version,
                %address,
                "contract deployed"
            ),
            Err(e) => warn!(
                name = %request.cns_name,
                version = %request.version,
                %stage,
                error = %e,
                "deploying contract failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        request: &DeployRequest,
        credentials: &Credentials,
        stage: &mut DeployStage,
    ) -> Result<Address> {
        let name = &request.cns_name;

        let existing = self
            .cns
            .select_by_name_and_version(name, &request.version)
            .await?;
        if !existing.is_empty() {
            return Err(StubError::DuplicateVersion {
                name: name.clone(),
                version: request.version.clone(),
            });
        }
        advance(stage, DeployStage::VersionChecked);

        let compiled = self
            .compiler
            .compile(&request.source, &request.class_name)
            .await?;
        advance(stage, DeployStage::Compiled);

        let code = encode_constructor(
            &compiled,
            &request.class_name,
            request.constructor_args.as_deref(),
        )?;
        trace!(name = %name, abi = %compiled.abi, code = %hex::encode(&code), "deploying contract");
        advance(stage, DeployStage::ConstructorEncoded);

        let (hash, receipt) = self
            .submitter
            .sign_and_send(&TransactionSpec::deploy(code), credentials)
            .await?;
        advance(stage, DeployStage::Submitted);

        self.submitter.confirm_transaction(hash, &receipt).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            StubError::ChainRejected(format!("receipt of {hash} has no contract address"))
        })?;
        if name == BCOS_PROXY_NAME {
            self.submitter
                .connection()
                .properties()
                .insert(BCOS_PROXY_NAME, address.to_string());
            info!(%address, "proxy contract address saved");
        }
        advance(stage, DeployStage::ConfirmedAndVerified);

        self.cns
            .register(name, &request.version, address, &compiled.abi, credentials)
            .await?;
        advance(stage, DeployStage::Registered);

        advance(stage, DeployStage::Done);
        Ok(address)
    }
}

fn advance(stage: &mut DeployStage, next: DeployStage) {
    debug!(from = %stage, to = %next, "deploy stage");
    *stage = next;
}

/// Appends the ABI-encoded constructor arguments to the contract's bytecode. Arguments are parsed leniently from
/// their text form, so `1` is accepted for a `uint256` and `0x..` for an address.
fn encode_constructor(
    compiled: &CompiledContract,
    class_name: &str,
    args: Option<&[String]>,
) -> Result<Vec<u8>> {
    let encoding_failed = |reason: String| StubError::ConstructorEncoding {
        contract: class_name.to_owned(),
        reason,
    };

    let contract: ethabi::Contract =
        serde_json::from_str(&compiled.abi).map_err(|e| encoding_failed(e.to_string()))?;
    let Some(constructor) = contract.constructor.filter(|c| !c.inputs.is_empty()) else {
        return Ok(compiled.bytecode.to_vec());
    };

    let args = match args {
        Some(args) if !args.is_empty() => args,
        _ => return Err(StubError::MissingConstructorArgs(class_name.to_owned())),
    };
    if args.len() != constructor.inputs.len() {
        return Err(encoding_failed(format!(
            "expected {} arguments, got {}",
            constructor.inputs.len(),
            args.len()
        )));
    }

    let tokens = constructor
        .inputs
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            LenientTokenizer::tokenize(&param.kind, arg)
                .map_err(|e| encoding_failed(format!("{}: {e}", param.name)))
        })
        .collect::<Result<Vec<_>>>()?;

    constructor
        .encode_input(compiled.bytecode.to_vec(), &tokens)
        .map_err(|e| encoding_failed(e.to_string()))
}
