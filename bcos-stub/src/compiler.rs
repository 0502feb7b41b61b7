use std::{collections::HashMap, path::PathBuf};

use alloy::primitives::Bytes;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, StubError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledContract {
    /// The contract's ABI as JSON text.
    pub abi: String,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
}

#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compiles `source` and returns the contract named `contract_name` from it. Compiler diagnostics are returned
    /// verbatim in [StubError::Compile].
    async fn compile(&self, source: &str, contract_name: &str) -> Result<CompiledContract>;
}

/// Compiles Solidity by running a `solc` binary.
#[derive(Debug, Clone)]
pub struct SolcCompiler {
    solc: PathBuf,
}

impl SolcCompiler {
    pub fn new(solc: impl Into<PathBuf>) -> Self {
        SolcCompiler { solc: solc.into() }
    }
}

impl Default for SolcCompiler {
    /// Uses the `solc` found on `PATH`.
    fn default() -> Self {
        SolcCompiler::new("solc")
    }
}

#[async_trait]
impl Compiler for SolcCompiler {
    async fn compile(&self, source: &str, contract_name: &str) -> Result<CompiledContract> {
        let file = tempfile::Builder::new()
            .prefix("BCOSContract-")
            .suffix(&format!("-{contract_name}.sol"))
            .tempfile()
            .map_err(|e| StubError::Compile(e.to_string()))?;
        tokio::fs::write(file.path(), source)
            .await
            .map_err(|e| StubError::Compile(e.to_string()))?;

        debug!(solc = %self.solc.display(), contract_name, "compiling contract");
        let output = Command::new(&self.solc)
            .arg("--combined-json")
            .arg("abi,bin")
            .arg(file.path())
            .output()
            .await
            .map_err(|e| StubError::Compile(format!("running {}: {e}", self.solc.display())))?;

        if !output.status.success() {
            let diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(contract_name, %diagnostics, "solc failed");
            return Err(StubError::Compile(diagnostics));
        }

        parse_combined_json(&output.stdout, contract_name)
    }
}

#[derive(Deserialize)]
struct CombinedJson {
    contracts: HashMap<String, Contract>,
}

#[derive(Deserialize)]
struct Contract {
    /// A JSON string in older `solc` releases, an array in newer ones.
    abi: Value,
    bin: String,
}

/// Picks `contract_name` out of `solc --combined-json abi,bin` output. Contracts are keyed `<file>:<name>`.
pub fn parse_combined_json(json: &[u8], contract_name: &str) -> Result<CompiledContract> {
    let combined: CombinedJson = serde_json::from_slice(json)
        .map_err(|e| StubError::Compile(format!("unreadable solc output: {e}")))?;

    let suffix = format!(":{contract_name}");
    let contract = combined
        .contracts
        .into_iter()
        .find_map(|(key, contract)| {
            (key == contract_name || key.ends_with(&suffix)).then_some(contract)
        })
        .ok_or_else(|| {
            StubError::Compile(format!("contract {contract_name} not found in source"))
        })?;

    let abi = match contract.abi {
        Value::String(abi) => abi,
        abi => abi.to_string(),
    };
    let bytecode = hex::decode(contract.bin.trim_start_matches("0x"))
        .map_err(|e| StubError::Compile(format!("invalid bytecode for {contract_name}: {e}")))?;
    if bytecode.is_empty() {
        return Err(StubError::Compile(format!(
            "{contract_name} has no bytecode, it may be abstract or an interface"
        )));
    }

    Ok(CompiledContract {
        abi,
        bytecode: bytecode.into(),
    })
}
