mod deploy;
mod registry;
mod submit;

use std::sync::Arc;

use bcos_stub::{
    cns::{CnsConfig, CnsService},
    crypto::Credentials,
    deploy::{ContractDeployer, DeployRequest},
    submitter::TransactionSubmitter,
    test_util::{FixedCompiler, MockChain},
};

/// Logs from the library are shown for failed tests. Filter them with `RUST_LOG`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A [MockChain] with every service of the stub wired up against it.
struct Stub {
    chain: Arc<MockChain>,
    submitter: TransactionSubmitter,
    cns: Arc<CnsService>,
    compiler: Arc<FixedCompiler>,
    deployer: Arc<ContractDeployer>,
    credentials: Credentials,
}

impl Stub {
    fn new() -> Stub {
        Self::with_config(CnsConfig::default())
    }

    fn with_config(config: CnsConfig) -> Stub {
        init_logging();

        let chain = Arc::new(MockChain::new());
        let submitter = TransactionSubmitter::new(chain.clone(), chain.clone());
        let cns = Arc::new(CnsService::start(chain.clone(), chain.clone(), config).unwrap());
        let compiler = Arc::new(FixedCompiler::standard());
        let deployer = Arc::new(ContractDeployer::new(
            cns.clone(),
            submitter.clone(),
            compiler.clone(),
        ));

        Stub {
            chain,
            submitter,
            cns,
            compiler,
            deployer,
            credentials: Credentials::random(),
        }
    }

    /// Deploys `class_name` from a placeholder source under the name `name`.
    async fn deploy(
        &self,
        name: &str,
        class_name: &str,
        version: &str,
        args: &[&str],
    ) -> bcos_stub::Result<alloy::primitives::Address> {
        let mut request = vec![name, "contract Placeholder {}", class_name, version];
        request.extend_from_slice(args);
        let request = DeployRequest::from_args(&request[..])?;
        self.deployer.deploy(&request, &self.credentials).await
    }
}
