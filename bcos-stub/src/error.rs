use receipt_proof::ProofError;

pub type Result<T, E = StubError> = std::result::Result<T, E>;

/// An error from any stage of a call, transaction or deployment.
///
/// Every variant carries owned strings so the error is `Clone`; a single in-flight registry lookup hands the same
/// error to all of its waiters.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StubError {
    #[error("getting block number failed: {0}")]
    BlockNumberUnavailable(String),
    #[error("getting block header failed: {0}")]
    BlockHeaderUnavailable(String),
    #[error("signing transaction failed: {0}")]
    Signature(String),
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered, but with a non-success status. The node's message is kept verbatim.
    #[error("{0}")]
    ChainRejected(String),
    /// The receipt could not be proven against an independently fetched header. Never retried.
    #[error("verifying transaction receipt failed: {0}")]
    ProofMismatch(String),
    #[error("contract name and version already exist: {name} {version}")]
    DuplicateVersion { name: String, version: String },
    #[error("{0} constructor needs arguments")]
    MissingConstructorArgs(String),
    #[error("{contract} constructor arguments encode failed: {reason}")]
    ConstructorEncoding { contract: String, reason: String },
    #[error("compiling contract failed, {0}")]
    Compile(String),
    #[error("{0}")]
    InvalidArgs(String),
    #[error("connection property {key}: {reason}")]
    Property { key: String, reason: String },
}

impl StubError {
    pub fn transport(error: impl ToString) -> Self {
        StubError::Transport(error.to_string())
    }

    /// Whether this error came from the caller's input rather than the chain or the network.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            StubError::DuplicateVersion { .. }
                | StubError::MissingConstructorArgs(_)
                | StubError::ConstructorEncoding { .. }
                | StubError::InvalidArgs(_)
        )
    }
}

impl From<ProofError> for StubError {
    fn from(error: ProofError) -> Self {
        StubError::ProofMismatch(error.to_string())
    }
}

impl From<serde_json::Error> for StubError {
    fn from(error: serde_json::Error) -> Self {
        StubError::Transport(format!("malformed payload: {error}"))
    }
}
