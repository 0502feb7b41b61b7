pub mod block_header;
pub mod cfg;
pub mod cns;
pub mod compiler;
pub mod connection;
pub mod connection_factory;
pub mod contracts;
pub mod crypto;
pub mod deploy;
pub mod error;
pub mod jsonrpc;
pub mod proxy;
mod serde_util;
pub mod submitter;
#[cfg(any(test, feature = "test_util"))]
pub mod test_util;
pub mod transaction;
pub mod verify;

pub use error::{Result, StubError};
