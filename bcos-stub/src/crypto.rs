//! Account keys used to sign BCOS transactions.
//!
//! The exact implementations of these primitives is an implementation detail for this module only and dependents
//! should not care about the implementations.

use std::fmt::{self, Debug, Formatter};

use alloy::primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{Result, StubError};

/// The secret key of an account. Transactions are signed with ECDSA over secp256k1, the same as Ethereum.
#[derive(Clone)]
pub struct Credentials {
    key: SigningKey,
}

impl Credentials {
    /// Generates a random account.
    pub fn random() -> Credentials {
        Credentials {
            key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Credentials> {
        let key = SigningKey::from_slice(bytes).map_err(|e| StubError::Signature(e.to_string()))?;
        Ok(Credentials { key })
    }

    pub fn from_hex(s: &str) -> Result<Credentials> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map_err(|e| StubError::Signature(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> Address {
        public_key_to_address(self.key.verifying_key())
    }

    /// Signs a 32-byte digest, returning the signature and its recovery id.
    pub fn sign_prehash(&self, digest: B256) -> Result<(Signature, RecoveryId)> {
        self.key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| StubError::Signature(e.to_string()))
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    // Remove the first byte before hashing - The first byte specifies the encoding tag.
    let point = key.to_encoded_point(false);
    Address::from_slice(&Keccak256::digest(&point.as_bytes()[1..])[12..32])
}

/// Recovers the address which produced `signature` over `digest`.
pub fn recover_address(
    digest: B256,
    signature: &Signature,
    recovery_id: RecoveryId,
) -> Result<Address> {
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), signature, recovery_id)
        .map_err(|e| StubError::Signature(e.to_string()))?;
    Ok(public_key_to_address(&key))
}
