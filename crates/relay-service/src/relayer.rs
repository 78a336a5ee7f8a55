//! Relayer signing authority
//!
//! Loaded once at startup from `RELAYER_PRIVATE_KEY` and never rotated at
//! runtime. The account must hold enough balance to pay network fees.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{keypair_from_seed, Keypair, Signer};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthorityError {
    #[error("Relayer key is not a JSON byte array: {0}")]
    Encoding(String),

    #[error("Relayer key must be 32 or 64 bytes, got {0}")]
    Length(usize),

    #[error("Relayer keypair bytes are inconsistent: {0}")]
    Keypair(String),
}

/// The service's own signing identity
pub struct RelayerAuthority {
    keypair: Keypair,
}

impl RelayerAuthority {
    /// Parse a secret in keypair-file form: a JSON array of 64 bytes
    /// (secret || public) or 32 bytes (secret only)
    pub fn from_json_secret(secret: &str) -> Result<Self, AuthorityError> {
        let bytes: Vec<u8> =
            serde_json::from_str(secret.trim()).map_err(|e| AuthorityError::Encoding(e.to_string()))?;

        if bytes.len() != 64 && bytes.len() != 32 {
            return Err(AuthorityError::Length(bytes.len()));
        }

        let keypair =
            keypair_from_seed(&bytes[..32]).map_err(|e| AuthorityError::Keypair(e.to_string()))?;

        // The public half of a keypair file must match the secret half
        if bytes.len() == 64 && keypair.pubkey().to_bytes()[..] != bytes[32..] {
            return Err(AuthorityError::Keypair(format!(
                "public key does not belong to the secret (derived {})",
                keypair.pubkey()
            )));
        }

        Ok(Self { keypair })
    }

    /// Generate a fresh authority (keygen, tests, mock mode)
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    /// Account address (public key)
    pub fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Keypair bytes in the same JSON form `from_json_secret` accepts
    pub fn to_json_secret(&self) -> String {
        serde_json::Value::from(self.keypair.to_bytes().to_vec()).to_string()
    }

    pub(crate) fn keypair(&self) -> &Keypair {
        &self.keypair
    }
}

impl fmt::Debug for RelayerAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayerAuthority")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
