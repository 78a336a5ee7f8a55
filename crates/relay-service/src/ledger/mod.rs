//! Ledger network seam
//!
//! The relay only needs four things from the ledger: a recent blockhash to
//! build against, fire-and-forget submission, status lookup by reference,
//! and a read of the credentials an account holds. Confirmation is always
//! learned by polling `operation_status`; no subscription channel is used.

pub mod mock;
pub mod rpc;
pub mod transaction;

use async_trait::async_trait;
use repute_common::{Credential, IssuanceInfo};
use serde::{Deserialize, Serialize};
use solana_client::client_error::ClientError;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::SignerError;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

pub use mock::MockLedger;
pub use rpc::SolanaRpcLedger;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("RPC client error: {0}")]
    Client(#[from] ClientError),

    #[error("Ledger refused the operation: {0}")]
    Refused(String),

    #[error("Unexpected RPC response: {0}")]
    Decode(String),

    #[error("Failed to encode instruction: {0}")]
    Encode(String),

    #[error("Failed to sign transaction: {0}")]
    Signing(#[from] SignerError),
}

/// How far the ledger has progressed an operation
///
/// Any of the three counts as confirmed for the relay's purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    Processed,
    Confirmed,
    Finalized,
}

/// Status of a submitted operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub level: CommitmentLevel,
    /// Set when the operation landed but failed to execute
    pub error: Option<String>,
}

/// A fully signed badge issuance, ready to submit
#[derive(Debug, Clone)]
pub struct SignedIssuance {
    /// Fee payer signature; the ledger's reference for the operation
    pub tx_ref: Signature,
    /// The credential this operation creates
    pub credential: Credential,
    pub transaction: Transaction,
}

#[async_trait]
pub trait LedgerNetwork: Send + Sync {
    /// Recent blockhash to anchor a new transaction
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// Send without waiting for confirmation; returns the operation reference
    async fn submit(&self, issuance: &SignedIssuance) -> Result<Signature, LedgerError>;

    /// `None` while the ledger has not seen the operation
    async fn operation_status(&self, tx_ref: &Signature)
        -> Result<Option<OperationStatus>, LedgerError>;

    /// Credentials currently owned by `owner` (may lag recent issuance)
    async fn credentials_owned_by(&self, owner: &Pubkey) -> Result<Vec<Credential>, LedgerError>;

    /// The transaction that created a credential
    async fn issuance_of(&self, credential_id: &Pubkey) -> Result<Option<IssuanceInfo>, LedgerError>;
}
