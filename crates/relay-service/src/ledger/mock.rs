//! Mock ledger for development and testing
//!
//! Simulates a ledger node without requiring a network connection. Accepted
//! submissions become visible to ownership queries immediately; confirmation
//! is reported after a configurable number of status polls.

use async_trait::async_trait;
use chrono::Utc;
use repute_common::{Credential, IssuanceInfo};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{CommitmentLevel, LedgerError, LedgerNetwork, OperationStatus, SignedIssuance};

/// How the mock treats submitted operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Report confirmed once this many polls have seen the operation as pending
    ConfirmAfter(u32),
    /// Accept submissions but never report them
    NeverConfirm,
    /// Refuse every submission at the transport level
    FailSubmissions,
    /// Accept submissions, then report an execution failure
    RejectOnChain,
    /// Accept submissions; status polls never return
    StallStatus,
}

#[derive(Debug)]
struct PendingOperation {
    polls: u32,
    credential: Credential,
}

#[derive(Debug, Default)]
struct MockState {
    blockhash_counter: u64,
    operations: HashMap<Signature, PendingOperation>,
    credentials: Vec<Credential>,
    issuances: HashMap<Pubkey, IssuanceInfo>,
    submissions: usize,
    status_polls: usize,
}

/// In-process stand-in for a ledger node
pub struct MockLedger {
    behavior: MockBehavior,
    submit_delay: Duration,
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// A mock that confirms on the first status poll
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::ConfirmAfter(0))
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            submit_delay: Duration::ZERO,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Hold every submission for `delay` before answering
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    /// Place a credential on the ledger without an issuance flow
    pub async fn insert_credential(&self, credential: Credential, issuance: Option<IssuanceInfo>) {
        let mut state = self.state.lock().await;
        if let Some(info) = issuance {
            state.issuances.insert(credential.id, info);
        }
        state.credentials.push(credential);
    }

    /// Number of submissions the mock has seen (including refused ones)
    pub async fn submission_count(&self) -> usize {
        self.state.lock().await.submissions
    }

    /// Number of `operation_status` calls
    pub async fn status_poll_count(&self) -> usize {
        self.state.lock().await.status_polls
    }

    /// All credentials currently on the mock ledger
    pub async fn credentials(&self) -> Vec<Credential> {
        self.state.lock().await.credentials.clone()
    }
}

#[async_trait]
impl LedgerNetwork for MockLedger {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        let mut state = self.state.lock().await;
        state.blockhash_counter += 1;

        let mut blockhash = [0u8; 32];
        blockhash[..8].copy_from_slice(&state.blockhash_counter.to_le_bytes());
        Ok(Hash::new_from_array(blockhash))
    }

    async fn submit(&self, issuance: &SignedIssuance) -> Result<Signature, LedgerError> {
        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }

        let mut state = self.state.lock().await;
        state.submissions += 1;

        if self.behavior == MockBehavior::FailSubmissions {
            debug!("Mock ledger: refusing submission {}", issuance.tx_ref);
            return Err(LedgerError::Refused("mock ledger refused submission".to_string()));
        }

        debug!(
            "Mock ledger: accepted {} creating {}",
            issuance.tx_ref, issuance.credential.id
        );

        if self.behavior != MockBehavior::RejectOnChain {
            state.credentials.push(issuance.credential.clone());
            state.issuances.insert(
                issuance.credential.id,
                IssuanceInfo {
                    issuance_tx_ref: issuance.tx_ref.to_string(),
                    created_at: Some(Utc::now()),
                },
            );
        }

        state.operations.insert(
            issuance.tx_ref,
            PendingOperation {
                polls: 0,
                credential: issuance.credential.clone(),
            },
        );

        Ok(issuance.tx_ref)
    }

    async fn operation_status(
        &self,
        tx_ref: &Signature,
    ) -> Result<Option<OperationStatus>, LedgerError> {
        let mut state = self.state.lock().await;
        state.status_polls += 1;

        if self.behavior == MockBehavior::StallStatus {
            drop(state);
            std::future::pending::<()>().await;
            return Ok(None);
        }

        let Some(operation) = state.operations.get_mut(tx_ref) else {
            return Ok(None);
        };

        let status = match self.behavior {
            MockBehavior::ConfirmAfter(n) if operation.polls >= n => Some(OperationStatus {
                level: CommitmentLevel::Confirmed,
                error: None,
            }),
            MockBehavior::RejectOnChain => Some(OperationStatus {
                level: CommitmentLevel::Processed,
                error: Some(format!(
                    "mock execution failure creating {}",
                    operation.credential.id
                )),
            }),
            _ => None,
        };
        operation.polls += 1;

        debug!("Mock ledger: status({}) -> {:?}", tx_ref, status);
        Ok(status)
    }

    async fn credentials_owned_by(&self, owner: &Pubkey) -> Result<Vec<Credential>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .credentials
            .iter()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect())
    }

    async fn issuance_of(&self, credential_id: &Pubkey) -> Result<Option<IssuanceInfo>, LedgerError> {
        Ok(self.state.lock().await.issuances.get(credential_id).cloned())
    }
}
