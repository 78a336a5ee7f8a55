//! Ledger relay: builds, signs and submits badge issuance, then polls
//!
//! Confirmation is learned by polling the operation reference at a fixed
//! interval with a bounded attempt budget and a wall-clock ceiling. Running
//! out of either is not a failure: the operation may still land, so the
//! caller gets the reference back flagged as unconfirmed.

use repute_common::Credential;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ledger::transaction::build_issuance;
use crate::ledger::{CommitmentLevel, LedgerError, LedgerNetwork};
use crate::relayer::RelayerAuthority;

/// Floor for the confirmation window
pub const MIN_CONFIRMATION_WINDOW: Duration = Duration::from_secs(1);

/// Hard failures: nothing was accepted by the ledger
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Failed to prepare issuance: {0}")]
    Prepare(#[source] LedgerError),

    #[error("Ledger refused submission: {0}")]
    Submission(#[source] LedgerError),
}

/// Where polling left an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// Reached processed, confirmed or finalized
    Confirmed(CommitmentLevel),
    /// Poll budget or window exhausted (or waiting cancelled) with no status
    Unconfirmed,
    /// Landed but failed to execute; the credential does not exist
    Rejected(String),
}

/// A submission the ledger has accepted
#[derive(Debug, Clone)]
pub struct Submitted {
    pub tx_ref: Signature,
    pub credential: Credential,
}

/// Result of a full `issue` call
#[derive(Debug, Clone)]
pub struct IssuanceResult {
    pub tx_ref: Signature,
    pub credential: Credential,
    pub outcome: ConfirmationOutcome,
}

impl IssuanceResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.outcome, ConfirmationOutcome::Confirmed(_))
    }
}

/// Submits issuance operations signed by the relayer authority
pub struct LedgerRelayClient {
    ledger: Arc<dyn LedgerNetwork>,
    authority: RelayerAuthority,
    metadata_uri: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl LedgerRelayClient {
    pub fn new(
        ledger: Arc<dyn LedgerNetwork>,
        authority: RelayerAuthority,
        metadata_uri: impl Into<String>,
        poll_interval: Duration,
        poll_attempts: u32,
    ) -> Self {
        Self {
            ledger,
            authority,
            metadata_uri: metadata_uri.into(),
            poll_interval,
            poll_attempts,
        }
    }

    /// Relayer account paying for issuance
    pub fn authority_address(&self) -> Pubkey {
        self.authority.address()
    }

    /// Wall-clock ceiling on confirmation polling
    ///
    /// `poll_attempts x poll_interval`, but never less than
    /// `MIN_CONFIRMATION_WINDOW` so that slow status calls still get a
    /// chance with very short intervals.
    pub fn confirmation_window(&self) -> Duration {
        self.poll_interval
            .saturating_mul(self.poll_attempts)
            .max(MIN_CONFIRMATION_WINDOW)
    }

    /// Build, sign and send one issuance without waiting for it to land
    pub async fn submit(
        &self,
        destination: &Pubkey,
        badge_name: &str,
    ) -> Result<Submitted, RelayError> {
        let blockhash = self
            .ledger
            .latest_blockhash()
            .await
            .map_err(RelayError::Prepare)?;

        let asset = Keypair::new();
        let issuance = build_issuance(
            &self.authority,
            &asset,
            destination,
            badge_name,
            &self.metadata_uri,
            blockhash,
        )
        .map_err(RelayError::Prepare)?;

        let tx_ref = self
            .ledger
            .submit(&issuance)
            .await
            .map_err(RelayError::Submission)?;

        info!(
            "Submitted issuance {} of {:?} to {} (asset {})",
            tx_ref, badge_name, destination, issuance.credential.id
        );

        Ok(Submitted {
            tx_ref,
            credential: issuance.credential,
        })
    }

    /// Poll the operation until it reaches any commitment level, fails, or
    /// the attempt budget or confirmation window runs out
    pub async fn await_confirmation(&self, tx_ref: &Signature) -> ConfirmationOutcome {
        let window = self.confirmation_window();
        match tokio::time::timeout(window, self.poll_status(tx_ref)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Issuance {} unconfirmed after {:?}", tx_ref, window);
                ConfirmationOutcome::Unconfirmed
            }
        }
    }

    async fn poll_status(&self, tx_ref: &Signature) -> ConfirmationOutcome {
        for attempt in 1..=self.poll_attempts {
            match self.ledger.operation_status(tx_ref).await {
                Ok(Some(status)) => {
                    if let Some(error) = status.error {
                        warn!("Issuance {} failed on the ledger: {}", tx_ref, error);
                        return ConfirmationOutcome::Rejected(error);
                    }
                    info!(
                        "Issuance {} reached {:?} after {} poll(s)",
                        tx_ref, status.level, attempt
                    );
                    return ConfirmationOutcome::Confirmed(status.level);
                }
                Ok(None) => {
                    debug!(
                        "Issuance {} not yet visible (attempt {}/{})",
                        tx_ref, attempt, self.poll_attempts
                    );
                }
                Err(e) => {
                    warn!(
                        "Status poll for {} failed (attempt {}/{}): {}",
                        tx_ref, attempt, self.poll_attempts, e
                    );
                }
            }

            if attempt < self.poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        warn!(
            "Issuance {} unconfirmed after {} attempts",
            tx_ref, self.poll_attempts
        );
        ConfirmationOutcome::Unconfirmed
    }

    /// Submit and wait for confirmation
    pub async fn issue(
        &self,
        destination: &Pubkey,
        badge_name: &str,
    ) -> Result<IssuanceResult, RelayError> {
        let submitted = self.submit(destination, badge_name).await?;
        let outcome = self.await_confirmation(&submitted.tx_ref).await;

        Ok(IssuanceResult {
            tx_ref: submitted.tx_ref,
            credential: submitted.credential,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::{MockBehavior, MockLedger};

    fn relay(ledger: Arc<MockLedger>, attempts: u32) -> LedgerRelayClient {
        LedgerRelayClient::new(
            ledger,
            RelayerAuthority::generate(),
            "https://example.com/badge.json",
            Duration::from_millis(1),
            attempts,
        )
    }

    #[tokio::test]
    async fn test_issue_confirms() {
        let ledger = Arc::new(MockLedger::with_behavior(MockBehavior::ConfirmAfter(2)));
        let client = relay(ledger.clone(), 5);
        let owner = Pubkey::new_unique();

        let result = client.issue(&owner, "Badge").await.unwrap();

        assert!(result.is_confirmed());
        assert_eq!(result.credential.owner, owner);
        assert_eq!(result.credential.badge_name, "Badge");
        assert_eq!(result.credential.metadata_uri, "https://example.com/badge.json");
        assert_eq!(ledger.status_poll_count().await, 3);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_unconfirmed() {
        let ledger = Arc::new(MockLedger::with_behavior(MockBehavior::NeverConfirm));
        let client = relay(ledger.clone(), 4);

        let result = client.issue(&Pubkey::new_unique(), "Badge").await.unwrap();

        assert_eq!(result.outcome, ConfirmationOutcome::Unconfirmed);
        assert!(!result.is_confirmed());
        assert_eq!(ledger.status_poll_count().await, 4);
    }

    #[tokio::test]
    async fn test_submission_failure_is_hard() {
        let ledger = Arc::new(MockLedger::with_behavior(MockBehavior::FailSubmissions));
        let client = relay(ledger.clone(), 3);

        let err = client.issue(&Pubkey::new_unique(), "Badge").await.unwrap_err();

        assert!(matches!(err, RelayError::Submission(_)));
        assert_eq!(ledger.status_poll_count().await, 0);
    }

    #[tokio::test]
    async fn test_execution_failure_is_rejected() {
        let ledger = Arc::new(MockLedger::with_behavior(MockBehavior::RejectOnChain));
        let client = relay(ledger, 3);

        let result = client.issue(&Pubkey::new_unique(), "Badge").await.unwrap();
        assert!(matches!(result.outcome, ConfirmationOutcome::Rejected(_)));
    }

    #[tokio::test]
    async fn test_each_issue_uses_a_fresh_asset() {
        let ledger = Arc::new(MockLedger::new());
        let client = relay(ledger, 3);
        let owner = Pubkey::new_unique();

        let a = client.submit(&owner, "Badge").await.unwrap();
        let b = client.submit(&owner, "Badge").await.unwrap();

        assert_ne!(a.credential.id, b.credential.id);
        assert_ne!(a.tx_ref, b.tx_ref);
    }

    #[tokio::test]
    async fn test_stalled_status_is_bounded_by_window() {
        let ledger = Arc::new(MockLedger::with_behavior(MockBehavior::StallStatus));
        let client = relay(ledger.clone(), 5);
        assert_eq!(client.confirmation_window(), MIN_CONFIRMATION_WINDOW);

        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(3),
            client.issue(&Pubkey::new_unique(), "Badge"),
        )
        .await
        .expect("confirmation wait must end within the window")
        .unwrap();

        assert_eq!(result.outcome, ConfirmationOutcome::Unconfirmed);
        assert!(started.elapsed() >= MIN_CONFIRMATION_WINDOW);
        assert_eq!(ledger.status_poll_count().await, 1);
    }

    #[test]
    fn test_confirmation_window() {
        let ledger = Arc::new(MockLedger::new());
        let client = LedgerRelayClient::new(
            ledger,
            RelayerAuthority::generate(),
            "uri",
            Duration::from_millis(500),
            30,
        );
        assert_eq!(client.confirmation_window(), Duration::from_secs(15));
    }
}
