//! Issuance orchestrator
//!
//! Per-request flow:
//! 1. Validate input (no side effects on failure)
//! 2. Fail closed if verification or the relayer is not configured
//! 3. Skip already-used nullifiers before doing any proof work
//! 4. Verify the proof off the async runtime
//! 5. Reserve the nullifier (the only serialization point)
//! 6. Submit; a hard failure releases the reservation
//! 7. Poll for confirmation and commit, even when polling times out
//!
//! Side effects only happen at steps 5, 6 and 7, and those three run in a
//! task of their own: once a nullifier is reserved, a dropped request can no
//! longer stop it from being committed or released.

use repute_common::{NullifierHash, ProofSubmission, Pubkey};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::nullifier::{NullifierRegistry, RegistryError, Reservation};
use crate::relay::{ConfirmationOutcome, LedgerRelayClient, Submitted};
use crate::verifier::ProofVerifier;

#[derive(Error, Debug)]
pub enum IssueError {
    #[error("Missing required field: {0}")]
    MissingFields(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Nullifier {0} has already been used")]
    DuplicateNullifier(NullifierHash),

    #[error("Proof verification failed")]
    InvalidProof,

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("Issuance is not configured: {0}")]
    Configuration(String),

    #[error("Nullifier registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IssueError {
    /// Whether the client may retry with the same proof
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IssueError::SubmissionFailed(_)
                | IssueError::Configuration(_)
                | IssueError::Registry(_)
                | IssueError::Internal(_)
        )
    }
}

/// A committed issuance
#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub nullifier_hash: NullifierHash,
    pub tx_ref: String,
    pub credential_id: Pubkey,
    /// False when the confirmation window closed first
    pub confirmed: bool,
}

/// Validated request, ready for the stateful steps
struct ValidatedSubmission {
    nullifier_hash: NullifierHash,
    destination: Pubkey,
    proof: serde_json::Value,
    public_signals: Vec<String>,
}

pub struct IssuanceOrchestrator {
    registry: Arc<dyn NullifierRegistry>,
    verifier: Option<Arc<dyn ProofVerifier>>,
    relay: Option<Arc<LedgerRelayClient>>,
    badge_name: String,
}

impl IssuanceOrchestrator {
    /// An orchestrator with the Issue path disabled until a verifier and a
    /// relay are attached
    pub fn new(registry: Arc<dyn NullifierRegistry>, badge_name: impl Into<String>) -> Self {
        Self {
            registry,
            verifier: None,
            relay: None,
            badge_name: badge_name.into(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ProofVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_relay(mut self, relay: Arc<LedgerRelayClient>) -> Self {
        self.relay = Some(relay);
        self
    }

    /// Whether both the verifier and the relayer are available
    pub fn is_issue_enabled(&self) -> bool {
        self.verifier.is_some() && self.relay.is_some()
    }

    pub fn badge_name(&self) -> &str {
        &self.badge_name
    }

    /// Run one issuance request to a terminal state
    pub async fn issue(&self, submission: ProofSubmission) -> Result<IssueOutcome, IssueError> {
        let request = validate(submission)?;
        let hash = request.nullifier_hash.clone();

        let (Some(verifier), Some(relay)) = (self.verifier.clone(), self.relay.clone()) else {
            error!("Issue request refused: verification key or relayer authority missing");
            return Err(IssueError::Configuration(
                "issuance is disabled on this deployment".to_string(),
            ));
        };

        if self.registry.contains(&hash).await? {
            warn!("Rejecting known nullifier {} before verification", hash);
            return Err(IssueError::DuplicateNullifier(hash));
        }

        let ValidatedSubmission {
            destination,
            proof,
            public_signals,
            ..
        } = request;

        let verified = tokio::task::spawn_blocking(move || verifier.verify(&proof, &public_signals))
            .await
            .map_err(|e| IssueError::Internal(format!("verification task failed: {}", e)))?;

        match verified {
            Ok(true) => debug!("Proof verified for nullifier {}", hash),
            Ok(false) => {
                warn!("Invalid proof for nullifier {}", hash);
                return Err(IssueError::InvalidProof);
            }
            Err(fault) => {
                error!("Proof verifier fault: {}", fault);
                return Err(IssueError::Configuration(
                    "proof verifier is misconfigured".to_string(),
                ));
            }
        }

        // Detached: dropping the request only stops waiting for the result
        let task = tokio::spawn(reserve_and_relay(
            self.registry.clone(),
            relay,
            self.badge_name.clone(),
            hash,
            destination,
        ));

        task.await
            .map_err(|e| IssueError::Internal(format!("issuance task failed: {}", e)))?
    }
}

fn validate(submission: ProofSubmission) -> Result<ValidatedSubmission, IssueError> {
    if !submission.has_proof() {
        return Err(IssueError::MissingFields("proof"));
    }

    let public_signals = match submission.public_signals {
        Some(signals) if !signals.is_empty() => signals,
        _ => return Err(IssueError::MissingFields("publicSignals")),
    };

    let destination = match submission.destination_address.as_deref().map(str::trim) {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => return Err(IssueError::MissingFields("destinationAddress")),
    };

    let nullifier_hash = NullifierHash::parse(&public_signals[0])
        .map_err(|e| IssueError::InvalidInput(e.to_string()))?;

    let destination = Pubkey::from_str(&destination)
        .map_err(|e| IssueError::InvalidInput(format!("destinationAddress: {}", e)))?;

    Ok(ValidatedSubmission {
        nullifier_hash,
        destination,
        proof: submission.proof.unwrap_or_default(),
        public_signals,
    })
}

/// Steps 5 to 7: reserve, submit, then settle the reservation
async fn reserve_and_relay(
    registry: Arc<dyn NullifierRegistry>,
    relay: Arc<LedgerRelayClient>,
    badge_name: String,
    hash: NullifierHash,
    destination: Pubkey,
) -> Result<IssueOutcome, IssueError> {
    if registry.reserve(&hash).await? == Reservation::AlreadyUsed {
        warn!("Lost reservation race for nullifier {}", hash);
        return Err(IssueError::DuplicateNullifier(hash));
    }

    let submitted = match relay.submit(&destination, &badge_name).await {
        Ok(submitted) => submitted,
        Err(e) => {
            error!("Issuance submission for {} failed: {}", hash, e);
            release_reservation(registry.as_ref(), &hash).await;
            return Err(IssueError::SubmissionFailed(
                "the ledger did not accept the issuance; retry with the same proof".to_string(),
            ));
        }
    };

    finalize(registry, relay, hash, submitted).await
}

async fn finalize(
    registry: Arc<dyn NullifierRegistry>,
    relay: Arc<LedgerRelayClient>,
    hash: NullifierHash,
    submitted: Submitted,
) -> Result<IssueOutcome, IssueError> {
    let Submitted {
        tx_ref: signature,
        credential,
    } = submitted;
    let tx_ref = signature.to_string();

    let outcome = relay.await_confirmation(&signature).await;

    let confirmed = match outcome {
        ConfirmationOutcome::Confirmed(_) => true,
        ConfirmationOutcome::Unconfirmed => false,
        ConfirmationOutcome::Rejected(reason) => {
            // A failed signature can never execute again, so the slot is free
            error!("Issuance {} for {} failed on the ledger: {}", tx_ref, hash, reason);
            release_reservation(registry.as_ref(), &hash).await;
            return Err(IssueError::SubmissionFailed(
                "the issuance transaction failed on the ledger; retry with the same proof"
                    .to_string(),
            ));
        }
    };

    // The credential may exist now, so the reservation must never be released
    if let Err(e) = registry.commit(&hash, &tx_ref).await {
        error!(
            "Failed to commit nullifier {} for {}; reservation left in place: {}",
            hash, tx_ref, e
        );
    }

    info!(
        "Issued {} to {} (tx {}, confirmed: {})",
        credential.id, credential.owner, tx_ref, confirmed
    );

    Ok(IssueOutcome {
        nullifier_hash: hash,
        tx_ref,
        credential_id: credential.id,
        confirmed,
    })
}

async fn release_reservation(registry: &dyn NullifierRegistry, hash: &NullifierHash) {
    if let Err(e) = registry.release(hash).await {
        error!("Failed to release reservation for {}: {}", hash, e);
    }
}
