//! Credential holding query
//!
//! Public, read-only check of whether an account holds a named badge.
//! Ledger indices are eventually consistent, so a badge issued moments ago
//! may not be visible yet.

use repute_common::{BadgeSummary, Pubkey};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ledger::{LedgerError, LedgerNetwork};

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Ledger query failed: {0}")]
    Ledger(#[from] LedgerError),
}

/// Answer to a holding query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub holds: bool,
    pub badge: Option<BadgeSummary>,
}

pub struct CredentialHoldingQuery {
    ledger: Arc<dyn LedgerNetwork>,
}

impl CredentialHoldingQuery {
    pub fn new(ledger: Arc<dyn LedgerNetwork>) -> Self {
        Self { ledger }
    }

    /// Whether `account` owns a credential named exactly `badge_name`
    ///
    /// Matching is case-sensitive. Badge details are best effort: a failed
    /// lookup of the issuance transaction still reports the holding.
    pub async fn holds(&self, account: &Pubkey, badge_name: &str) -> Result<Holding, QueryError> {
        let credentials = self.ledger.credentials_owned_by(account).await?;

        let Some(credential) = credentials.into_iter().find(|c| c.badge_name == badge_name) else {
            debug!("{} does not hold {:?}", account, badge_name);
            return Ok(Holding {
                holds: false,
                badge: None,
            });
        };

        let issuance = match self.ledger.issuance_of(&credential.id).await {
            Ok(info) => info,
            Err(e) => {
                warn!(
                    "Could not look up issuance of {} for {}: {}",
                    credential.id, account, e
                );
                None
            }
        };

        debug!("{} holds {:?} ({})", account, badge_name, credential.id);

        Ok(Holding {
            holds: true,
            badge: Some(BadgeSummary {
                name: credential.badge_name,
                issuance_tx_ref: issuance.as_ref().map(|i| i.issuance_tx_ref.clone()),
                timestamp: issuance.and_then(|i| i.created_at),
            }),
        })
    }
}
