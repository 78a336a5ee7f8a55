use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use solana_program::pubkey::Pubkey;

use crate::NullifierHash;

/// Lifecycle of a nullifier inside the registry
///
/// absent -> reserved -> committed. A committed record is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullifierState {
    Reserved,
    Committed,
}

/// Registry entry for a consumed (or in-flight) nullifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NullifierRecord {
    pub nullifier_hash: NullifierHash,
    pub state: NullifierState,
    /// When the nullifier was first reserved
    pub consumed_at: DateTime<Utc>,
    /// Issuance transaction, set on commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuance_tx_ref: Option<String>,
}

impl NullifierRecord {
    /// Create a fresh reservation
    pub fn reserved(nullifier_hash: NullifierHash) -> Self {
        Self {
            nullifier_hash,
            state: NullifierState::Reserved,
            consumed_at: Utc::now(),
            issuance_tx_ref: None,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.state == NullifierState::Committed
    }
}

/// A soulbound badge as seen on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Asset account holding the badge
    pub id: Pubkey,
    pub owner: Pubkey,
    pub badge_name: String,
    pub metadata_uri: String,
}

/// Where and when a credential was created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceInfo {
    pub issuance_tx_ref: String,
    /// Block time of the issuance transaction, if the ledger reports one
    pub created_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization() {
        let record = NullifierRecord::reserved(NullifierHash::parse("99").unwrap());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["nullifierHash"], "99");
        assert_eq!(json["state"], "reserved");
        assert!(json.get("issuanceTxRef").is_none());

        let decoded: NullifierRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
        assert!(!decoded.is_committed());
    }
}
