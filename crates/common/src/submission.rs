//! Wire types for the Issue and Query operations
//!
//! Every request field is optional at the serde level so that incomplete
//! requests reach the service and are rejected with a specific error code
//! instead of a generic deserialization failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inputs supplied by a client for one issuance attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofSubmission {
    /// Opaque proof blob, handed to the verifier untouched
    #[serde(default)]
    pub proof: Option<serde_json::Value>,

    /// Ordered public signals; element 0 is the nullifier hash
    #[serde(default)]
    pub public_signals: Option<Vec<String>>,

    /// Account that will own the badge
    #[serde(default)]
    pub destination_address: Option<String>,
}

impl ProofSubmission {
    /// Whether the proof blob carries any content
    pub fn has_proof(&self) -> bool {
        match &self.proof {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Object(map)) => !map.is_empty(),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(serde_json::Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        }
    }
}

/// Successful Issue response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueResponse {
    pub success: bool,
    pub issuance_tx_ref: String,
    pub credential_id: String,
    /// False when the confirmation window closed before the ledger
    /// reported the transaction; re-poll `issuance_tx_ref` before relying
    /// on the badge.
    pub confirmed: bool,
    pub message: String,
}

/// Query request from a relying party
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingQuery {
    #[serde(default, alias = "address")]
    pub account: Option<String>,

    #[serde(default)]
    pub badge_name: Option<String>,
}

/// Badge details returned by a positive Query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeSummary {
    pub name: String,
    pub issuance_tx_ref: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Query response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldingResponse {
    pub holds: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<BadgeSummary>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_submission_deserializes() {
        let submission: ProofSubmission = serde_json::from_str("{}").unwrap();
        assert!(!submission.has_proof());
        assert!(submission.public_signals.is_none());
        assert!(submission.destination_address.is_none());
    }

    #[test]
    fn test_submission_camel_case() {
        let submission: ProofSubmission = serde_json::from_value(serde_json::json!({
            "proof": { "pi_a": ["1", "2", "1"] },
            "publicSignals": ["7", "8"],
            "destinationAddress": "11111111111111111111111111111111"
        }))
        .unwrap();

        assert!(submission.has_proof());
        assert_eq!(submission.public_signals.unwrap().len(), 2);
    }

    #[test]
    fn test_empty_proof_object_counts_as_missing() {
        let submission: ProofSubmission =
            serde_json::from_value(serde_json::json!({ "proof": {} })).unwrap();
        assert!(!submission.has_proof());
    }

    #[test]
    fn test_query_accepts_address_alias() {
        let query: HoldingQuery =
            serde_json::from_value(serde_json::json!({ "address": "abc" })).unwrap();
        assert_eq!(query.account.as_deref(), Some("abc"));
        assert!(query.badge_name.is_none());
    }
}
