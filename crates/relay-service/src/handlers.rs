//! API request handlers for the relay service

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use repute_common::{HoldingQuery, HoldingResponse, IssueResponse, ProofSubmission, Pubkey};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::holdings::{CredentialHoldingQuery, QueryError};
use crate::nullifier::NullifierRegistry;
use crate::orchestrator::{IssuanceOrchestrator, IssueError};

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<IssuanceOrchestrator>,
    pub holdings: CredentialHoldingQuery,
    pub registry: Arc<dyn NullifierRegistry>,
}

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retryable: false,
        }
    }

    fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn missing_fields(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MissingFields", message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidInput", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "ServiceUnavailable", message).retryable()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "success": false,
            "error": self.code,
            "message": self.message,
            "retryable": self.retryable,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::MissingFields(field) => {
                ApiError::missing_fields(format!("Missing required field: {}", field))
            }
            IssueError::InvalidInput(message) => ApiError::invalid_input(message),
            IssueError::DuplicateNullifier(_) => ApiError::new(
                StatusCode::CONFLICT,
                "DuplicateNullifier",
                "This proof has already been used to claim a badge",
            ),
            IssueError::InvalidProof => ApiError::new(
                StatusCode::UNAUTHORIZED,
                "InvalidProof",
                "Proof verification failed",
            ),
            IssueError::SubmissionFailed(message) => {
                ApiError::new(StatusCode::BAD_GATEWAY, "SubmissionFailed", message).retryable()
            }
            IssueError::Configuration(message) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "ConfigurationError", message)
                    .retryable()
            }
            IssueError::Registry(e) => {
                error!("Nullifier registry failure: {}", e);
                ApiError::service_unavailable("Nullifier registry is temporarily unavailable")
            }
            IssueError::Internal(e) => {
                error!("Internal error during issuance: {}", e);
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "Internal error",
                )
                .retryable()
            }
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        error!("Holding query failed: {}", err);
        ApiError::service_unavailable("Ledger is temporarily unavailable")
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::missing_fields("Request body must be JSON")
            }
            other => ApiError::invalid_input(other.body_text()),
        }
    }
}

/// Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry_ok = match state.registry.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Health check: registry unavailable: {}", e);
            false
        }
    };

    let status = if registry_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if registry_ok { "healthy" } else { "degraded" },
            "service": "repute-relay",
            "issueEnabled": state.orchestrator.is_issue_enabled(),
        })),
    )
}

/// Issue a badge in exchange for a valid, unused proof
pub async fn issue_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProofSubmission>, JsonRejection>,
) -> Result<Json<IssueResponse>, ApiError> {
    let Json(submission) = payload?;

    let outcome = state.orchestrator.issue(submission).await?;

    info!(
        "Issue succeeded: nullifier {} tx {}",
        outcome.nullifier_hash, outcome.tx_ref
    );

    let message = if outcome.confirmed {
        "Badge issued".to_string()
    } else {
        "Badge submitted but not yet confirmed; check issuanceTxRef before relying on it"
            .to_string()
    };

    Ok(Json(IssueResponse {
        success: true,
        issuance_tx_ref: outcome.tx_ref,
        credential_id: outcome.credential_id.to_string(),
        confirmed: outcome.confirmed,
        message,
    }))
}

/// Public check of whether an account holds a badge
pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HoldingQuery>, JsonRejection>,
) -> Result<Json<HoldingResponse>, ApiError> {
    let Json(query) = payload?;

    let account = query
        .account
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::missing_fields("Missing required field: account"))?;

    let account = Pubkey::from_str(account)
        .map_err(|e| ApiError::invalid_input(format!("account: {}", e)))?;

    let badge_name = query
        .badge_name
        .unwrap_or_else(|| state.orchestrator.badge_name().to_string());

    let holding = state.holdings.holds(&account, &badge_name).await?;

    let message = if holding.holds {
        format!("{} holds {}", account, badge_name)
    } else {
        format!("{} does not hold {}", account, badge_name)
    };

    Ok(Json(HoldingResponse {
        holds: holding.holds,
        badge: holding.badge,
        message,
    }))
}
