//! Integration tests for the Repute relay API

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use repute_common::Pubkey;
use std::str::FromStr;
use repute_relay::{
    create_router, verifier::VerifierFault, AppState, CredentialHoldingQuery, Groth16Verifier,
    InMemoryNullifierRegistry, IssuanceOrchestrator, LedgerRelayClient, MockLedger,
    ProofVerifier, RelayerAuthority,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

const BADGE: &str = "Repute: Power User";

/// Accepts proofs carrying `"valid": true`
struct FlagVerifier;

impl ProofVerifier for FlagVerifier {
    fn verify(
        &self,
        proof: &serde_json::Value,
        _public_signals: &[String],
    ) -> Result<bool, VerifierFault> {
        Ok(proof["valid"] == json!(true))
    }
}

/// Helper to create a test app backed by the mock ledger
fn create_test_app(issue_enabled: bool) -> Router {
    let registry = Arc::new(InMemoryNullifierRegistry::new());
    let ledger = Arc::new(MockLedger::new());

    let mut orchestrator = IssuanceOrchestrator::new(registry.clone(), BADGE);
    if issue_enabled {
        orchestrator = orchestrator
            .with_verifier(Arc::new(FlagVerifier))
            .with_relay(Arc::new(LedgerRelayClient::new(
                ledger.clone(),
                RelayerAuthority::generate(),
                "https://example.com/badge.json",
                Duration::from_millis(1),
                5,
            )));
    }

    create_router(AppState {
        orchestrator: Arc::new(orchestrator),
        holdings: CredentialHoldingQuery::new(ledger),
        registry,
    })
}

fn owner() -> String {
    Pubkey::new_from_array([7u8; 32]).to_string()
}

fn mint_body(nullifier: &str, valid: bool) -> serde_json::Value {
    json!({
        "proof": { "valid": valid },
        "publicSignals": [nullifier, "1"],
        "destinationAddress": owner(),
    })
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "repute-relay");
    assert_eq!(json["issueEnabled"], true);
}

#[tokio::test]
async fn test_mint_then_verify() {
    let app = create_test_app(true);

    let (status, json) = post_json(&app, "/api/mint", mint_body("123", true)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["confirmed"], true);
    let tx_ref = json["issuanceTxRef"].as_str().unwrap().to_string();
    assert!(!tx_ref.is_empty());
    assert!(Pubkey::from_str(json["credentialId"].as_str().unwrap()).is_ok());

    let (status, json) = post_json(&app, "/api/verify", json!({ "account": owner() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["holds"], true);
    assert_eq!(json["badge"]["name"], BADGE);
    assert_eq!(json["badge"]["issuanceTxRef"], tx_ref.as_str());

    let (status, json) = post_json(
        &app,
        "/api/verify",
        json!({ "address": owner(), "badgeName": "Some Other Badge" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["holds"], false);
    assert!(json.get("badge").is_none());
}

#[tokio::test]
async fn test_duplicate_nullifier_rejected() {
    let app = create_test_app(true);

    let (status, _) = post_json(&app, "/api/mint", mint_body("555", true)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = post_json(&app, "/api/mint", mint_body("000555", true)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "DuplicateNullifier");
    assert_eq!(json["retryable"], false);
}

#[tokio::test]
async fn test_invalid_proof_rejected() {
    let app = create_test_app(true);

    let (status, json) = post_json(&app, "/api/mint", mint_body("9", false)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "InvalidProof");

    // The nullifier was never consumed
    let (status, _) = post_json(&app, "/api/mint", mint_body("9", true)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_empty_mint_request() {
    let app = create_test_app(true);

    let (status, json) = post_json(&app, "/api/mint", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "MissingFields");
    assert_eq!(json["retryable"], false);
}

#[tokio::test]
async fn test_malformed_bodies() {
    let app = create_test_app(true);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/mint")
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "InvalidInput");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/mint")
                .method("POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "MissingFields");
}

#[tokio::test]
async fn test_invalid_destination() {
    let app = create_test_app(true);

    let (status, json) = post_json(
        &app,
        "/api/mint",
        json!({
            "proof": { "valid": true },
            "publicSignals": ["1"],
            "destinationAddress": "0xdeadbeef",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidInput");
}

#[tokio::test]
async fn test_issue_disabled_fails_closed_but_query_works() {
    let app = create_test_app(false);

    let (status, json) = post_json(&app, "/api/mint", mint_body("1", true)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "ConfigurationError");
    assert_eq!(json["retryable"], true);

    let (status, json) = post_json(&app, "/api/verify", json!({ "account": owner() })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["holds"], false);
}

#[tokio::test]
async fn test_verify_requires_account() {
    let app = create_test_app(true);

    let (status, json) = post_json(&app, "/api/verify", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "MissingFields");

    let (status, json) = post_json(&app, "/api/verify", json!({ "account": "not an address" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "InvalidInput");
}

#[tokio::test]
async fn test_verify_cors_preflight() {
    let app = create_test_app(true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/verify")
                .method("OPTIONS")
                .header("origin", "https://relying-party.example")
                .header("access-control-request-method", "POST")
                .header("access-control-request-headers", "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers["access-control-allow-methods"]
        .to_str()
        .unwrap()
        .contains("POST"));
}

#[tokio::test]
async fn test_verify_cross_origin_response() {
    let app = create_test_app(true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/verify")
                .method("POST")
                .header("origin", "https://relying-party.example")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "account": owner() }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[test]
fn test_verification_key_loading() {
    let missing = Groth16Verifier::from_file("/nonexistent/verification_key.json");
    assert!(matches!(missing, Err(VerifierFault::Io(_))));

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"protocol\": \"groth16\"}").unwrap();
    let malformed = Groth16Verifier::from_file(file.path());
    assert!(matches!(malformed, Err(VerifierFault::MalformedKey(_))));
}
