//! Repute relay service
//!
//! Exchanges a zero-knowledge proof of eligibility for a non-transferable
//! badge issued on the ledger, at most once per nullifier. Relying parties
//! can publicly check whether an account holds a badge.

pub mod config;
pub mod handlers;
pub mod holdings;
pub mod ledger;
pub mod nullifier;
pub mod orchestrator;
pub mod relay;
pub mod relayer;
pub mod verifier;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use handlers::AppState;
pub use holdings::CredentialHoldingQuery;
pub use ledger::{LedgerNetwork, MockLedger, SolanaRpcLedger};
pub use nullifier::{InMemoryNullifierRegistry, NullifierRegistry, RedisNullifierRegistry};
pub use orchestrator::IssuanceOrchestrator;
pub use relay::LedgerRelayClient;
pub use relayer::RelayerAuthority;
pub use verifier::{Groth16Verifier, ProofVerifier};

/// Create the application router
///
/// Only the Query route is open cross-origin; Issue stays same-origin.
pub fn create_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    let public_cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/mint", post(handlers::issue_handler))
        .route(
            "/api/verify",
            post(handlers::verify_handler).layer(public_cors),
        )
        .with_state(shared_state)
        .layer(TraceLayer::new_for_http())
}
