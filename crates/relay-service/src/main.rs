//! Repute Relay Service
//!
//! HTTP service that issues soulbound badges for valid ZK proofs and answers
//! public badge holding queries.

use anyhow::{Context, Result};
use repute_relay::{
    create_router, AppState, Config, CredentialHoldingQuery, Groth16Verifier,
    InMemoryNullifierRegistry, IssuanceOrchestrator, LedgerNetwork, LedgerRelayClient, MockLedger,
    NullifierRegistry, ProofVerifier, RedisNullifierRegistry, RelayerAuthority, SolanaRpcLedger,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,repute_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Repute Relay Service");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  API address: {}", config.api_address());
    info!("  RPC URL: {} (timeout {:?})", config.rpc_url, config.rpc_timeout);
    info!("  Badge: {:?}", config.badge_name);
    info!("  Mock mode: {}", config.mock_mode);
    info!(
        "  Confirmation: {} x {:?}",
        config.poll_attempts, config.poll_interval
    );

    // Nullifier registry
    let registry: Arc<dyn NullifierRegistry> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisNullifierRegistry::new(url)
                .await
                .context("Failed to connect nullifier registry to Redis")?,
        ),
        None => {
            warn!("REDIS_URL not set: using in-memory nullifier registry");
            warn!("Used nullifiers will be forgotten on restart; do not run this in production");
            Arc::new(InMemoryNullifierRegistry::new())
        }
    };

    // Ledger
    let ledger: Arc<dyn LedgerNetwork> = if config.mock_mode {
        warn!("MOCK_MODE enabled: badges are issued to an in-memory ledger");
        Arc::new(MockLedger::new())
    } else {
        Arc::new(SolanaRpcLedger::new(
            config.rpc_url.clone(),
            config.rpc_timeout,
        ))
    };

    // Relayer authority: absent disables Issue, malformed is fatal
    let authority = match &config.relayer_secret {
        Some(secret) => {
            let authority = RelayerAuthority::from_json_secret(secret)
                .context("RELAYER_PRIVATE_KEY is malformed")?;
            info!("Relayer authority: {}", authority.address());
            Some(authority)
        }
        None => {
            error!("RELAYER_PRIVATE_KEY not set: Issue is disabled, Query remains available");
            None
        }
    };

    // Proof verifier: a missing or malformed key disables Issue
    let verifier: Option<Arc<dyn ProofVerifier>> =
        match Groth16Verifier::from_file(&config.verification_key_path) {
            Ok(verifier) => {
                info!(
                    "Loaded verification key from {} ({} public signals)",
                    config.verification_key_path.display(),
                    verifier.public_signal_count()
                );
                Some(Arc::new(verifier))
            }
            Err(e) => {
                error!(
                    "Failed to load verification key from {}: {}; Issue is disabled",
                    config.verification_key_path.display(),
                    e
                );
                None
            }
        };

    let mut orchestrator = IssuanceOrchestrator::new(registry.clone(), config.badge_name.clone());
    if let Some(verifier) = verifier {
        orchestrator = orchestrator.with_verifier(verifier);
    }
    if let Some(authority) = authority {
        orchestrator = orchestrator.with_relay(Arc::new(LedgerRelayClient::new(
            ledger.clone(),
            authority,
            config.badge_metadata_uri.clone(),
            config.poll_interval,
            config.poll_attempts,
        )));
    }

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        holdings: CredentialHoldingQuery::new(ledger),
        registry,
    };

    // Create router
    let app = create_router(state);

    // Bind and serve
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Repute Relay Service running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
            }
        })
        .await
        .context("Server error")?;

    info!("Shutting down Repute Relay Service");

    Ok(())
}
