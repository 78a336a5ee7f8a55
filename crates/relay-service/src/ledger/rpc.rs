//! RPC ledger client
//!
//! Wraps the nonblocking Solana `RpcClient`. Every call carries the client's
//! request timeout, so a stalled node surfaces as an error instead of a hang.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use repute_common::{Credential, IssuanceInfo};
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_rpc_client_api::config::{
    RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig,
};
use solana_rpc_client_api::filter::{Memcmp, RpcFilterType};
use solana_rpc_client_api::response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{TransactionConfirmationStatus, TransactionStatus};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::transaction::{decode_asset_account, ASSET_V1_KEY, CORE_PROGRAM_ID};
use super::{CommitmentLevel, LedgerError, LedgerNetwork, OperationStatus, SignedIssuance};

/// Signatures fetched per `getSignaturesForAddress` call (node maximum)
const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// Ledger client over JSON-RPC
pub struct SolanaRpcLedger {
    client: RpcClient,
}

impl SolanaRpcLedger {
    /// Create a new RPC client
    ///
    /// # Arguments
    /// * `rpc_url` - RPC endpoint (e.g., "https://api.devnet.solana.com")
    /// * `timeout` - Upper bound on any single RPC request
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Self {
        let rpc_url = rpc_url.into();
        info!("Ledger RPC endpoint: {} (timeout {:?})", rpc_url, timeout);

        Self {
            client: RpcClient::new_with_timeout_and_commitment(
                rpc_url,
                timeout,
                CommitmentConfig::confirmed(),
            ),
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }
}

fn status_of(status: TransactionStatus) -> OperationStatus {
    let level = match status.confirmation_status {
        Some(TransactionConfirmationStatus::Finalized) => CommitmentLevel::Finalized,
        Some(TransactionConfirmationStatus::Confirmed) => CommitmentLevel::Confirmed,
        // Seen but not yet reporting a level counts as processed
        Some(TransactionConfirmationStatus::Processed) | None => CommitmentLevel::Processed,
    };

    OperationStatus {
        level,
        error: status.err.map(|e| e.to_string()),
    }
}

/// Walk an address's signature history back to its oldest entry
///
/// Pages arrive newest first. A short page means the history is exhausted.
async fn oldest_signature<F, Fut>(
    mut fetch_page: F,
) -> Result<Option<RpcConfirmedTransactionStatusWithSignature>, LedgerError>
where
    F: FnMut(Option<Signature>) -> Fut,
    Fut: Future<Output = Result<Vec<RpcConfirmedTransactionStatusWithSignature>, LedgerError>>,
{
    let mut before = None;
    let mut oldest = None;

    loop {
        let page = fetch_page(before).await?;
        let exhausted = page.len() < SIGNATURE_PAGE_LIMIT;

        let Some(last) = page.into_iter().last() else {
            break;
        };
        before = Some(Signature::from_str(&last.signature).map_err(|e| {
            LedgerError::Decode(format!("signature {}: {}", last.signature, e))
        })?);
        oldest = Some(last);

        if exhausted {
            break;
        }
    }

    Ok(oldest)
}

#[async_trait]
impl LedgerNetwork for SolanaRpcLedger {
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn submit(&self, issuance: &SignedIssuance) -> Result<Signature, LedgerError> {
        // Preflight is skipped; the status poll reports execution failures
        let signature = self
            .client
            .send_transaction_with_config(
                &issuance.transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..Default::default()
                },
            )
            .await?;

        if signature != issuance.tx_ref {
            return Err(LedgerError::Decode(format!(
                "node returned signature {} for transaction {}",
                signature, issuance.tx_ref
            )));
        }

        Ok(signature)
    }

    async fn operation_status(
        &self,
        tx_ref: &Signature,
    ) -> Result<Option<OperationStatus>, LedgerError> {
        let response = self
            .client
            .get_signature_statuses_with_history(&[*tx_ref])
            .await?;

        Ok(response.value.into_iter().next().flatten().map(status_of))
    }

    async fn credentials_owned_by(&self, owner: &Pubkey) -> Result<Vec<Credential>, LedgerError> {
        // Asset accounts start with the key byte, then the owner
        let config = RpcProgramAccountsConfig {
            filters: Some(vec![
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(0, &[ASSET_V1_KEY])),
                RpcFilterType::Memcmp(Memcmp::new_base58_encoded(1, owner.as_ref())),
            ]),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };

        let accounts = self
            .client
            .get_program_accounts_with_config(&CORE_PROGRAM_ID, config)
            .await?;

        let credentials: Vec<Credential> = accounts
            .into_iter()
            .filter_map(|(id, account)| decode_asset_account(id, &account.data))
            .filter(|c| &c.owner == owner)
            .collect();

        debug!("{} owns {} credential(s)", owner, credentials.len());
        Ok(credentials)
    }

    async fn issuance_of(&self, credential_id: &Pubkey) -> Result<Option<IssuanceInfo>, LedgerError> {
        // The creating transaction is the oldest one touching the asset
        let oldest = oldest_signature(|before| async move {
            let config = GetConfirmedSignaturesForAddress2Config {
                before,
                until: None,
                limit: Some(SIGNATURE_PAGE_LIMIT),
                commitment: Some(CommitmentConfig::confirmed()),
            };
            Ok::<_, LedgerError>(
                self.client
                    .get_signatures_for_address_with_config(credential_id, config)
                    .await?,
            )
        })
        .await?;

        Ok(oldest.map(|info| IssuanceInfo {
            issuance_tx_ref: info.signature,
            created_at: info
                .block_time
                .and_then(|t| Utc.timestamp_opt(t, 0).single()),
        }))
    }
}
