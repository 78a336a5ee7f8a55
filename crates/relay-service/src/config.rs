//! Configuration management for the Repute relay service
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default badge name, used for issuance and as the default Query filter
pub const DEFAULT_BADGE_NAME: &str = "Repute: Power User";

/// Default metadata locator for the badge
pub const DEFAULT_BADGE_METADATA_URI: &str = "https://repute.xyz/badges/power-user/metadata.json";

/// Default confirmation poll interval
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default confirmation poll budget (30 x 1s = 30s ceiling)
pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

/// Default upper bound on a single ledger RPC request
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 10_000;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// API server host
    pub api_host: String,

    /// API server port
    pub api_port: u16,

    /// Ledger JSON-RPC endpoint
    pub rpc_url: String,

    /// Timeout applied to every ledger RPC request
    pub rpc_timeout: Duration,

    /// Relayer signing secret (JSON byte array). None disables issuance.
    pub relayer_secret: Option<String>,

    /// Badge display name
    pub badge_name: String,

    /// Immutable badge metadata locator
    pub badge_metadata_uri: String,

    /// snarkjs Groth16 verification key, fixed per deployment
    pub verification_key_path: PathBuf,

    /// Redis URL for the durable nullifier registry
    pub redis_url: Option<String>,

    /// Whether to use the in-memory mock ledger (for development/testing)
    pub mock_mode: bool,

    /// Interval between confirmation polls
    pub poll_interval: Duration,

    /// Maximum number of confirmation polls
    pub poll_attempts: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            api_host: non_empty("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),

            api_port: non_empty("API_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("Invalid API_PORT")?,

            rpc_url: non_empty("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8899".to_string()),

            rpc_timeout: Duration::from_millis(
                non_empty("RPC_TIMEOUT_MS")
                    .map(|v| v.parse())
                    .transpose()
                    .context("Invalid RPC_TIMEOUT_MS")?
                    .unwrap_or(DEFAULT_RPC_TIMEOUT_MS),
            ),

            relayer_secret: non_empty("RELAYER_PRIVATE_KEY"),

            badge_name: non_empty("BADGE_NAME").unwrap_or_else(|| DEFAULT_BADGE_NAME.to_string()),

            badge_metadata_uri: non_empty("BADGE_METADATA_URI")
                .unwrap_or_else(|| DEFAULT_BADGE_METADATA_URI.to_string()),

            verification_key_path: non_empty("VERIFICATION_KEY_PATH")
                .unwrap_or_else(|| "./verification_key.json".to_string())
                .into(),

            redis_url: non_empty("REDIS_URL"),

            mock_mode: non_empty("MOCK_MODE")
                .unwrap_or_else(|| "false".to_string())
                .parse()
                .context("Invalid MOCK_MODE (expected true/false)")?,

            poll_interval: Duration::from_millis(
                non_empty("CONFIRM_POLL_INTERVAL_MS")
                    .map(|v| v.parse())
                    .transpose()
                    .context("Invalid CONFIRM_POLL_INTERVAL_MS")?
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),

            poll_attempts: non_empty("CONFIRM_MAX_ATTEMPTS")
                .map(|v| v.parse())
                .transpose()
                .context("Invalid CONFIRM_MAX_ATTEMPTS")?
                .unwrap_or(DEFAULT_POLL_ATTEMPTS),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.api_port == 0 {
            anyhow::bail!("API_PORT must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("CONFIRM_POLL_INTERVAL_MS must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            anyhow::bail!("RPC_TIMEOUT_MS must be greater than 0");
        }

        if self.poll_attempts == 0 {
            anyhow::bail!("CONFIRM_MAX_ATTEMPTS must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_host", &self.api_host)
            .field("api_port", &self.api_port)
            .field("rpc_url", &self.rpc_url)
            .field("rpc_timeout", &self.rpc_timeout)
            .field(
                "relayer_secret",
                &self.relayer_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("badge_name", &self.badge_name)
            .field("badge_metadata_uri", &self.badge_metadata_uri)
            .field("verification_key_path", &self.verification_key_path)
            .field("redis_url", &self.redis_url)
            .field("mock_mode", &self.mock_mode)
            .field("poll_interval", &self.poll_interval)
            .field("poll_attempts", &self.poll_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_defaults() {
        let config = config_from(&[]).expect("Failed to load config");

        assert_eq!(config.api_address(), "0.0.0.0:3000");
        assert_eq!(config.rpc_url, "http://127.0.0.1:8899");
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert_eq!(config.badge_name, DEFAULT_BADGE_NAME);
        assert!(config.relayer_secret.is_none());
        assert!(config.redis_url.is_none());
        assert!(!config.mock_mode);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.poll_attempts, 30);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("API_PORT", "9000"),
            ("MOCK_MODE", "true"),
            ("CONFIRM_POLL_INTERVAL_MS", "250"),
            ("CONFIRM_MAX_ATTEMPTS", "4"),
            ("RPC_TIMEOUT_MS", "2500"),
            ("REDIS_URL", "redis://localhost:6379"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert!(config.mock_mode);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_attempts, 4);
        assert_eq!(config.rpc_timeout, Duration::from_millis(2500));
        assert_eq!(config.redis_url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_blank_secret_is_absent() {
        let config = config_from(&[("RELAYER_PRIVATE_KEY", "  ")]).unwrap();
        assert!(config.relayer_secret.is_none());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(config_from(&[("CONFIRM_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config_from(&[("RPC_TIMEOUT_MS", "0")]).is_err());
        assert!(config_from(&[("API_PORT", "not-a-port")]).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = config_from(&[("RELAYER_PRIVATE_KEY", "[1,2,3]")]).unwrap();
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("[1,2,3]"));
    }
}
