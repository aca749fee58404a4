//! Configuration module for the execution pipeline
//!
//! Configuration is loaded from a TOML file; signing-service secrets are
//! expected in the environment (or a `.env` file) rather than in the file.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rpc_manager::{default_relay_endpoints, RelayEndpoint};
use crate::signer::{AuthContext, SigningError};
use crate::tx_builder::{DEFAULT_TIP_FLOOR_URL, MAX_BUNDLE_SIZE, TIP_ACCOUNTS};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Public ledger endpoints
    pub rpc: RpcConfig,

    /// Priority relays and tips
    #[serde(default)]
    pub relay: RelayConfig,

    /// Custodial signing service
    pub signer: SignerConfig,

    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Monitoring and metrics
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Public endpoints, tried in order
    pub endpoints: Vec<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,

    /// Commitment for reads and preflight: processed, confirmed or finalized
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_relay_endpoints")]
    pub endpoints: Vec<RelayEndpoint>,

    /// Per-endpoint submission timeout in milliseconds
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_tip_floor_url")]
    pub tip_floor_url: String,

    #[serde(default = "default_tip_accounts")]
    pub tip_accounts: Vec<String>,

    #[serde(default = "default_min_tip")]
    pub min_tip_lamports: u64,

    #[serde(default = "default_max_tip")]
    pub max_tip_lamports: u64,

    /// Tip used when the estimate is unavailable
    #[serde(default = "default_fallback_tip")]
    pub fallback_tip_lamports: u64,

    /// Transactions per bundle, tip included
    #[serde(default = "default_max_bundle_size")]
    pub max_bundle_size: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub base_url: String,

    #[serde(default)]
    pub app_id: String,

    /// Prefer `SIGNER_APP_SECRET`
    #[serde(default, skip_serializing)]
    pub app_secret: Option<String>,

    /// Prefer `SIGNER_AUTHORIZATION_KEY`
    #[serde(default, skip_serializing)]
    pub authorization_key: Option<String>,

    /// Owner key assigned to wallets that have none
    #[serde(default)]
    pub owner_key_id: Option<String>,

    #[serde(default = "default_signer_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Consecutive polls with RPC errors before reporting a timeout
    #[serde(default = "default_max_rpc_failures")]
    pub max_consecutive_rpc_failures: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Simulate single transactions before broadcasting
    #[serde(default = "default_true")]
    pub simulate_before_send: bool,

    /// Lamports kept aside for fees when checking transfer balances
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer_lamports: u64,

    /// Use priority relays unless a request opts out
    #[serde(default = "default_true")]
    pub default_priority_path: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Default value functions
fn default_rpc_timeout_ms() -> u64 { 10_000 }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_relay_timeout_ms() -> u64 { 3_000 }
fn default_tip_floor_url() -> String { DEFAULT_TIP_FLOOR_URL.to_string() }
fn default_tip_accounts() -> Vec<String> { TIP_ACCOUNTS.iter().map(|a| a.to_string()).collect() }
fn default_min_tip() -> u64 { 1_000 }
fn default_max_tip() -> u64 { 10_000_000 }
fn default_fallback_tip() -> u64 { 100_000 }
fn default_max_bundle_size() -> usize { MAX_BUNDLE_SIZE }
fn default_signer_timeout_ms() -> u64 { 15_000 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_max_rpc_failures() -> u32 { 20 }
fn default_fee_buffer() -> u64 { 10_000 }
fn default_metrics_port() -> u16 { 9090 }
fn default_true() -> bool { true }

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            endpoints: default_relay_endpoints(),
            timeout_ms: default_relay_timeout_ms(),
            tip_floor_url: default_tip_floor_url(),
            tip_accounts: default_tip_accounts(),
            min_tip_lamports: default_min_tip(),
            max_tip_lamports: default_max_tip(),
            fallback_tip_lamports: default_fallback_tip(),
            max_bundle_size: default_max_bundle_size(),
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_consecutive_rpc_failures: default_max_rpc_failures(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            simulate_before_send: default_true(),
            fee_buffer_lamports: default_fee_buffer(),
            default_priority_path: default_true(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl std::fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConfig")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_ref().map(|_| "[REDACTED]"))
            .field(
                "authorization_key",
                &self.authorization_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("owner_key_id", &self.owner_key_id)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl SignerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Credentials for the signing service
    pub fn auth_context(&self) -> Result<AuthContext, SigningError> {
        let secret = self
            .app_secret
            .clone()
            .ok_or_else(|| SigningError::Configuration("app secret is not set".to_string()))?;
        let mut auth = AuthContext::new(self.app_id.clone(), secret)?;
        if let Some(key) = &self.authorization_key {
            auth = auth.with_authorization_key(key.clone());
        }
        if let Some(owner) = &self.owner_key_id {
            auth = auth.with_owner_key_id(owner.clone());
        }
        Ok(auth)
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides, then validate
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus `.env` and environment overrides, for runs without a
    /// config file
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_defaults_with(|key| std::env::var(key).ok())
    }

    /// Defaults with overrides from `lookup`, then validate
    pub fn from_defaults_with<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (normally the process environment)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoints) = non_empty("RPC_ENDPOINTS") {
            self.rpc.endpoints = endpoints
                .split(',')
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(url) = non_empty("SIGNER_BASE_URL") {
            self.signer.base_url = url;
        }
        if let Some(app_id) = non_empty("SIGNER_APP_ID") {
            self.signer.app_id = app_id;
        }
        if let Some(secret) = non_empty("SIGNER_APP_SECRET") {
            self.signer.app_secret = Some(secret);
        }
        if let Some(key) = non_empty("SIGNER_AUTHORIZATION_KEY") {
            self.signer.authorization_key = Some(key);
        }
        if let Some(owner) = non_empty("SIGNER_OWNER_KEY_ID") {
            self.signer.owner_key_id = Some(owner);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rpc.endpoints.is_empty() {
            bail!("rpc.endpoints must list at least one public endpoint");
        }
        for endpoint in &self.rpc.endpoints {
            if !is_http_url(endpoint) {
                bail!("rpc endpoint '{}' is not an http(s) URL", endpoint);
            }
        }
        if self.rpc.timeout_ms == 0 {
            bail!("rpc.timeout_ms must be greater than zero");
        }
        if !matches!(self.rpc.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            bail!(
                "rpc.commitment must be processed, confirmed or finalized, got '{}'",
                self.rpc.commitment
            );
        }

        // Also bounds the tip-floor request, so checked with relays disabled
        if self.relay.timeout_ms == 0 {
            bail!("relay.timeout_ms must be greater than zero");
        }
        if self.relay.enabled {
            for endpoint in &self.relay.endpoints {
                if !is_http_url(&endpoint.url) {
                    bail!("relay endpoint '{}' is not an http(s) URL", endpoint.url);
                }
            }
            if self.relay.min_tip_lamports > self.relay.max_tip_lamports {
                bail!(
                    "relay.min_tip_lamports ({}) exceeds relay.max_tip_lamports ({})",
                    self.relay.min_tip_lamports,
                    self.relay.max_tip_lamports
                );
            }
            if self.relay.tip_accounts.is_empty() {
                bail!("relay.tip_accounts must not be empty");
            }
            if !(1..=MAX_BUNDLE_SIZE).contains(&self.relay.max_bundle_size) {
                bail!(
                    "relay.max_bundle_size must be between 1 and {}",
                    MAX_BUNDLE_SIZE
                );
            }
        }

        if !is_http_url(&self.signer.base_url) {
            bail!("signer.base_url '{}' is not an http(s) URL", self.signer.base_url);
        }
        if self.signer.timeout_ms == 0 {
            bail!("signer.timeout_ms must be greater than zero");
        }
        if self.signer.app_id.trim().is_empty() {
            bail!("signer app id is not set (signer.app_id or SIGNER_APP_ID)");
        }
        if self.signer.app_secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
            bail!("signer app secret is not set (SIGNER_APP_SECRET)");
        }

        if self.confirmation.poll_interval_ms == 0 {
            bail!("confirmation.poll_interval_ms must be greater than zero");
        }
        if self.confirmation.max_consecutive_rpc_failures == 0 {
            bail!("confirmation.max_consecutive_rpc_failures must be greater than zero");
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig {
                endpoints: vec!["https://api.mainnet-beta.solana.com".to_string()],
                timeout_ms: default_rpc_timeout_ms(),
                commitment: default_commitment(),
            },
            relay: RelayConfig::default(),
            signer: SignerConfig {
                base_url: "http://127.0.0.1:8080".to_string(),
                app_id: String::new(),
                app_secret: None,
                authorization_key: None,
                owner_key_id: None,
                timeout_ms: default_signer_timeout_ms(),
            },
            confirmation: ConfirmationConfig::default(),
            execution: ExecutionConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}
