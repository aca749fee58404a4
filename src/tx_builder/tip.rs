//! Tip sizing for priority bundles

use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::{native_token::LAMPORTS_PER_SOL, pubkey::Pubkey};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::errors::TransactionBuilderError;

/// Block-engine tip accounts; one is picked at random per bundle
pub const TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

pub const DEFAULT_TIP_FLOOR_URL: &str = "https://bundles.jito.wtf/api/v1/bundles/tip_floor";

/// Block engines accept at most this many transactions per bundle
pub const MAX_BUNDLE_SIZE: usize = 5;

/// Tip bounds, fallback and tip accounts
#[derive(Debug, Clone)]
pub struct TipPolicy {
    pub tip_accounts: Vec<Pubkey>,
    pub min_tip_lamports: u64,
    pub max_tip_lamports: u64,
    /// Used when no estimate is available
    pub fallback_tip_lamports: u64,
    pub max_bundle_size: usize,
}

impl Default for TipPolicy {
    fn default() -> Self {
        Self {
            tip_accounts: TIP_ACCOUNTS
                .iter()
                .filter_map(|a| Pubkey::from_str(a).ok())
                .collect(),
            min_tip_lamports: 1_000,
            max_tip_lamports: 10_000_000,
            fallback_tip_lamports: 100_000,
            max_bundle_size: MAX_BUNDLE_SIZE,
        }
    }
}

impl TipPolicy {
    /// Parse tip accounts from base58 strings
    pub fn parse_accounts<S: AsRef<str>>(accounts: &[S]) -> Result<Vec<Pubkey>, TransactionBuilderError> {
        accounts
            .iter()
            .map(|a| {
                Pubkey::from_str(a.as_ref()).map_err(|_| {
                    TransactionBuilderError::Configuration(format!(
                        "invalid tip account '{}'",
                        a.as_ref()
                    ))
                })
            })
            .collect()
    }

    pub fn clamp(&self, lamports: u64) -> u64 {
        lamports.clamp(self.min_tip_lamports, self.max_tip_lamports)
    }

    pub fn pick_tip_account(&self) -> Option<Pubkey> {
        if self.tip_accounts.is_empty() {
            return None;
        }
        Some(self.tip_accounts[fastrand::usize(..self.tip_accounts.len())])
    }
}

/// Source of a live tip estimate
#[async_trait]
pub trait TipEstimator: Send + Sync {
    /// Suggested tip in lamports, before clamping
    async fn estimate_tip_lamports(&self) -> Result<u64, TransactionBuilderError>;
}

#[derive(Debug, Deserialize)]
struct TipFloorEntry {
    landed_tips_95th_percentile: f64,
}

/// Tip estimate from the block engine's landed-tip percentiles
#[derive(Debug, Clone)]
pub struct HttpTipFloor {
    client: reqwest::Client,
    url: String,
}

impl HttpTipFloor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TransactionBuilderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransactionBuilderError::Configuration(format!("tip HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

/// Convert a SOL amount from the tip feed into lamports
pub(crate) fn sol_to_lamports(sol: f64) -> Option<u64> {
    if !sol.is_finite() || sol < 0.0 {
        return None;
    }
    let lamports = (sol * LAMPORTS_PER_SOL as f64).round();
    (lamports <= u64::MAX as f64).then_some(lamports as u64)
}

#[async_trait]
impl TipEstimator for HttpTipFloor {
    async fn estimate_tip_lamports(&self) -> Result<u64, TransactionBuilderError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| TransactionBuilderError::tip_unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransactionBuilderError::tip_unavailable(format!(
                "tip floor returned status {}",
                response.status()
            )));
        }

        let entries: Vec<TipFloorEntry> = response
            .json()
            .await
            .map_err(|e| TransactionBuilderError::tip_unavailable(format!("tip floor body: {}", e)))?;

        let entry = entries
            .first()
            .ok_or_else(|| TransactionBuilderError::tip_unavailable("tip floor returned no data"))?;

        let lamports = sol_to_lamports(entry.landed_tips_95th_percentile).ok_or_else(|| {
            TransactionBuilderError::tip_unavailable(format!(
                "tip floor value {} is not a valid amount",
                entry.landed_tips_95th_percentile
            ))
        })?;

        debug!(lamports, "Fetched tip floor estimate");
        Ok(lamports)
    }
}
