//! Ledger RPC access
//!
//! [`LedgerClient`] is the seam between the pipeline and a public ledger
//! node. [`SolanaRpc`] implements it over the nonblocking `RpcClient`;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use serde::Serialize;
use solana_client::{
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use solana_transaction_status::UiTransactionEncoding;
use std::time::Duration;
use tracing::debug;

use super::rpc_errors::RpcManagerError;
use crate::types::ValidityWindow;

/// Status of a submitted transaction as reported by a node
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureStatus {
    pub slot: u64,
    /// Reached at least `confirmed` commitment
    pub confirmed: bool,
    /// Raw on-chain error, if execution failed
    pub err: Option<serde_json::Value>,
}

/// Result of a preflight simulation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationReport {
    pub err: Option<serde_json::Value>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Operations the pipeline needs from a ledger node
#[async_trait]
pub trait LedgerClient: Send + Sync + std::fmt::Debug {
    /// Endpoint identity for logs and error messages
    fn endpoint(&self) -> &str;

    /// Submit a signed transaction. With `preflight` the node simulates it
    /// first and rejects predicted failures, insufficient funds included.
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        preflight: bool,
    ) -> Result<Signature, RpcManagerError>;

    async fn latest_blockhash(&self) -> Result<ValidityWindow, RpcManagerError>;

    async fn block_height(&self) -> Result<u64, RpcManagerError>;

    /// `None` when the node has no record of the signature (yet)
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError>;

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationReport, RpcManagerError>;

    /// Native balance in lamports
    async fn balance(&self, address: &Pubkey) -> Result<u64, RpcManagerError>;

    /// Token account balance in base units; a missing account reads as zero
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, RpcManagerError>;
}

/// [`LedgerClient`] over a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    url: String,
    client: RpcClient,
    commitment: CommitmentConfig,
    timeout: Duration,
}

impl SolanaRpc {
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self::with_commitment(url, timeout, CommitmentConfig::confirmed())
    }

    pub fn with_commitment(url: &str, timeout: Duration, commitment: CommitmentConfig) -> Self {
        Self {
            url: url.to_string(),
            client: RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment),
            commitment,
            timeout,
        }
    }

    fn map_err(&self, err: solana_client::client_error::ClientError) -> RpcManagerError {
        RpcManagerError::from_client_error(err, &self.url, self.timeout.as_millis() as u64)
    }
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("url", &self.url)
            .field("commitment", &self.commitment.commitment)
            .finish_non_exhaustive()
    }
}

/// Preflight runs at `processed` so a transaction can depend on one sent
/// moments earlier
fn send_config(preflight: bool) -> RpcSendTransactionConfig {
    RpcSendTransactionConfig {
        skip_preflight: !preflight,
        preflight_commitment: preflight.then_some(CommitmentLevel::Processed),
        encoding: Some(UiTransactionEncoding::Base64),
        ..RpcSendTransactionConfig::default()
    }
}

/// Serialize whichever error type the node client hands back
fn error_json<E: Serialize>(err: &E) -> serde_json::Value {
    serde_json::to_value(err)
        .unwrap_or_else(|e| serde_json::Value::String(format!("unserializable error: {}", e)))
}

#[async_trait]
impl LedgerClient for SolanaRpc {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        preflight: bool,
    ) -> Result<Signature, RpcManagerError> {
        let config = send_config(preflight);
        self.client
            .send_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn latest_blockhash(&self) -> Result<ValidityWindow, RpcManagerError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))?;
        Ok(ValidityWindow {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        self.client
            .get_block_height_with_commitment(self.commitment)
            .await
            .map_err(|e| self.map_err(e))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError> {
        let response = self
            .client
            .get_signature_statuses(&[*signature])
            .await
            .map_err(|e| self.map_err(e))?;

        Ok(response.value.into_iter().next().flatten().map(|status| {
            let confirmed = status.satisfies_commitment(CommitmentConfig::confirmed());
            SignatureStatus {
                slot: status.slot,
                confirmed,
                err: status.err.as_ref().map(error_json),
            }
        }))
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationReport, RpcManagerError> {
        // Signatures are real and the blockhash is the one that will be sent
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: false,
            commitment: Some(self.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| self.map_err(e))?;

        let result = response.value;
        debug!(
            endpoint = %self.url,
            failed = result.err.is_some(),
            units = ?result.units_consumed,
            "Simulation finished"
        );
        Ok(SimulationReport {
            err: result.err.as_ref().map(error_json),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, RpcManagerError> {
        self.client
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map(|response| response.value)
            .map_err(|e| self.map_err(e))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, RpcManagerError> {
        match self
            .client
            .get_token_account_balance_with_commitment(token_account, self.commitment)
            .await
        {
            Ok(response) => response.value.amount.parse::<u64>().map_err(|e| {
                RpcManagerError::MalformedResponse {
                    endpoint: self.url.clone(),
                    message: format!("token amount '{}': {}", response.value.amount, e),
                }
            }),
            Err(e) => match self.map_err(e) {
                RpcManagerError::AccountNotFound { .. } => Ok(0),
                other => Err(other),
            },
        }
    }
}
