//! Broadcast routing: priority relays first, public RPC as the fallback
//!
//! Each endpoint attempt yields an [`AttemptOutcome`]. `Retryable` moves on
//! to the next endpoint, `Terminal` stops the broadcast. The router never
//! reports exhaustion before every configured endpoint of the paths it took
//! has been tried once.

use nonempty::NonEmpty;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::ledger::LedgerClient;
use super::relay::PriorityRelay;
use super::rpc_errors::RpcManagerError;
use crate::metrics::metrics;
use crate::observability::CorrelationId;
use crate::signer::SignedTransaction;
use crate::tx_builder::Bundle;
use crate::types::BroadcastMethod;

/// What to broadcast
#[derive(Debug, Clone, Copy)]
pub enum BroadcastPayload<'a> {
    Single(&'a SignedTransaction),
    Bundle(&'a Bundle),
}

/// Result of one endpoint attempt
#[derive(Debug)]
pub enum AttemptOutcome<T> {
    Success(T),
    Retryable(RpcManagerError),
    Terminal(RpcManagerError),
}

impl<T> From<Result<T, RpcManagerError>> for AttemptOutcome<T> {
    fn from(result: Result<T, RpcManagerError>) -> Self {
        match result {
            Ok(value) => AttemptOutcome::Success(value),
            Err(e) if e.is_terminal() => AttemptOutcome::Terminal(e),
            Err(e) => AttemptOutcome::Retryable(e),
        }
    }
}

/// Broadcast failures
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    /// Every endpoint was tried and none accepted the payload
    #[error("All {attempted} broadcast attempts failed, last error: {last_error}")]
    Exhausted { attempted: usize, last_error: String },

    /// An endpoint rejected the transaction for a reason no retry can fix
    #[error("Transaction rejected by {endpoint}: {reason}")]
    Rejected { endpoint: String, reason: String },

    /// Public fallback for a bundle stopped after some transactions were sent
    #[error("Bundle fallback stopped at transaction #{failed_index} after {} transaction(s) were sent: {cause}", .sent.len())]
    PartialBundle {
        sent: Vec<String>,
        failed_index: usize,
        cause: Box<BroadcastError>,
    },
}

impl BroadcastError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::Exhausted { .. } => "exhausted",
            Self::Rejected { .. } => "rejected",
            Self::PartialBundle { .. } => "partial_bundle",
        }
    }
}

/// Accepted broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastReceipt {
    pub method: BroadcastMethod,
    /// Transaction id to track; for bundles the last user transaction
    pub signature: String,
    pub bundle_id: Option<String>,
    /// Every user transaction signature, in order
    pub signatures: Vec<String>,
    pub endpoint: String,
    pub attempts: usize,
}

/// Routes signed payloads to relays and public endpoints
#[derive(Debug, Clone)]
pub struct BroadcastRouter {
    relays: Vec<Arc<dyn PriorityRelay>>,
    public: NonEmpty<Arc<dyn LedgerClient>>,
}

impl BroadcastRouter {
    pub fn new(relays: Vec<Arc<dyn PriorityRelay>>, public: NonEmpty<Arc<dyn LedgerClient>>) -> Self {
        Self { relays, public }
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// Broadcast a payload, trying the priority path first when requested
    ///
    /// `simulated` means the caller already simulated a single transaction
    /// successfully, so public nodes skip their own preflight. Bundle
    /// transactions always go through node preflight on the public path.
    pub async fn broadcast(
        &self,
        payload: BroadcastPayload<'_>,
        use_priority: bool,
        simulated: bool,
        correlation_id: &CorrelationId,
    ) -> Result<BroadcastReceipt, BroadcastError> {
        let started = Instant::now();
        let mut attempts = 0usize;

        if use_priority && !self.relays.is_empty() {
            match self.try_relays(payload, &mut attempts, correlation_id).await {
                Ok(receipt) => {
                    self.record_success(&receipt, started);
                    return Ok(receipt);
                }
                Err(last_error) => {
                    warn!(
                        correlation_id = %correlation_id,
                        relays = self.relays.len(),
                        last_error = %last_error,
                        "All priority endpoints failed, falling back to public RPC"
                    );
                }
            }
        }

        let receipt = match payload {
            BroadcastPayload::Single(tx) => {
                let endpoint = self
                    .send_public(tx, !simulated, &mut attempts, correlation_id)
                    .await?;
                let signature = tx.signature().to_string();
                BroadcastReceipt {
                    method: BroadcastMethod::PublicRpc,
                    signatures: vec![signature.clone()],
                    signature,
                    bundle_id: None,
                    endpoint,
                    attempts,
                }
            }
            BroadcastPayload::Bundle(bundle) => {
                self.send_bundle_public(bundle, &mut attempts, correlation_id)
                    .await?
            }
        };

        self.record_success(&receipt, started);
        Ok(receipt)
    }

    async fn try_relays(
        &self,
        payload: BroadcastPayload<'_>,
        attempts: &mut usize,
        correlation_id: &CorrelationId,
    ) -> Result<BroadcastReceipt, RpcManagerError> {
        let encoded_bundle = match payload {
            BroadcastPayload::Bundle(bundle) => bundle.encoded(),
            BroadcastPayload::Single(_) => Vec::new(),
        };
        let mut last_error = None;

        for relay in &self.relays {
            *attempts += 1;
            metrics().broadcast_attempts.with_label_values(&["relay"]).inc();

            let result = match payload {
                BroadcastPayload::Single(tx) => relay.send_transaction(tx.encoded()).await,
                BroadcastPayload::Bundle(_) => relay.send_bundle(&encoded_bundle).await,
            };

            match result {
                Ok(id) => {
                    let receipt = match payload {
                        BroadcastPayload::Single(tx) => {
                            let signature = tx.signature().to_string();
                            if id != signature {
                                debug!(relay_id = %id, signature = %signature, "Relay returned a different id");
                            }
                            BroadcastReceipt {
                                method: BroadcastMethod::PriorityRelay,
                                signatures: vec![signature.clone()],
                                signature,
                                bundle_id: None,
                                endpoint: relay.endpoint().to_string(),
                                attempts: *attempts,
                            }
                        }
                        BroadcastPayload::Bundle(bundle) => BroadcastReceipt {
                            method: BroadcastMethod::PriorityBundle,
                            signature: bundle.last_signature().to_string(),
                            bundle_id: Some(id),
                            signatures: bundle.user_signatures(),
                            endpoint: relay.endpoint().to_string(),
                            attempts: *attempts,
                        },
                    };
                    return Ok(receipt);
                }
                Err(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        region = %relay.region(),
                        endpoint = %relay.endpoint(),
                        error = %e,
                        "Priority endpoint failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            RpcManagerError::Configuration("no priority endpoints configured".to_string())
        }))
    }

    /// Send one transaction through the public endpoints in order
    async fn send_public(
        &self,
        tx: &SignedTransaction,
        preflight: bool,
        attempts: &mut usize,
        correlation_id: &CorrelationId,
    ) -> Result<String, BroadcastError> {
        let mut last_error: Option<RpcManagerError> = None;

        for client in self.public.iter() {
            *attempts += 1;
            metrics().broadcast_attempts.with_label_values(&["public"]).inc();

            match AttemptOutcome::from(client.send_transaction(tx.transaction(), preflight).await) {
                AttemptOutcome::Success(signature) => {
                    if &signature != tx.signature() {
                        warn!(
                            correlation_id = %correlation_id,
                            returned = %signature,
                            expected = %tx.signature(),
                            "Endpoint returned an unexpected signature"
                        );
                    }
                    return Ok(client.endpoint().to_string());
                }
                AttemptOutcome::Terminal(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        endpoint = %client.endpoint(),
                        error = %e,
                        "Transaction rejected, not trying other endpoints"
                    );
                    return Err(BroadcastError::Rejected {
                        endpoint: client.endpoint().to_string(),
                        reason: e.to_string(),
                    });
                }
                AttemptOutcome::Retryable(e) => {
                    warn!(
                        correlation_id = %correlation_id,
                        endpoint = %client.endpoint(),
                        error = %e,
                        "Public endpoint failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(BroadcastError::Exhausted {
            attempted: *attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no endpoint attempted".to_string()),
        })
    }

    /// Public fallback for a bundle: user transactions one by one, in order,
    /// without the tip
    async fn send_bundle_public(
        &self,
        bundle: &Bundle,
        attempts: &mut usize,
        correlation_id: &CorrelationId,
    ) -> Result<BroadcastReceipt, BroadcastError> {
        let mut sent = Vec::with_capacity(bundle.transactions().len());
        let mut endpoint = String::new();

        for (index, tx) in bundle.transactions().iter().enumerate() {
            match self.send_public(tx, true, attempts, correlation_id).await {
                Ok(used) => {
                    sent.push(tx.signature().to_string());
                    endpoint = used;
                }
                Err(cause) if sent.is_empty() => return Err(cause),
                Err(cause) => {
                    return Err(BroadcastError::PartialBundle {
                        sent,
                        failed_index: index,
                        cause: Box::new(cause),
                    })
                }
            }
        }

        Ok(BroadcastReceipt {
            method: BroadcastMethod::PublicRpc,
            signature: bundle.last_signature().to_string(),
            bundle_id: None,
            signatures: sent,
            endpoint,
            attempts: *attempts,
        })
    }

    fn record_success(&self, receipt: &BroadcastReceipt, started: Instant) {
        metrics()
            .broadcast_successes
            .with_label_values(&[receipt.method.as_str()])
            .inc();
        info!(
            method = %receipt.method,
            signature = %receipt.signature,
            bundle_id = ?receipt.bundle_id,
            endpoint = %receipt.endpoint,
            attempts = receipt.attempts,
            latency_ms = started.elapsed().as_millis() as u64,
            "Broadcast accepted"
        );
    }
}
