//! Confirmation tracking
//!
//! Polls a ledger node until a signature reaches confirmed commitment, fails
//! on chain, or the validity window closes. The result is one of three
//! outcomes; running out of time is reported as `UnknownTimeout`, never as
//! a failure, because the transaction may still land.

use serde::{Deserialize, Serialize};
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::metrics::metrics;
use crate::rpc_manager::{LedgerClient, SignatureStatus};
use crate::types::ValidityWindow;

/// Final state of a tracked signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmationOutcome {
    Confirmed,
    FailedOnChain,
    UnknownTimeout,
}

impl ConfirmationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::FailedOnChain => "failed-on-chain",
            Self::UnknownTimeout => "unknown-timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmationResult {
    pub signature: Signature,
    pub outcome: ConfirmationOutcome,
    /// Raw on-chain error for `FailedOnChain`
    pub on_chain_error: Option<serde_json::Value>,
    pub slot: Option<u64>,
}

impl ConfirmationResult {
    pub fn is_confirmed(&self) -> bool {
        self.outcome == ConfirmationOutcome::Confirmed
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationSettings {
    pub poll_interval: Duration,
    /// Consecutive polls with RPC errors before giving up
    pub max_consecutive_rpc_failures: u32,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_consecutive_rpc_failures: 20,
        }
    }
}

enum Poll {
    Landed(ConfirmationResult),
    Pending,
    RpcFailed,
}

#[derive(Debug, Clone)]
pub struct ConfirmationTracker {
    ledger: Arc<dyn LedgerClient>,
    settings: ConfirmationSettings,
}

impl ConfirmationTracker {
    pub fn new(ledger: Arc<dyn LedgerClient>, settings: ConfirmationSettings) -> Self {
        Self { ledger, settings }
    }

    /// Wait for `signature` to land or for `window` to expire
    pub async fn confirm(&self, signature: &Signature, window: &ValidityWindow) -> ConfirmationResult {
        let started = Instant::now();
        let result = self.poll_until_done(signature, window).await;

        metrics()
            .confirmation_outcomes
            .with_label_values(&[result.outcome.as_str()])
            .inc();
        metrics()
            .confirmation_latency
            .observe(started.elapsed().as_secs_f64());
        info!(
            signature = %signature,
            outcome = result.outcome.as_str(),
            slot = ?result.slot,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Confirmation finished"
        );
        result
    }

    async fn poll_until_done(&self, signature: &Signature, window: &ValidityWindow) -> ConfirmationResult {
        let mut consecutive_failures = 0u32;

        loop {
            let mut tick_failed = false;

            match self.check(signature).await {
                Poll::Landed(result) => return result,
                Poll::Pending => {}
                Poll::RpcFailed => tick_failed = true,
            }

            match self.ledger.block_height().await {
                Ok(height) if height > window.last_valid_block_height => {
                    debug!(
                        signature = %signature,
                        height,
                        last_valid = window.last_valid_block_height,
                        "Validity window closed, final status check"
                    );
                    // It may have landed between the status check and now
                    if let Poll::Landed(result) = self.check(signature).await {
                        return result;
                    }
                    return Self::timed_out(signature);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Block height query failed");
                    tick_failed = true;
                }
            }

            if tick_failed {
                consecutive_failures += 1;
                if consecutive_failures >= self.settings.max_consecutive_rpc_failures {
                    warn!(
                        signature = %signature,
                        failures = consecutive_failures,
                        "Ledger unreachable, giving up on confirmation"
                    );
                    return Self::timed_out(signature);
                }
            } else {
                consecutive_failures = 0;
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn check(&self, signature: &Signature) -> Poll {
        match self.ledger.signature_status(signature).await {
            Ok(Some(SignatureStatus {
                slot,
                confirmed: true,
                err,
            })) => Poll::Landed(ConfirmationResult {
                signature: *signature,
                outcome: if err.is_some() {
                    ConfirmationOutcome::FailedOnChain
                } else {
                    ConfirmationOutcome::Confirmed
                },
                on_chain_error: err,
                slot: Some(slot),
            }),
            Ok(_) => Poll::Pending,
            Err(e) => {
                debug!(signature = %signature, error = %e, "Status query failed");
                Poll::RpcFailed
            }
        }
    }

    fn timed_out(signature: &Signature) -> ConfirmationResult {
        ConfirmationResult {
            signature: *signature,
            outcome: ConfirmationOutcome::UnknownTimeout,
            on_chain_error: None,
            slot: None,
        }
    }
}
