//! Bundle assembly
//!
//! A bundle is an ordered group of signed transactions that the block
//! engine lands atomically. When a tip is attached it is always the first
//! transaction, shares the first user transaction's blockhash and pays a
//! randomly picked tip account.

use solana_sdk::{
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
};
#[allow(deprecated)]
use solana_sdk::system_instruction;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::errors::TransactionBuilderError;
use super::tip::{TipEstimator, TipPolicy};
use crate::metrics::metrics;
use crate::signer::{RemoteSigningClient, SignedTransaction};
use crate::types::{UnsignedTransaction, WalletRef};

/// Where the tip amount came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipSource {
    /// Caller-supplied hint
    Hint,
    /// Live fee-percentile estimate
    Estimate,
    /// Estimate unavailable
    Fallback,
}

/// Signed tip transfer leading a bundle
#[derive(Debug, Clone)]
pub struct TipTransaction {
    pub transaction: SignedTransaction,
    pub lamports: u64,
    pub recipient: Pubkey,
    pub source: TipSource,
}

/// Ordered, signed bundle ready for submission
#[derive(Debug, Clone)]
pub struct Bundle {
    tip: Option<TipTransaction>,
    transactions: Vec<SignedTransaction>,
}

impl Bundle {
    pub fn tip(&self) -> Option<&TipTransaction> {
        self.tip.as_ref()
    }

    /// User transactions, without the tip
    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    /// Submission order: tip first, then user transactions
    pub fn ordered(&self) -> Vec<&SignedTransaction> {
        self.tip
            .iter()
            .map(|tip| &tip.transaction)
            .chain(self.transactions.iter())
            .collect()
    }

    /// Base64 payloads in submission order
    pub fn encoded(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .map(|tx| tx.encoded().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transactions.len() + usize::from(self.tip.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signature of the last user transaction
    pub fn last_signature(&self) -> String {
        self.transactions
            .last()
            .map(|tx| tx.signature().to_string())
            .unwrap_or_default()
    }

    pub fn user_signatures(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(|tx| tx.signature().to_string())
            .collect()
    }
}

/// Builds bundles and their tip transactions
#[derive(Clone)]
pub struct BundleAssembler {
    signer: RemoteSigningClient,
    estimator: Arc<dyn TipEstimator>,
    policy: TipPolicy,
}

impl BundleAssembler {
    pub fn new(signer: RemoteSigningClient, estimator: Arc<dyn TipEstimator>, policy: TipPolicy) -> Self {
        Self {
            signer,
            estimator,
            policy,
        }
    }

    pub fn policy(&self) -> &TipPolicy {
        &self.policy
    }

    /// Assemble `transactions` into a bundle, prepending a tip when asked
    ///
    /// A tip that cannot be built or signed is dropped with a warning; the
    /// bundle is still returned. `tip_hint` replaces the live estimate.
    pub async fn assemble(
        &self,
        transactions: Vec<SignedTransaction>,
        use_tip: bool,
        tip_payer: &WalletRef,
        tip_hint: Option<u64>,
    ) -> Result<Bundle, TransactionBuilderError> {
        if transactions.is_empty() {
            return Err(TransactionBuilderError::invalid_bundle("bundle has no transactions"));
        }
        if transactions.len() > self.policy.max_bundle_size {
            return Err(TransactionBuilderError::invalid_bundle(format!(
                "{} transactions exceed the bundle limit of {}",
                transactions.len(),
                self.policy.max_bundle_size
            )));
        }

        if !use_tip {
            return Ok(Bundle {
                tip: None,
                transactions,
            });
        }

        if transactions.len() == self.policy.max_bundle_size {
            warn!(
                size = transactions.len(),
                "Bundle is full, submitting without a tip"
            );
            metrics().tip_fallbacks.inc();
            return Ok(Bundle {
                tip: None,
                transactions,
            });
        }

        let tip = match self.build_tip(&transactions[0], tip_payer, tip_hint).await {
            Ok(tip) => {
                info!(
                    lamports = tip.lamports,
                    recipient = %tip.recipient,
                    source = ?tip.source,
                    "Tip transaction attached"
                );
                Some(tip)
            }
            Err(e) => {
                warn!(error = %e, "Tip transaction could not be built, submitting bundle without tip");
                metrics().tip_fallbacks.inc();
                None
            }
        };

        Ok(Bundle { tip, transactions })
    }

    /// Tip amount after clamping, and where it came from
    pub async fn resolve_tip(&self, tip_hint: Option<u64>) -> (u64, TipSource) {
        if let Some(hint) = tip_hint {
            return (self.policy.clamp(hint), TipSource::Hint);
        }
        match self.estimator.estimate_tip_lamports().await {
            Ok(estimate) => (self.policy.clamp(estimate), TipSource::Estimate),
            Err(e) => {
                warn!(
                    error = %e,
                    fallback = self.policy.fallback_tip_lamports,
                    "Tip estimate unavailable, using fallback tip"
                );
                metrics().tip_fallbacks.inc();
                (self.policy.clamp(self.policy.fallback_tip_lamports), TipSource::Fallback)
            }
        }
    }

    async fn build_tip(
        &self,
        first: &SignedTransaction,
        payer: &WalletRef,
        tip_hint: Option<u64>,
    ) -> Result<TipTransaction, TransactionBuilderError> {
        let recipient = self
            .policy
            .pick_tip_account()
            .ok_or_else(|| TransactionBuilderError::Configuration("no tip accounts configured".to_string()))?;
        let (lamports, source) = self.resolve_tip(tip_hint).await;

        let ix = system_instruction::transfer(&payer.address, &recipient, lamports);
        let message = Message::new_with_blockhash(&[ix], Some(&payer.address), &first.blockhash());
        let unsigned = UnsignedTransaction::from_message(VersionedMessage::Legacy(message))?;

        let transaction = self.signer.sign(payer, &unsigned).await?;
        debug!(signature = %transaction.signature(), "Tip transaction signed");

        Ok(TipTransaction {
            transaction,
            lamports,
            recipient,
            source,
        })
    }
}
