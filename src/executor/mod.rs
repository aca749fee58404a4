//! Transaction executor
//!
//! Runs one request through the pipeline while holding the wallet's lock:
//!
//! 1. sign every transaction remotely (one owner auto-heal at most)
//! 2. simulate single transactions, refusing to send predicted failures
//! 3. assemble bundles, with a tip when the priority path is used
//! 4. broadcast, priority relays first, public RPC as the fallback
//! 5. optionally wait for confirmation until the validity window closes
//!
//! The lock is released on every exit path, including errors, panics and
//! cancellation of the calling task.

pub mod errors;

pub use errors::{ErrorKind, ErrorResponse, PipelineError};

use anyhow::Context;
use nonempty::NonEmpty;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::confirmation::{ConfirmationOutcome, ConfirmationSettings, ConfirmationTracker};
use crate::metrics::{metrics, Timer};
use crate::rpc_manager::{
    BroadcastPayload, BroadcastRouter, JitoRelay, LedgerClient, PriorityRelay, SolanaRpc,
};
use crate::signer::{HttpCustodian, RemoteSigningClient, SignedTransaction};
use crate::structured_logging::PipelineContext;
use crate::tx_builder::{build_transfer, token_account, BundleAssembler, HttpTipFloor, TipPolicy};
use crate::types::{
    ExecutionOutcome, TransactionRequest, TransferAsset, TransferRequest, ValidityWindow,
};
use crate::wallet_lock::WalletLockManager;

/// Program log lines kept in a simulation error
const SIMULATION_LOG_TAIL: usize = 5;

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub simulate_before_send: bool,
    pub fee_buffer_lamports: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            simulate_before_send: true,
            fee_buffer_lamports: 10_000,
        }
    }
}

/// The execution pipeline
pub struct TransactionExecutor {
    locks: WalletLockManager,
    signer: RemoteSigningClient,
    assembler: BundleAssembler,
    router: BroadcastRouter,
    tracker: ConfirmationTracker,
    ledger: Arc<dyn LedgerClient>,
    settings: ExecutorSettings,
}

impl TransactionExecutor {
    pub fn new(
        locks: WalletLockManager,
        signer: RemoteSigningClient,
        assembler: BundleAssembler,
        router: BroadcastRouter,
        tracker: ConfirmationTracker,
        ledger: Arc<dyn LedgerClient>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            locks,
            signer,
            assembler,
            router,
            tracker,
            ledger,
            settings,
        }
    }

    /// Wire up HTTP/RPC clients from configuration
    ///
    /// The first public endpoint also serves reads (balances, blockhashes,
    /// simulation and confirmation polling).
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let auth = config.signer.auth_context()?;
        let custodian = HttpCustodian::new(&config.signer.base_url, config.signer.timeout(), auth)?;
        let signer = RemoteSigningClient::new(Arc::new(custodian));

        let rpc_timeout = Duration::from_millis(config.rpc.timeout_ms);
        let commitment = CommitmentConfig::from_str(&config.rpc.commitment)
            .map_err(|_| anyhow::anyhow!("invalid rpc.commitment '{}'", config.rpc.commitment))?;
        let public: Vec<Arc<dyn LedgerClient>> = config
            .rpc
            .endpoints
            .iter()
            .map(|url| {
                Arc::new(SolanaRpc::with_commitment(url, rpc_timeout, commitment))
                    as Arc<dyn LedgerClient>
            })
            .collect();
        let public =
            NonEmpty::from_vec(public).context("at least one public RPC endpoint is required")?;
        let ledger = Arc::clone(public.first());

        let relay_timeout = Duration::from_millis(config.relay.timeout_ms);
        let mut relays: Vec<Arc<dyn PriorityRelay>> = Vec::new();
        if config.relay.enabled {
            let mut endpoints = config.relay.endpoints.clone();
            endpoints.sort_by_key(|e| e.priority);
            for endpoint in endpoints {
                relays.push(Arc::new(JitoRelay::new(endpoint, relay_timeout)?));
            }
        }

        let policy = TipPolicy {
            tip_accounts: TipPolicy::parse_accounts(&config.relay.tip_accounts)?,
            min_tip_lamports: config.relay.min_tip_lamports,
            max_tip_lamports: config.relay.max_tip_lamports,
            fallback_tip_lamports: config.relay.fallback_tip_lamports,
            max_bundle_size: config.relay.max_bundle_size,
        };
        let estimator = HttpTipFloor::new(&config.relay.tip_floor_url, relay_timeout)?;
        let assembler = BundleAssembler::new(signer.clone(), Arc::new(estimator), policy);

        let tracker = ConfirmationTracker::new(
            Arc::clone(&ledger),
            ConfirmationSettings {
                poll_interval: Duration::from_millis(config.confirmation.poll_interval_ms),
                max_consecutive_rpc_failures: config.confirmation.max_consecutive_rpc_failures,
            },
        );

        Ok(Self::new(
            WalletLockManager::new(),
            signer,
            assembler,
            BroadcastRouter::new(relays, public),
            tracker,
            ledger,
            ExecutorSettings {
                simulate_before_send: config.execution.simulate_before_send,
                fee_buffer_lamports: config.execution.fee_buffer_lamports,
            },
        ))
    }

    pub fn locks(&self) -> &WalletLockManager {
        &self.locks
    }

    /// Sign, broadcast and optionally confirm caller-built transactions
    pub async fn execute(&self, request: TransactionRequest) -> Result<ExecutionOutcome, PipelineError> {
        let ctx = PipelineContext::new("execute");
        let wallet = request.wallet().address;
        self.run(&ctx, &wallet, || self.process(&ctx, &request)).await
    }

    /// Build and execute a native or token transfer
    ///
    /// The balance check runs under the wallet lock, before anything is
    /// signed.
    pub async fn transfer(&self, request: TransferRequest) -> Result<ExecutionOutcome, PipelineError> {
        let ctx = PipelineContext::new("transfer");
        let wallet = request.wallet().address;
        self.run(&ctx, &wallet, || self.process_transfer(&ctx, &request))
            .await
    }

    async fn run<F, Fut>(&self, ctx: &PipelineContext, wallet: &Pubkey, f: F) -> Result<ExecutionOutcome, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExecutionOutcome, PipelineError>>,
    {
        let timer = Timer::new();
        metrics().pipeline_requests.inc();
        metrics().inflight_pipelines.inc();
        let _inflight = scopeguard::guard((), |_| metrics().inflight_pipelines.dec());

        let result = self.locks.with_lock(wallet, f).await;

        timer.observe_duration(&metrics().pipeline_latency);
        let elapsed_ms = (timer.elapsed_secs() * 1000.0) as u64;
        match &result {
            Ok(outcome) => debug!(
                correlation_id = %ctx.correlation_id(),
                method = %outcome.method,
                confirmed = ?outcome.confirmed,
                elapsed_ms,
                "Pipeline finished"
            ),
            Err(e) => {
                metrics()
                    .pipeline_failures
                    .with_label_values(&[e.kind().as_str()])
                    .inc();
                ctx.logger.log_failure(e.kind().as_str(), &e.to_string(), elapsed_ms);
            }
        }
        result
    }

    async fn process_transfer(
        &self,
        ctx: &PipelineContext,
        request: &TransferRequest,
    ) -> Result<ExecutionOutcome, PipelineError> {
        self.check_balance(request).await?;

        let window = self.ledger.latest_blockhash().await?;
        let unsigned = build_transfer(
            &request.wallet().address,
            request.recipient(),
            request.amount(),
            request.asset(),
            window.blockhash,
        )?;
        let tx_request = TransactionRequest::from_unsigned(request.wallet().clone(), vec![unsigned], false)
            .map_err(PipelineError::Validation)?
            .with_priority_path(request.use_priority_path())
            .with_confirmation(request.wait_for_confirmation())
            .with_validity(window);

        self.process(ctx, &tx_request).await
    }

    async fn check_balance(&self, request: &TransferRequest) -> Result<(), PipelineError> {
        let address = &request.wallet().address;
        let fee_buffer = self.settings.fee_buffer_lamports;
        let native = self.ledger.balance(address).await?;

        match request.asset() {
            TransferAsset::Native => {
                let needed = request
                    .amount()
                    .checked_add(fee_buffer)
                    .ok_or_else(|| PipelineError::validation("transfer amount is too large"))?;
                if native < needed {
                    return Err(PipelineError::validation(format!(
                        "Insufficient balance: wallet holds {} lamports, transfer needs {} ({} plus {} for fees)",
                        native, needed, request.amount(), fee_buffer
                    )));
                }
            }
            TransferAsset::Token { mint, .. } => {
                if native < fee_buffer {
                    return Err(PipelineError::validation(format!(
                        "Insufficient balance for fees: wallet holds {} lamports, needs {}",
                        native, fee_buffer
                    )));
                }
                let held = self.ledger.token_balance(&token_account(address, mint)).await?;
                if held < request.amount() {
                    return Err(PipelineError::validation(format!(
                        "Insufficient token balance: wallet holds {} of mint {}, transfer needs {}",
                        held, mint, request.amount()
                    )));
                }
            }
        }
        Ok(())
    }

    async fn process(
        &self,
        ctx: &PipelineContext,
        request: &TransactionRequest,
    ) -> Result<ExecutionOutcome, PipelineError> {
        let wallet = request.wallet();
        let use_priority = request.use_priority_path();
        let max_bundle_size = self.assembler.policy().max_bundle_size;
        if request.is_bundle() && request.transactions().len() > max_bundle_size {
            return Err(PipelineError::validation(format!(
                "{} transactions exceed the bundle limit of {}",
                request.transactions().len(),
                max_bundle_size
            )));
        }

        ctx.logger
            .log_pipeline_start(&wallet.address, request.transactions().len(), use_priority);

        let signed = self.signer.sign_all(wallet, request.transactions()).await?;
        for tx in &signed {
            ctx.logger.log_signed(&wallet.address, &tx.signature().to_string());
        }
        let tracked = *signed
            .last()
            .ok_or_else(|| PipelineError::validation("no transactions supplied"))?
            .signature();

        let mut simulated = false;
        let bundle = if request.is_bundle() {
            // Tips only pay for relay inclusion
            let use_tip = use_priority && self.router.relay_count() > 0;
            Some(
                self.assembler
                    .assemble(signed.clone(), use_tip, wallet, request.tip_lamports_hint())
                    .await?,
            )
        } else {
            if self.settings.simulate_before_send {
                simulated = self.preflight(&signed[0]).await?;
            }
            None
        };

        let window = if request.wait_for_confirmation() {
            self.validity_window(request).await
        } else {
            None
        };

        let broadcast_timer = Timer::new();
        let payload = match &bundle {
            Some(bundle) => BroadcastPayload::Bundle(bundle),
            None => BroadcastPayload::Single(&signed[0]),
        };
        let receipt = self
            .router
            .broadcast(payload, use_priority, simulated, ctx.trace.correlation_id())
            .await?;
        ctx.logger.log_broadcast(
            receipt.method.as_str(),
            receipt.bundle_id.as_deref().unwrap_or(&receipt.signature),
            (broadcast_timer.elapsed_secs() * 1000.0) as u64,
        );

        let confirmed = if request.wait_for_confirmation() {
            Some(self.await_confirmation(ctx, &tracked, window).await?)
        } else {
            None
        };

        Ok(ExecutionOutcome {
            signature: Some(receipt.signature),
            bundle_id: receipt.bundle_id,
            signatures: receipt.signatures,
            method: receipt.method,
            confirmed,
        })
    }

    /// Refuse to broadcast a transaction the ledger predicts will fail
    ///
    /// Returns whether the simulation ran and passed; when it could not run,
    /// public nodes preflight the transaction themselves.
    async fn preflight(&self, tx: &SignedTransaction) -> Result<bool, PipelineError> {
        match self.ledger.simulate(tx.transaction()).await {
            Ok(report) => match report.err {
                Some(err) => {
                    let skip = report.logs.len().saturating_sub(SIMULATION_LOG_TAIL);
                    Err(PipelineError::Simulation {
                        message: err.to_string(),
                        logs: report.logs.into_iter().skip(skip).collect(),
                    })
                }
                None => Ok(true),
            },
            Err(e) => {
                warn!(error = %e, "Simulation unavailable, leaving preflight to the node");
                Ok(false)
            }
        }
    }

    async fn validity_window(&self, request: &TransactionRequest) -> Option<ValidityWindow> {
        if let Some(window) = request.validity() {
            return Some(window);
        }
        match self.ledger.latest_blockhash().await {
            Ok(window) => Some(window),
            Err(e) => {
                warn!(error = %e, "Could not fetch a validity window, confirmation will be skipped");
                None
            }
        }
    }

    async fn await_confirmation(
        &self,
        ctx: &PipelineContext,
        signature: &Signature,
        window: Option<ValidityWindow>,
    ) -> Result<bool, PipelineError> {
        let Some(window) = window else {
            return Ok(false);
        };

        let timer = Timer::new();
        let result = self.tracker.confirm(signature, &window).await;
        ctx.logger.log_confirmation(
            &signature.to_string(),
            result.outcome.as_str(),
            (timer.elapsed_secs() * 1000.0) as u64,
        );

        match result.outcome {
            ConfirmationOutcome::Confirmed => Ok(true),
            ConfirmationOutcome::UnknownTimeout => Ok(false),
            ConfirmationOutcome::FailedOnChain => Err(PipelineError::OnChain {
                signature: signature.to_string(),
                error: result.on_chain_error.unwrap_or(serde_json::Value::Null),
            }),
        }
    }
}
