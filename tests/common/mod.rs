//! In-memory collaborators for pipeline integration tests
//!
//! Keys live in [`LocalCustodian`] the way they would in the custodial
//! service; ledgers and relays record every call so tests can assert on
//! ordering and on what was (or was not) sent.

#![allow(dead_code)]

use async_trait::async_trait;
use nonempty::NonEmpty;
use serde_json::json;
use solana_sdk::{
    hash::Hash,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
#[allow(deprecated)]
use solana_sdk::system_instruction;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use txpipe::compat;
use txpipe::confirmation::{ConfirmationSettings, ConfirmationTracker};
use txpipe::rpc_manager::{
    BroadcastRouter, LedgerClient, PriorityRelay, RpcManagerError, SignatureStatus,
    SimulationReport,
};
use txpipe::signer::{CustodialTransport, RemoteSigningClient, SigningError};
use txpipe::tx_builder::{BundleAssembler, TipEstimator, TipPolicy, TransactionBuilderError};
use txpipe::types::{encode_transaction, UnsignedTransaction, ValidityWindow, WalletRef};
use txpipe::wallet_lock::WalletLockManager;
use txpipe::{ExecutorSettings, TransactionExecutor};

pub const BLOCKHASH: Hash = Hash::new_from_array([7; 32]);

/// Shared, ordered record of interesting calls across all fakes
#[derive(Debug, Default, Clone)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, event: &str) -> Vec<usize> {
        self.events()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_str() == event)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Signing service that holds keypairs in memory
pub struct LocalCustodian {
    keys: HashMap<String, Keypair>,
    delay: Duration,
    events: EventLog,
    in_flight: Mutex<HashMap<String, usize>>,
    pub max_same_wallet_overlap: AtomicUsize,
    total_in_flight: AtomicUsize,
    pub max_total_in_flight: AtomicUsize,
    pub sign_calls: AtomicUsize,
    pub owner_assignments: AtomicUsize,
    missing_owner: Mutex<HashSet<String>>,
    pub unavailable: AtomicBool,
}

impl LocalCustodian {
    pub fn new(wallet_ids: &[&str], delay: Duration, events: EventLog) -> Self {
        Self {
            keys: wallet_ids
                .iter()
                .map(|id| (id.to_string(), Keypair::new()))
                .collect(),
            delay,
            events,
            in_flight: Mutex::new(HashMap::new()),
            max_same_wallet_overlap: AtomicUsize::new(0),
            total_in_flight: AtomicUsize::new(0),
            max_total_in_flight: AtomicUsize::new(0),
            sign_calls: AtomicUsize::new(0),
            owner_assignments: AtomicUsize::new(0),
            missing_owner: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn wallet(&self, id: &str) -> WalletRef {
        WalletRef::new(id, &self.keys[id].pubkey().to_string()).unwrap()
    }

    /// Make the next signing call for `id` fail with "no owner"
    pub fn drop_owner(&self, id: &str) {
        self.missing_owner.lock().unwrap().insert(id.to_string());
    }

    fn enter(&self, wallet_id: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(wallet_id.to_string()).or_insert(0);
        *count += 1;
        self.max_same_wallet_overlap.fetch_max(*count, Ordering::SeqCst);
        let total = self.total_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_total_in_flight.fetch_max(total, Ordering::SeqCst);
    }

    fn leave(&self, wallet_id: &str) {
        if let Some(count) = self.in_flight.lock().unwrap().get_mut(wallet_id) {
            *count -= 1;
        }
        self.total_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CustodialTransport for LocalCustodian {
    async fn sign_transaction(
        &self,
        wallet_id: &str,
        unsigned_tx_base64: &str,
    ) -> Result<serde_json::Value, SigningError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.events.push(format!("sign-start:{}", wallet_id));
        self.enter(wallet_id);
        tokio::time::sleep(self.delay).await;
        self.leave(wallet_id);
        self.events.push(format!("sign-end:{}", wallet_id));

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SigningError::Transport("connection refused".to_string()));
        }
        if self.missing_owner.lock().unwrap().contains(wallet_id) {
            return Err(SigningError::NoOwner {
                wallet_id: wallet_id.to_string(),
            });
        }
        let keypair = self
            .keys
            .get(wallet_id)
            .ok_or_else(|| SigningError::UnknownWallet {
                wallet_id: wallet_id.to_string(),
            })?;

        let unsigned = UnsignedTransaction::from_base64(unsigned_tx_base64).unwrap();
        let mut tx = unsigned.transaction().clone();
        let index = compat::signer_index(&tx.message, &keypair.pubkey()).unwrap();
        tx.signatures[index] = keypair.sign_message(&tx.message.serialize());
        Ok(json!({
            "data": {
                "signed_transaction": encode_transaction(&tx).unwrap(),
                "encoding": "base64"
            }
        }))
    }

    async fn assign_owner(&self, wallet_id: &str) -> Result<(), SigningError> {
        self.owner_assignments.fetch_add(1, Ordering::SeqCst);
        self.missing_owner.lock().unwrap().remove(wallet_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum SendBehavior {
    Accept,
    /// Accept this many transactions, then become unavailable
    AcceptFirst(usize),
    Unavailable,
    InsufficientFunds,
    /// Underfunded: rejected by node preflight, accepted when it is skipped
    RejectOnPreflight,
}

#[derive(Debug, Clone)]
pub enum Landing {
    Never,
    Confirmed,
    Failed(serde_json::Value),
}

/// Ledger node with scripted behavior
#[derive(Debug)]
pub struct FakeLedger {
    name: String,
    events: EventLog,
    send_behavior: Mutex<SendBehavior>,
    landing: Mutex<Landing>,
    simulation: Mutex<SimulationReport>,
    simulation_down: AtomicBool,
    blockhash_down: AtomicBool,
    pub balance: AtomicU64,
    pub token_balance: AtomicU64,
    height: AtomicU64,
    /// Blocks between the latest blockhash and its last valid height
    valid_for: AtomicU64,
    pub sent: Mutex<Vec<Signature>>,
    /// Preflight flag of every send call, in order
    pub preflight: Mutex<Vec<bool>>,
    pub send_calls: AtomicUsize,
    pub simulate_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl FakeLedger {
    pub fn new(name: &str, events: EventLog) -> Self {
        Self {
            name: name.to_string(),
            events,
            send_behavior: Mutex::new(SendBehavior::Accept),
            landing: Mutex::new(Landing::Confirmed),
            simulation: Mutex::new(SimulationReport::default()),
            simulation_down: AtomicBool::new(false),
            blockhash_down: AtomicBool::new(false),
            balance: AtomicU64::new(10_000_000_000),
            token_balance: AtomicU64::new(0),
            height: AtomicU64::new(1_000),
            valid_for: AtomicU64::new(150),
            sent: Mutex::new(Vec::new()),
            preflight: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            simulate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_send(&self, behavior: SendBehavior) {
        *self.send_behavior.lock().unwrap() = behavior;
    }

    pub fn set_landing(&self, landing: Landing) {
        *self.landing.lock().unwrap() = landing;
    }

    pub fn set_simulation(&self, report: SimulationReport) {
        *self.simulation.lock().unwrap() = report;
    }

    pub fn set_simulation_down(&self) {
        self.simulation_down.store(true, Ordering::SeqCst);
    }

    pub fn set_blockhash_down(&self) {
        self.blockhash_down.store(true, Ordering::SeqCst);
    }

    pub fn preflight_flags(&self) -> Vec<bool> {
        self.preflight.lock().unwrap().clone()
    }

    fn accept(&self, tx: &VersionedTransaction) -> Result<Signature, RpcManagerError> {
        self.sent.lock().unwrap().push(tx.signatures[0]);
        self.events.push(format!("send:{}", self.name));
        Ok(tx.signatures[0])
    }

    fn insufficient_funds(&self) -> RpcManagerError {
        RpcManagerError::InsufficientFunds {
            endpoint: self.name.clone(),
            message: "Attempt to debit an account but found no record of a prior credit."
                .to_string(),
        }
    }

    pub fn set_valid_for(&self, blocks: u64) {
        self.valid_for.store(blocks, Ordering::SeqCst);
    }

    fn unavailable(&self) -> RpcManagerError {
        RpcManagerError::Transport {
            endpoint: self.name.clone(),
            message: "connection refused".to_string(),
        }
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        preflight: bool,
    ) -> Result<Signature, RpcManagerError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.preflight.lock().unwrap().push(preflight);
        let behavior = self.send_behavior.lock().unwrap().clone();
        match behavior {
            SendBehavior::Accept => self.accept(tx),
            SendBehavior::AcceptFirst(limit) => {
                if self.sent.lock().unwrap().len() < limit {
                    self.accept(tx)
                } else {
                    Err(self.unavailable())
                }
            }
            SendBehavior::Unavailable => Err(self.unavailable()),
            SendBehavior::InsufficientFunds => Err(self.insufficient_funds()),
            SendBehavior::RejectOnPreflight if preflight => Err(self.insufficient_funds()),
            SendBehavior::RejectOnPreflight => self.accept(tx),
        }
    }

    async fn latest_blockhash(&self) -> Result<ValidityWindow, RpcManagerError> {
        if self.blockhash_down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(ValidityWindow {
            blockhash: BLOCKHASH,
            last_valid_block_height: self.height.load(Ordering::SeqCst)
                + self.valid_for.load(Ordering::SeqCst),
        })
    }

    async fn block_height(&self) -> Result<u64, RpcManagerError> {
        Ok(self.height.fetch_add(1, Ordering::SeqCst))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcManagerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let landing = self.landing.lock().unwrap().clone();
        match landing {
            Landing::Never => Ok(None),
            Landing::Confirmed => {
                self.events.push(format!("confirmed:{}", signature));
                Ok(Some(SignatureStatus {
                    slot: 42,
                    confirmed: true,
                    err: None,
                }))
            }
            Landing::Failed(err) => Ok(Some(SignatureStatus {
                slot: 42,
                confirmed: true,
                err: Some(err),
            })),
        }
    }

    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimulationReport, RpcManagerError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);
        if self.simulation_down.load(Ordering::SeqCst) {
            return Err(self.unavailable());
        }
        Ok(self.simulation.lock().unwrap().clone())
    }

    async fn balance(&self, _address: &Pubkey) -> Result<u64, RpcManagerError> {
        self.events.push("balance");
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn token_balance(&self, _token_account: &Pubkey) -> Result<u64, RpcManagerError> {
        Ok(self.token_balance.load(Ordering::SeqCst))
    }
}

/// Priority relay that accepts or rejects everything
#[derive(Debug)]
pub struct FakeRelay {
    name: String,
    failing: AtomicBool,
    pub bundles: Mutex<Vec<Vec<String>>>,
    pub transactions: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl FakeRelay {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            failing: AtomicBool::new(false),
            bundles: Mutex::new(Vec::new()),
            transactions: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RpcManagerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RpcManagerError::RpcResponse {
                endpoint: self.name.clone(),
                message: "HTTP 503 Service Unavailable".to_string(),
                code: Some(503),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PriorityRelay for FakeRelay {
    fn endpoint(&self) -> &str {
        &self.name
    }

    async fn send_transaction(&self, encoded_tx: &str) -> Result<String, RpcManagerError> {
        self.check()?;
        self.transactions.lock().unwrap().push(encoded_tx.to_string());
        let tx = UnsignedTransaction::from_base64(encoded_tx).unwrap();
        Ok(tx.transaction().signatures[0].to_string())
    }

    async fn send_bundle(&self, encoded_txs: &[String]) -> Result<String, RpcManagerError> {
        self.check()?;
        self.bundles.lock().unwrap().push(encoded_txs.to_vec());
        Ok(format!("bundle-{}", self.bundles.lock().unwrap().len()))
    }
}

/// Fee-estimate service returning a fixed value, or nothing
pub struct FakeTipEstimator(pub Option<u64>);

#[async_trait]
impl TipEstimator for FakeTipEstimator {
    async fn estimate_tip_lamports(&self) -> Result<u64, TransactionBuilderError> {
        self.0
            .ok_or_else(|| TransactionBuilderError::tip_unavailable("tip floor unreachable"))
    }
}

/// A fully wired executor plus handles on every fake
pub struct Harness {
    pub executor: Arc<TransactionExecutor>,
    pub custodian: Arc<LocalCustodian>,
    pub relays: Vec<Arc<FakeRelay>>,
    pub public: Vec<Arc<FakeLedger>>,
    pub events: EventLog,
}

pub struct HarnessBuilder {
    relays: usize,
    public: usize,
    tip_estimate: Option<u64>,
    sign_delay: Duration,
    settings: ExecutorSettings,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            relays: 0,
            public: 1,
            tip_estimate: Some(50_000),
            sign_delay: Duration::from_millis(10),
            settings: ExecutorSettings::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn relays(mut self, count: usize) -> Self {
        self.relays = count;
        self
    }

    pub fn public(mut self, count: usize) -> Self {
        self.public = count;
        self
    }

    pub fn tip_estimate(mut self, estimate: Option<u64>) -> Self {
        self.tip_estimate = estimate;
        self
    }

    pub fn sign_delay(mut self, delay: Duration) -> Self {
        self.sign_delay = delay;
        self
    }

    pub fn simulate(mut self, enabled: bool) -> Self {
        self.settings.simulate_before_send = enabled;
        self
    }

    pub fn build(self) -> Harness {
        let events = EventLog::default();
        let custodian = Arc::new(LocalCustodian::new(
            &["alice", "bob"],
            self.sign_delay,
            events.clone(),
        ));
        let signer = RemoteSigningClient::new(custodian.clone());

        let relays: Vec<Arc<FakeRelay>> = (0..self.relays)
            .map(|i| Arc::new(FakeRelay::new(&format!("relay-{}", i))))
            .collect();
        let public: Vec<Arc<FakeLedger>> = (0..self.public.max(1))
            .map(|i| Arc::new(FakeLedger::new(&format!("rpc-{}", i), events.clone())))
            .collect();

        let ledger: Arc<dyn LedgerClient> = public[0].clone();
        let router = BroadcastRouter::new(
            relays
                .iter()
                .map(|r| r.clone() as Arc<dyn PriorityRelay>)
                .collect(),
            NonEmpty::from_vec(
                public
                    .iter()
                    .map(|p| p.clone() as Arc<dyn LedgerClient>)
                    .collect(),
            )
            .unwrap(),
        );
        let assembler = BundleAssembler::new(
            signer.clone(),
            Arc::new(FakeTipEstimator(self.tip_estimate)),
            TipPolicy::default(),
        );
        let tracker = ConfirmationTracker::new(
            ledger.clone(),
            ConfirmationSettings {
                poll_interval: Duration::from_millis(100),
                max_consecutive_rpc_failures: 5,
            },
        );

        let executor = TransactionExecutor::new(
            WalletLockManager::new(),
            signer,
            assembler,
            router,
            tracker,
            ledger,
            self.settings,
        );

        Harness {
            executor: Arc::new(executor),
            custodian,
            relays,
            public,
            events,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub fn wallet(&self, id: &str) -> WalletRef {
        self.custodian.wallet(id)
    }

    pub fn ledger(&self) -> &FakeLedger {
        &self.public[0]
    }

    pub fn total_sends(&self) -> usize {
        self.public
            .iter()
            .map(|p| p.send_calls.load(Ordering::SeqCst))
            .sum::<usize>()
            + self
                .relays
                .iter()
                .map(|r| r.calls.load(Ordering::SeqCst))
                .sum::<usize>()
    }
}

/// Base64 unsigned payment from `payer`, built against [`BLOCKHASH`]
pub fn unsigned_payment(payer: &Pubkey, lamports: u64) -> String {
    let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), lamports);
    let message = Message::new_with_blockhash(&[ix], Some(payer), &BLOCKHASH);
    UnsignedTransaction::from_message(VersionedMessage::Legacy(message))
        .unwrap()
        .encoded()
        .to_string()
}

/// Decode a wire transaction seen by a relay
pub fn decode(encoded: &str) -> VersionedTransaction {
    UnsignedTransaction::from_base64(encoded)
        .unwrap()
        .transaction()
        .clone()
}
