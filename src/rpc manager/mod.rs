//! RPC Manager Module
//!
//! Ledger node access, priority relay submission and broadcast routing

pub mod broadcast;
pub mod ledger;
pub mod relay;
pub mod rpc_errors;

// Re-exports for convenience
pub use broadcast::{AttemptOutcome, BroadcastError, BroadcastPayload, BroadcastReceipt, BroadcastRouter};
pub use ledger::{LedgerClient, SignatureStatus, SimulationReport, SolanaRpc};
pub use relay::{default_relay_endpoints, JitoRelay, PriorityRelay, RelayEndpoint};
pub use rpc_errors::RpcManagerError;
