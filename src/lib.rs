//! txpipe - transaction execution pipeline for custodial Solana wallets
//!
//! Signs caller-built transactions through a remote custodial signer,
//! serializes work per wallet, broadcasts through priority relays with a
//! public RPC fallback, and tracks confirmation against the validity window.

pub mod compat;
pub mod config;
pub mod confirmation;
pub mod endpoints;
pub mod executor;
pub mod metrics;
pub mod observability;
pub mod signer;
pub mod structured_logging;
pub mod tx_builder;
pub mod types;
pub mod wallet_lock;

// Component module with a non-standard path (directory with a space)
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub use config::Config;
pub use executor::{ErrorKind, ErrorResponse, ExecutorSettings, PipelineError, TransactionExecutor};
pub use types::{
    BroadcastMethod, ExecutionOutcome, TransactionRequest, TransferAsset, TransferRequest,
    ValidityWindow, WalletRef,
};

// Re-export commonly used types
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
