//! Pipeline error taxonomy
//!
//! Every failure a caller can see is one of a small set of kinds. Messages
//! that originate in the signing service are redacted before they get here.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rpc_manager::{BroadcastError, RpcManagerError};
use crate::signer::SigningError;
use crate::tx_builder::TransactionBuilderError;

/// Failure kinds reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    SigningError,
    SimulationError,
    BroadcastError,
    OnChainError,
    /// A ledger read needed before signing or broadcasting failed
    NetworkError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::SigningError => "SigningError",
            Self::SimulationError => "SimulationError",
            Self::BroadcastError => "BroadcastError",
            Self::OnChainError => "OnChainError",
            Self::NetworkError => "NetworkError",
        }
    }
}

/// Errors returned by the transaction executor
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error("Simulation predicted failure: {message}")]
    Simulation {
        message: String,
        /// Trailing program logs
        logs: Vec<String>,
    },

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error("Transaction {signature} failed on-chain: {error}")]
    OnChain {
        signature: String,
        error: serde_json::Value,
    },

    #[error("Ledger unavailable: {0}")]
    Network(#[from] RpcManagerError),
}

impl PipelineError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Signing(SigningError::InvalidPayload(_)) => {
                ErrorKind::ValidationError
            }
            Self::Signing(_) => ErrorKind::SigningError,
            Self::Simulation { .. } => ErrorKind::SimulationError,
            Self::Broadcast(_) => ErrorKind::BroadcastError,
            Self::OnChain { .. } => ErrorKind::OnChainError,
            Self::Network(_) => ErrorKind::NetworkError,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Signing(e) => e.category(),
            Self::Simulation { .. } => "simulation",
            Self::Broadcast(e) => e.category(),
            Self::OnChain { .. } => "on_chain",
            Self::Network(_) => "network",
        }
    }

    /// Whether submitting the same request again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Signing(e) => e.is_retryable(),
            Self::Broadcast(e) => e.is_retryable(),
            Self::Network(e) => e.is_retryable(),
            Self::Validation(_) | Self::Simulation { .. } | Self::OnChain { .. } => false,
        }
    }

    /// Caller-facing error body
    pub fn to_response(&self) -> ErrorResponse {
        let (logs, on_chain_error, signature) = match self {
            Self::Simulation { logs, .. } => (logs.clone(), None, None),
            Self::OnChain { signature, error } => {
                (Vec::new(), Some(error.clone()), Some(signature.clone()))
            }
            _ => (Vec::new(), None, None),
        };
        let message = match self {
            Self::Signing(e) => e.user_message(),
            other => other.to_string(),
        };
        ErrorResponse {
            kind: self.kind(),
            message,
            retryable: self.is_retryable(),
            signature,
            logs,
            on_chain_error,
        }
    }
}

impl From<TransactionBuilderError> for PipelineError {
    fn from(err: TransactionBuilderError) -> Self {
        match err {
            TransactionBuilderError::Signing(e) => Self::Signing(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

/// Serialized form of a [`PipelineError`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_chain_error: Option<serde_json::Value>,
}
