use solana_client::client_error::{ClientError, ClientErrorKind};
use thiserror::Error;

/// Errors from ledger RPC endpoints and priority relays
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport { endpoint: String, message: String },

    /// Timeout errors
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded { endpoint: String },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound { endpoint: String },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired { endpoint: String },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound { account: String, endpoint: String },

    #[error("Insufficient funds (endpoint: {endpoint}): {message}")]
    InsufficientFunds { endpoint: String, message: String },

    /// Response arrived but could not be understood
    #[error("Malformed response from {endpoint}: {message}")]
    MalformedResponse { endpoint: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RpcManagerError {
    /// Check if this error is retryable on another endpoint
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,
            RpcManagerError::BlockhashNotFound { .. } => true,
            RpcManagerError::MalformedResponse { .. } => true,

            // Nodes disagree on these often enough that another endpoint
            // is worth a try
            RpcManagerError::RpcResponse { .. } => true,
            RpcManagerError::AccountNotFound { .. } => true,

            RpcManagerError::TransactionExpired { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::Configuration(_) => false,
        }
    }

    /// Errors that stop a broadcast instead of moving to the next endpoint
    pub fn is_terminal(&self) -> bool {
        matches!(self, RpcManagerError::InsufficientFunds { .. })
    }

    /// Create from ClientError with context
    pub fn from_client_error(err: ClientError, endpoint: &str, timeout_ms: u64) -> Self {
        let message = err.to_string();
        match err.kind() {
            ClientErrorKind::Reqwest(e) if e.is_timeout() => RpcManagerError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms,
            },
            ClientErrorKind::Reqwest(_) | ClientErrorKind::Io(_) => RpcManagerError::Transport {
                endpoint: endpoint.to_string(),
                message,
            },
            _ => Self::classify(&message, endpoint, None, timeout_ms),
        }
    }

    /// Classify an error message returned by a node or relay
    pub fn classify(message: &str, endpoint: &str, code: Option<i64>, timeout_ms: u64) -> Self {
        let lower = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if lower.contains("insufficient funds")
            || lower.contains("insufficient lamports")
            || lower.contains("insufficientfundsforfee")
            || lower.contains("no record of a prior credit")
        {
            RpcManagerError::InsufficientFunds {
                endpoint,
                message: message.to_string(),
            }
        } else if lower.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if lower.contains("transaction expired") || lower.contains("block height exceeded") {
            RpcManagerError::TransactionExpired { endpoint }
        } else if lower.contains("account not found") || lower.contains("could not find account") {
            RpcManagerError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint,
            }
        } else if lower.contains("rate limit")
            || lower.contains("too many requests")
            || code == Some(429)
        {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if lower.contains("timeout") || lower.contains("timed out") {
            RpcManagerError::Timeout {
                endpoint,
                timeout_ms,
            }
        } else {
            // Extract error code if available
            let code = code.or_else(|| {
                lower
                    .split("code:")
                    .nth(1)
                    .and_then(|s| s.split_whitespace().next())
                    .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok())
            });

            RpcManagerError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}
