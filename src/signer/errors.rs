//! Error types for remote signing
//!
//! Every message that reaches a `SigningError` has already passed through the
//! [`Redactor`](super::auth::Redactor), so errors can be logged and returned
//! to callers as-is.

use thiserror::Error;

/// Failure classes of the remote signing service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The wallet has no owner key authorized for server-side signing
    #[error("Wallet {wallet_id} has no owner authorized for server-side signing")]
    NoOwner { wallet_id: String },

    /// The authorization key was rejected; the wallet must be re-authorized
    #[error("Signing service rejected the authorization key: {message}")]
    InvalidKey { message: String },

    /// The application credentials were rejected
    #[error("Signing service rejected the application credentials (status {status})")]
    Unauthorized { status: u16 },

    /// The signing service does not know this wallet
    #[error("Wallet {wallet_id} is unknown to the signing service")]
    UnknownWallet { wallet_id: String },

    /// Any other explicit rejection
    #[error("Signing service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The reply did not contain a usable signed transaction
    #[error("Signing service returned a malformed response: {0}")]
    MalformedResponse(String),

    /// Network failure or timeout talking to the signing service
    #[error("Signing service unreachable: {0}")]
    Transport(String),

    /// The caller's payload is not a signable transaction; nothing was sent
    #[error("Invalid transaction payload: {0}")]
    InvalidPayload(String),

    /// Missing or invalid local signer configuration
    #[error("Signer configuration error: {0}")]
    Configuration(String),
}

impl SigningError {
    /// Transport failures may succeed if the whole request is retried later.
    ///
    /// The pipeline itself never retries a signing call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Whether the wallet owner has to reconnect/re-authorize the wallet
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Self::NoOwner { .. } | Self::InvalidKey { .. })
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoOwner { .. } => "no_owner",
            Self::InvalidKey { .. } => "invalid_key",
            Self::Unauthorized { .. } => "unauthorized",
            Self::UnknownWallet { .. } => "unknown_wallet",
            Self::Rejected { .. } => "rejected",
            Self::MalformedResponse(_) => "malformed",
            Self::Transport(_) => "transport",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Configuration(_) => "config",
        }
    }

    /// Message suitable for an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::NoOwner { .. } | Self::InvalidKey { .. } => {
                "Reconnect your wallet to re-authorize server-side signing.".to_string()
            }
            Self::UnknownWallet { .. } => "This wallet is not registered for signing.".to_string(),
            Self::Transport(_) => {
                "The signing service is temporarily unreachable. Try again shortly.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Map an explicit rejection from the signing service onto a failure class
pub fn classify_rejection(status: u16, message: &str, wallet_id: &str) -> SigningError {
    let lower = message.to_lowercase();

    if lower.contains("no owner")
        || lower.contains("does not have an owner")
        || lower.contains("owner not set")
        || lower.contains("missing owner")
    {
        return SigningError::NoOwner {
            wallet_id: wallet_id.to_string(),
        };
    }

    if lower.contains("invalid key")
        || lower.contains("invalid authorization")
        || lower.contains("invalid signature")
        || lower.contains("key quorum")
    {
        return SigningError::InvalidKey {
            message: message.to_string(),
        };
    }

    match status {
        401 | 403 => SigningError::Unauthorized { status },
        404 => SigningError::UnknownWallet {
            wallet_id: wallet_id.to_string(),
        },
        _ => SigningError::Rejected {
            status,
            message: message.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_owner_and_key_messages() {
        assert_eq!(
            classify_rejection(400, "Wallet does not have an owner", "w1"),
            SigningError::NoOwner {
                wallet_id: "w1".to_string()
            }
        );
        assert!(matches!(
            classify_rejection(401, "Invalid authorization signature", "w1"),
            SigningError::InvalidKey { .. }
        ));
    }

    #[test]
    fn test_classify_by_status() {
        assert_eq!(
            classify_rejection(403, "forbidden", "w1"),
            SigningError::Unauthorized { status: 403 }
        );
        assert!(matches!(
            classify_rejection(404, "not found", "w1"),
            SigningError::UnknownWallet { .. }
        ));
        assert!(matches!(
            classify_rejection(500, "internal", "w1"),
            SigningError::Rejected { status: 500, .. }
        ));
    }

    #[test]
    fn test_retryability_and_reauthorization() {
        assert!(SigningError::Transport("timeout".to_string()).is_retryable());
        assert!(!SigningError::InvalidKey {
            message: "x".to_string()
        }
        .is_retryable());
        assert!(SigningError::NoOwner {
            wallet_id: "w1".to_string()
        }
        .needs_reauthorization());
        assert!(SigningError::InvalidKey {
            message: "x".to_string()
        }
        .user_message()
        .contains("Reconnect your wallet"));
    }
}
