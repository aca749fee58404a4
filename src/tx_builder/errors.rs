//! Error types for transaction building and bundle assembly

use thiserror::Error;

use crate::signer::SigningError;
use crate::types::WireError;

/// Errors while building transactions or assembling bundles
#[derive(Error, Debug)]
pub enum TransactionBuilderError {
    /// Failed to build an instruction for a specific program
    #[error("Instruction build error (program={program}): {reason}")]
    InstructionBuild {
        /// The program the instruction targets
        program: String,
        reason: String,
    },

    /// The requested bundle cannot be assembled
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Tip estimation or tip transaction failure
    #[error("Tip error: {0}")]
    Tip(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] WireError),

    /// Signing of a locally built transaction failed
    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Configuration or validation error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransactionBuilderError {
    /// Check if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Tip(_) => true,
            Self::Signing(e) => e.is_retryable(),
            Self::InstructionBuild { .. } => false,
            Self::InvalidBundle(_) => false,
            Self::Encoding(_) => false,
            Self::Configuration(_) => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::InstructionBuild { .. } => "instruction",
            Self::InvalidBundle(_) => "bundle",
            Self::Tip(_) => "tip",
            Self::Encoding(_) => "encoding",
            Self::Signing(_) => "signing",
            Self::Configuration(_) => "config",
        }
    }
}

// Convenience constructors for common error scenarios
impl TransactionBuilderError {
    /// Create an instruction build error for a specific program
    pub fn instruction_failed(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstructionBuild {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_bundle(reason: impl Into<String>) -> Self {
        Self::InvalidBundle(reason.into())
    }

    pub fn tip_unavailable(reason: impl Into<String>) -> Self {
        Self::Tip(reason.into())
    }
}
