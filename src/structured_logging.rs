//! Structured logging and pipeline context

use crate::observability::TraceContext;
use solana_sdk::pubkey::Pubkey;

/// Structured logger for pipeline events
///
/// Every event carries the request's correlation id so log lines from
/// concurrent requests can be separated.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    context_id: String,
}

impl StructuredLogger {
    pub fn new(context_id: String) -> Self {
        Self { context_id }
    }

    pub fn log_pipeline_start(&self, wallet: &Pubkey, tx_count: usize, use_priority: bool) {
        tracing::info!(
            context_id = %self.context_id,
            wallet = %wallet,
            tx_count = tx_count,
            use_priority = use_priority,
            "Pipeline started"
        );
    }

    pub fn log_signed(&self, wallet: &Pubkey, signature: &str) {
        tracing::debug!(
            context_id = %self.context_id,
            wallet = %wallet,
            signature = %signature,
            "Transaction signed"
        );
    }

    pub fn log_broadcast(&self, method: &str, id: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            method = %method,
            id = %id,
            latency_ms = latency_ms,
            "Broadcast accepted"
        );
    }

    pub fn log_confirmation(&self, signature: &str, outcome: &str, latency_ms: u64) {
        tracing::info!(
            context_id = %self.context_id,
            signature = %signature,
            outcome = %outcome,
            latency_ms = latency_ms,
            "Confirmation finished"
        );
    }

    pub fn log_failure(&self, kind: &str, message: &str, latency_ms: u64) {
        tracing::warn!(
            context_id = %self.context_id,
            kind = %kind,
            error = %message,
            latency_ms = latency_ms,
            "Pipeline failed"
        );
    }
}

/// Pipeline execution context for one request
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub trace: TraceContext,
    pub logger: StructuredLogger,
}

impl PipelineContext {
    /// Create a new pipeline context
    pub fn new(operation: &str) -> Self {
        Self::from_trace(TraceContext::new(operation))
    }

    pub fn from_trace(trace: TraceContext) -> Self {
        let logger = StructuredLogger::new(trace.correlation_id.to_string());
        Self { trace, logger }
    }

    pub fn correlation_id(&self) -> &str {
        self.trace.correlation_id.as_str()
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new("default")
    }
}
