//! Audit sink interface
//!
//! The dispatch engine hands every terminal [`DispatchOutcome`] to a sink
//! exactly once. Sinks are fire-and-forget: they must not block and must
//! not fail the request path. When a sink cannot deliver, it logs locally
//! and the request proceeds.

use crate::core::dispatch::DispatchOutcome;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Receiver of structured call-outcome events.
pub trait AuditSink: Send + Sync {
    /// Record one terminal outcome. Must never block or error.
    fn record(&self, outcome: &DispatchOutcome);
}

/// Sink that emits outcomes as structured tracing events.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, outcome: &DispatchOutcome) {
        info!(
            target: "llmgate_rs::audit",
            request_id = %outcome.request_id,
            model = %outcome.model,
            status = ?outcome.status,
            attempts = outcome.attempts.len(),
            winning_deployment = outcome.winning_deployment.as_deref().unwrap_or("-"),
            latency_us = outcome.total_latency_us,
            error = outcome.error.as_deref().unwrap_or(""),
            "dispatch complete"
        );
    }
}

/// Sink that forwards outcomes over an unbounded channel to an external
/// consumer (log shipper, spend writer).
pub struct ChannelAuditSink {
    tx: mpsc::UnboundedSender<DispatchOutcome>,
}

impl ChannelAuditSink {
    /// Create the sink and the receiving end for the consumer task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AuditSink for ChannelAuditSink {
    fn record(&self, outcome: &DispatchOutcome) {
        if self.tx.send(outcome.clone()).is_err() {
            // Consumer is gone. Log locally and keep serving.
            warn!(
                request_id = %outcome.request_id,
                status = ?outcome.status,
                "audit consumer unavailable, outcome logged locally only"
            );
        }
    }
}
