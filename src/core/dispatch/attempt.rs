//! Per-attempt and per-request outcome records
//!
//! A `CallAttempt` exists for the duration of dispatch only; the terminal
//! `DispatchOutcome` folds every attempt into one record that is emitted
//! to the audit sink exactly once.

use crate::core::credentials::ProviderKind;
use crate::core::models::ChatRequest;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of one try against one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The deployment served the request
    Success,
    /// Failed in a way the next candidate may fix
    RetriableFailure,
    /// Failed in a way no candidate can fix
    FatalFailure,
}

/// One try against one deployment.
#[derive(Debug, Clone, Serialize)]
pub struct CallAttempt {
    /// Deployment that was tried
    pub deployment_id: String,
    /// Provider kind of that deployment
    pub provider: ProviderKind,
    /// How the attempt ended
    pub outcome: AttemptOutcome,
    /// Attempt latency in microseconds
    pub latency_us: u64,
    /// Error detail for failures
    pub error: Option<String>,
    /// Expiry of the credential used, when one was acquired
    pub credential_expiry: Option<DateTime<Utc>>,
}

/// Terminal status of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// A deployment served the request
    Succeeded,
    /// Every candidate failed recoverably
    Exhausted,
    /// A fatal error short-circuited dispatch
    Fatal,
}

/// Final result of one logical request, shaped for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// Request id assigned at the edge
    pub request_id: Uuid,
    /// Logical model that was requested
    pub model: String,
    /// API key the request arrived under
    pub api_key: String,
    /// Every attempt, in order
    pub attempts: Vec<CallAttempt>,
    /// Deployment that won, if any
    pub winning_deployment: Option<String>,
    /// Terminal status
    pub status: DispatchStatus,
    /// End-to-end latency in microseconds, fallbacks included
    pub total_latency_us: u64,
    /// Terminal error detail for non-success outcomes
    pub error: Option<String>,
    /// When dispatch reached its terminal state
    pub completed_at: DateTime<Utc>,
}

impl DispatchOutcome {
    /// Start an outcome record for a request.
    pub fn start(request: &ChatRequest) -> Self {
        Self {
            request_id: request.request_id,
            model: request.model.clone(),
            api_key: request.caller.api_key.clone(),
            attempts: Vec::new(),
            winning_deployment: None,
            status: DispatchStatus::Fatal,
            total_latency_us: 0,
            error: None,
            completed_at: Utc::now(),
        }
    }
}
