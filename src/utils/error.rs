//! Error types for the gateway dispatch core
//!
//! One taxonomy covers the whole dispatch path. Each variant is either
//! recoverable by falling back to another deployment or fatal to the
//! request; [`GatewayError::is_recoverable`] encodes that split so the
//! dispatch engine never pattern-matches error strings.

use crate::core::ledger::LimitScope;
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway dispatch core
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No cached credential exists and no login flow is configured
    #[error("Credential unavailable for provider {provider}: {message}")]
    CredentialUnavailable {
        /// Provider kind the credential was requested for
        provider: String,
        /// Human-readable detail (usually the cache path that was probed)
        message: String,
    },

    /// A refresh was attempted but the upstream refresh call errored
    #[error("Credential refresh failed for provider {provider}: {message}")]
    CredentialRefreshFailed {
        /// Provider kind whose refresh failed
        provider: String,
        /// Upstream error detail, preserved verbatim
        message: String,
    },

    /// A ledger reservation would exceed the configured limit
    #[error("Limit exceeded for {scope}: usage {usage} + requested amount would exceed limit {limit}")]
    LimitExceeded {
        /// Scope the exceeded limit is keyed on
        scope: LimitScope,
        /// Usage (pending + committed) in the current window
        usage: u64,
        /// Configured limit for the window
        limit: u64,
    },

    /// Router produced no candidates for the requested model
    #[error("No available deployment for model: {0}")]
    NoAvailableDeployment(String),

    /// The logical model is not registered at all
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Deployment not found by id
    #[error("Deployment not found: {0}")]
    DeploymentNotFound(String),

    /// Every candidate was tried and failed with recoverable errors
    #[error("All deployments exhausted for model {model} after {attempts} attempts")]
    DeploymentsExhausted {
        /// Logical model that was requested
        model: String,
        /// Total number of attempts across the candidate list
        attempts: u32,
    },

    /// Transport-level failure talking to a provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider call did not complete within its deadline
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    /// Provider rejected the request in a way no other deployment can fix
    #[error("Provider rejected request (status {status}): {message}")]
    InvalidRequest {
        /// HTTP-style status code from the provider
        status: u16,
        /// Provider error body
        message: String,
    },

    /// Provider-side error carrying an explicit retriable flag
    #[error("Provider error (status {status}): {message}")]
    Provider {
        /// HTTP-style status code
        status: u16,
        /// Provider error body
        message: String,
        /// Whether another deployment may succeed
        retriable: bool,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Invariant violations (double commit, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the dispatch engine may absorb this error and advance to the
    /// next candidate deployment.
    ///
    /// Caller-scoped limit errors are fatal: the same limit applies no
    /// matter which deployment is chosen, so fallback cannot help.
    pub fn is_recoverable(&self) -> bool {
        match self {
            GatewayError::CredentialUnavailable { .. }
            | GatewayError::CredentialRefreshFailed { .. }
            | GatewayError::Transport(_)
            | GatewayError::Timeout(_) => true,
            GatewayError::LimitExceeded { scope, .. } => {
                matches!(scope, LimitScope::Deployment(_))
            }
            GatewayError::Provider { retriable, .. } => *retriable,
            _ => false,
        }
    }
}
