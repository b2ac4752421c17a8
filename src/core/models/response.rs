//! Response records handed back to the front-door layer

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Token usage measured by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u64,
    /// Tokens produced in the completion
    pub completion_tokens: u64,
    /// Total tokens billed
    pub total_tokens: u64,
}

impl Usage {
    /// Build usage from prompt/completion counts.
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// The successful result of one dispatched request.
///
/// The front-door layer re-serializes `payload` into OpenAI-compatible JSON;
/// the core treats it as opaque.
#[derive(Debug, Clone)]
pub struct DispatchResponse {
    /// Provider response payload, untouched by the core
    pub payload: serde_json::Value,
    /// Measured usage, if the provider reported any
    pub usage: Option<Usage>,
    /// Deployment that served the request
    pub deployment_id: String,
    /// End-to-end dispatch latency, fallbacks included
    pub latency: Duration,
}
