//! Normalized inbound request records
//!
//! The HTTP front door parses OpenAI-format JSON and hands the core these
//! already-normalized records. The core never sees raw wire bytes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single chat message in the normalized payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Message role ("system", "user", "assistant", "tool")
    pub role: String,
    /// Message content
    pub content: String,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Identity of the caller, as established by the excluded auth layer.
///
/// The dispatch core only uses it to scope caller-level ledger limits and
/// to stamp audit events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallerIdentity {
    /// API key the request arrived under
    pub api_key: String,
    /// Optional user id resolved from the key
    pub user_id: Option<String>,
}

impl CallerIdentity {
    /// Create a caller identity from an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            user_id: None,
        }
    }
}

/// Per-call overrides forwarded from the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallOverrides {
    /// Maximum completion tokens
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

/// A normalized chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Unique request id, assigned at the edge
    pub request_id: Uuid,
    /// Caller-facing logical model name (e.g. "fast-model")
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Who is calling
    pub caller: CallerIdentity,
    /// Per-call parameter overrides
    pub overrides: CallOverrides,
}

impl ChatRequest {
    /// Create a new request with a fresh request id.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        caller: CallerIdentity,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            model: model.into(),
            messages,
            caller,
            overrides: CallOverrides::default(),
        }
    }

    /// Set per-call overrides (builder pattern)
    pub fn with_overrides(mut self, overrides: CallOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}
