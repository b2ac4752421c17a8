//! Provider adapter interface
//!
//! The dispatch engine depends only on [`ProviderAdapter`]; one
//! implementation exists per provider kind and is looked up in the
//! [`AdapterRegistry`] at dispatch time. Transport detail never leaks past
//! this boundary.

pub mod error;
pub mod openai_compat;

pub use error::AdapterError;
pub use openai_compat::OpenAiCompatAdapter;

use crate::core::credentials::{Credential, ProviderKind};
use crate::core::models::{ChatRequest, Usage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What an adapter hands back on success.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    /// Raw provider response payload (re-serialized by the front door)
    pub payload: serde_json::Value,
    /// Measured usage, when the provider reported any
    pub usage: Option<Usage>,
}

/// One provider-kind-specific backend caller.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider kind this adapter serves.
    fn kind(&self) -> ProviderKind;

    /// Perform one chat-completion call.
    ///
    /// `endpoint` is the deployment's configured base URL; adapters may
    /// prefer a credential-supplied override (Qwen's `resource_url`).
    async fn invoke(
        &self,
        credential: &Credential,
        endpoint: &str,
        physical_model: &str,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<AdapterResponse, AdapterError>;
}

/// Registry of adapters keyed by provider kind.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Look up the adapter for a provider kind.
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}
