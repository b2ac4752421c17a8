//! Gateway context object
//!
//! [`Gateway`] owns every shared component and is the single entry point
//! embedders use. Construction happens once from a validated
//! [`GatewayConfig`]; afterwards the object is cheap to share behind an
//! `Arc` and every method takes `&self`.

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::models::{gemini_defaults, qwen_defaults};
use crate::config::GatewayConfig;
use crate::core::credentials::{
    CliCacheSource, CredentialSource, CredentialStore, ProviderKind, StaticKeySource,
};
use crate::core::dispatch::DispatchEngine;
use crate::core::ledger::Ledger;
use crate::core::models::{ChatRequest, DispatchResponse};
use crate::core::providers::{AdapterRegistry, OpenAiCompatAdapter, ProviderAdapter};
use crate::core::registry::{Deployment, DeploymentConfig, DeploymentRegistry};
use crate::core::router::Router;
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// The assembled gateway.
pub struct Gateway {
    engine: DispatchEngine,
    registry: Arc<DeploymentRegistry>,
    ledger: Arc<Ledger>,
}

impl Gateway {
    /// Assemble a gateway from configuration with default collaborators.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        GatewayBuilder::new(config).build()
    }

    /// Start customizing construction (audit sink, extra adapters).
    pub fn builder(config: &GatewayConfig) -> GatewayBuilder<'_> {
        GatewayBuilder::new(config)
    }

    /// Dispatch one chat request through routing, budget enforcement, and
    /// ordered fallback.
    pub async fn dispatch(&self, request: &ChatRequest) -> Result<DispatchResponse> {
        self.engine.dispatch(request).await
    }

    /// Deployment registry, for operational disable/enable.
    pub fn registry(&self) -> &DeploymentRegistry {
        &self.registry
    }

    /// Budget and rate ledger, for usage inspection.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

/// Step-wise [`Gateway`] construction.
pub struct GatewayBuilder<'a> {
    config: &'a GatewayConfig,
    audit: Option<Arc<dyn AuditSink>>,
    extra_adapters: Vec<Arc<dyn ProviderAdapter>>,
    extra_sources: HashMap<ProviderKind, Arc<dyn CredentialSource>>,
}

impl<'a> GatewayBuilder<'a> {
    fn new(config: &'a GatewayConfig) -> Self {
        Self {
            config,
            audit: None,
            extra_adapters: Vec::new(),
            extra_sources: HashMap::new(),
        }
    }

    /// Replace the default tracing audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Register an adapter, overriding the built-in one for its kind.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.extra_adapters.push(adapter);
        self
    }

    /// Register a credential source, overriding the configured one.
    pub fn with_credential_source(
        mut self,
        kind: ProviderKind,
        source: Arc<dyn CredentialSource>,
    ) -> Self {
        self.extra_sources.insert(kind, source);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        self.config.validate()?;

        let deployments: Vec<Deployment> = self
            .config
            .deployments
            .iter()
            .map(|spec| {
                Deployment::new(
                    &spec.id,
                    &spec.model_name,
                    spec.provider,
                    &spec.model,
                    &spec.endpoint,
                )
                .with_config(DeploymentConfig {
                    weight: spec.weight,
                    priority_tier: spec.priority,
                    timeout_secs: spec.timeout_secs,
                    cost_per_1k_tokens: spec.cost_per_1k_tokens,
                })
            })
            .collect();

        let registry = Arc::new(DeploymentRegistry::new(
            deployments,
            self.config.cooldown.clone(),
        )?);
        let router = Arc::new(Router::new(registry.clone()));
        let ledger = Arc::new(Ledger::new(self.config.limits.clone()));

        let mut sources = self.configured_sources()?;
        for (kind, source) in self.extra_sources {
            sources.insert(kind, source);
        }
        let credentials = Arc::new(CredentialStore::new(sources));

        let mut adapters = AdapterRegistry::new();
        for kind in [
            ProviderKind::OpenAi,
            ProviderKind::QwenOauth,
            ProviderKind::GeminiOauth,
        ] {
            adapters.register(Arc::new(OpenAiCompatAdapter::new(kind)));
        }
        for adapter in self.extra_adapters {
            adapters.register(adapter);
        }

        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink));

        info!(
            deployments = self.config.deployments.len(),
            limits = self.config.limits.len(),
            "Gateway assembled"
        );

        let engine = DispatchEngine::new(
            router,
            registry.clone(),
            credentials,
            ledger.clone(),
            Arc::new(adapters),
            audit,
        );

        Ok(Gateway {
            engine,
            registry,
            ledger,
        })
    }

    /// Credential sources derived from config: static key for OpenAI-style
    /// providers, CLI OAuth caches for Qwen and Gemini.
    fn configured_sources(&self) -> Result<HashMap<ProviderKind, Arc<dyn CredentialSource>>> {
        let mut sources: HashMap<ProviderKind, Arc<dyn CredentialSource>> = HashMap::new();
        let credentials = &self.config.credentials;

        if let Ok(api_key) = std::env::var(&credentials.openai_api_key_env) {
            sources.insert(
                ProviderKind::OpenAi,
                Arc::new(StaticKeySource::new(ProviderKind::OpenAi, api_key)),
            );
        }

        let qwen = credentials.qwen.clone().unwrap_or_default();
        sources.insert(
            ProviderKind::QwenOauth,
            Arc::new(CliCacheSource::new(
                ProviderKind::QwenOauth,
                qwen.resolved_cache_path(qwen_defaults::CACHE_DIR, qwen_defaults::CACHE_FILE),
                qwen.token_endpoint
                    .as_deref()
                    .unwrap_or(qwen_defaults::TOKEN_ENDPOINT),
                qwen.client_id
                    .as_deref()
                    .unwrap_or(qwen_defaults::CLIENT_ID),
                qwen.client_secret.clone(),
            )),
        );

        let gemini = credentials.gemini.clone().unwrap_or_default();
        sources.insert(
            ProviderKind::GeminiOauth,
            Arc::new(CliCacheSource::new(
                ProviderKind::GeminiOauth,
                gemini
                    .resolved_cache_path(gemini_defaults::CACHE_DIR, gemini_defaults::CACHE_FILE),
                gemini
                    .token_endpoint
                    .as_deref()
                    .unwrap_or(gemini_defaults::TOKEN_ENDPOINT),
                gemini
                    .client_id
                    .as_deref()
                    .unwrap_or(gemini_defaults::CLIENT_ID),
                Some(
                    gemini
                        .client_secret
                        .clone()
                        .unwrap_or_else(|| gemini_defaults::CLIENT_SECRET.to_string()),
                ),
            )),
        );

        Ok(sources)
    }
}
