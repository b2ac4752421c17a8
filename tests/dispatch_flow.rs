//! End-to-end dispatch scenarios through the public [`Gateway`] API.
//!
//! Providers are replaced with scripted fake adapters and credential
//! sources so every scenario is deterministic.

use async_trait::async_trait;
use llmgate_rs::core::credentials::{Credential, CredentialSource, ProviderKind};
use llmgate_rs::core::providers::{AdapterError, AdapterResponse, ProviderAdapter};
use llmgate_rs::{
    CallerIdentity, ChatRequest, ChannelAuditSink, DispatchStatus, Gateway, GatewayConfig,
    GatewayError, Message, Usage,
};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Adapter whose responses are scripted per physical model.
struct ScriptedAdapter {
    kind: ProviderKind,
    scripts: Mutex<HashMap<String, Vec<Result<AdapterResponse, u16>>>>,
    invocations: AtomicU32,
}

impl ScriptedAdapter {
    fn new(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            scripts: Mutex::new(HashMap::new()),
            invocations: AtomicU32::new(0),
        })
    }

    fn on_success(&self, model: &str, usage: Option<Usage>) {
        self.scripts
            .lock()
            .entry(model.to_string())
            .or_default()
            .push(Ok(AdapterResponse {
                payload: json!({"choices": [{"message": {"role": "assistant", "content": "ok"}}]}),
                usage,
            }));
    }

    fn on_status(&self, model: &str, status: u16) {
        self.scripts
            .lock()
            .entry(model.to_string())
            .or_default()
            .push(Err(status));
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(
        &self,
        _credential: &Credential,
        _endpoint: &str,
        physical_model: &str,
        _request: &ChatRequest,
        _timeout: Duration,
    ) -> Result<AdapterResponse, AdapterError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut scripts = self.scripts.lock();
        let queue = scripts
            .get_mut(physical_model)
            .unwrap_or_else(|| panic!("no script for {physical_model}"));
        match queue.remove(0) {
            Ok(response) => Ok(response),
            Err(status) => Err(AdapterError::from_status(status, format!("scripted {status}"))),
        }
    }
}

/// Source handing out a fixed non-expiring token.
struct StaticSource(ProviderKind);

#[async_trait]
impl CredentialSource for StaticSource {
    async fn load_cached(&self) -> llmgate_rs::Result<Option<Credential>> {
        Ok(Some(Credential::static_key(self.0, "test-token")))
    }

    async fn refresh(&self, _credential: &Credential) -> llmgate_rs::Result<Credential> {
        Ok(Credential::static_key(self.0, "test-token"))
    }
}

/// Source that never has credentials.
struct EmptySource;

#[async_trait]
impl CredentialSource for EmptySource {
    async fn load_cached(&self) -> llmgate_rs::Result<Option<Credential>> {
        Ok(None)
    }

    async fn refresh(&self, _credential: &Credential) -> llmgate_rs::Result<Credential> {
        Err(GatewayError::CredentialRefreshFailed {
            provider: "test".to_string(),
            message: "no credentials".to_string(),
        })
    }
}

const CONFIG: &str = r#"
deployments:
  - id: primary-a
    model_name: chat
    provider: openai
    model: model-a
    endpoint: https://primary-a.invalid/v1
    weight: 3
  - id: primary-b
    model_name: chat
    provider: openai
    model: model-b
    endpoint: https://primary-b.invalid/v1
    weight: 1
  - id: backup
    model_name: chat
    provider: qwen-oauth
    model: model-backup
    endpoint: https://backup.invalid/v1
    priority: 1
limits:
  - scope: per-api-key
    kind: requests
    limit: 100
    window_secs: 60
"#;

struct TestBed {
    gateway: Gateway,
    openai: Arc<ScriptedAdapter>,
    qwen: Arc<ScriptedAdapter>,
    audit_rx: tokio::sync::mpsc::UnboundedReceiver<llmgate_rs::DispatchOutcome>,
}

fn testbed(config_yaml: &str, qwen_has_credentials: bool) -> TestBed {
    let config: GatewayConfig = serde_yaml::from_str(config_yaml).unwrap();
    let openai = ScriptedAdapter::new(ProviderKind::OpenAi);
    let qwen = ScriptedAdapter::new(ProviderKind::QwenOauth);
    let (audit, audit_rx) = ChannelAuditSink::new();

    let qwen_source: Arc<dyn CredentialSource> = if qwen_has_credentials {
        Arc::new(StaticSource(ProviderKind::QwenOauth))
    } else {
        Arc::new(EmptySource)
    };

    let gateway = Gateway::builder(&config)
        .with_adapter(openai.clone())
        .with_adapter(qwen.clone())
        .with_credential_source(
            ProviderKind::OpenAi,
            Arc::new(StaticSource(ProviderKind::OpenAi)),
        )
        .with_credential_source(ProviderKind::QwenOauth, qwen_source)
        .with_audit_sink(Arc::new(audit))
        .build()
        .unwrap();

    TestBed {
        gateway,
        openai,
        qwen,
        audit_rx,
    }
}

fn request() -> ChatRequest {
    ChatRequest::new(
        "chat",
        vec![Message::user("hello")],
        CallerIdentity::new("sk-test"),
    )
}

#[tokio::test]
async fn happy_path_single_attempt() {
    let mut bed = testbed(CONFIG, true);
    bed.openai.on_success("model-a", Some(Usage::new(10, 20)));

    let response = bed.gateway.dispatch(&request()).await.unwrap();
    assert_eq!(response.deployment_id, "primary-a");
    assert_eq!(response.usage.unwrap().total_tokens, 30);

    let outcome = bed.audit_rx.recv().await.unwrap();
    assert_eq!(outcome.status, DispatchStatus::Succeeded);
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.winning_deployment.as_deref(), Some("primary-a"));
}

#[tokio::test]
async fn weighted_rotation_is_deterministic() {
    let mut bed = testbed(CONFIG, true);
    // Weights {a: 3, b: 1} lead with a, a, a, b over four requests.
    for model in ["model-a", "model-a", "model-a", "model-b"] {
        bed.openai.on_success(model, Some(Usage::new(1, 1)));
    }

    let mut served = Vec::new();
    for _ in 0..4 {
        let response = bed.gateway.dispatch(&request()).await.unwrap();
        served.push(response.deployment_id);
    }
    assert_eq!(served, ["primary-a", "primary-a", "primary-a", "primary-b"]);
    // Drain audit to keep the channel from backing up warnings.
    while bed.audit_rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn retriable_error_falls_back_across_tiers() {
    let mut bed = testbed(CONFIG, true);
    bed.openai.on_status("model-a", 503);
    bed.openai.on_status("model-b", 503);
    bed.qwen.on_success("model-backup", Some(Usage::new(2, 2)));

    let response = bed.gateway.dispatch(&request()).await.unwrap();
    assert_eq!(response.deployment_id, "backup");

    let outcome = bed.audit_rx.recv().await.unwrap();
    assert_eq!(outcome.attempts.len(), 3);
    assert_eq!(outcome.attempts[0].deployment_id, "primary-a");
    assert_eq!(outcome.attempts[1].deployment_id, "primary-b");
    assert_eq!(outcome.attempts[2].deployment_id, "backup");
}

#[tokio::test]
async fn fatal_error_stops_fallback() {
    let mut bed = testbed(CONFIG, true);
    bed.openai.on_status("model-a", 422);

    let err = bed.gateway.dispatch(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Provider { retriable: false, .. }));

    let outcome = bed.audit_rx.recv().await.unwrap();
    assert_eq!(outcome.status, DispatchStatus::Fatal);
    assert_eq!(outcome.attempts.len(), 1);
    // The healthy backup deployment was never consulted.
    assert_eq!(bed.qwen.invocations.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_credentials_skip_deployment_without_health_damage() {
    let mut bed = testbed(CONFIG, false);
    bed.openai.on_status("model-a", 503);
    bed.openai.on_status("model-b", 503);
    // backup (qwen) has no credentials, so everything fails.

    let err = bed.gateway.dispatch(&request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::DeploymentsExhausted { .. }));

    let outcome = bed.audit_rx.recv().await.unwrap();
    assert_eq!(outcome.status, DispatchStatus::Exhausted);
    assert_eq!(outcome.attempts.len(), 3);
    // The credential failure never reached the adapter.
    assert_eq!(bed.qwen.invocations.load(Ordering::SeqCst), 0);
    // And never counted against the deployment's health.
    let backup = bed.gateway.registry().get("backup").unwrap();
    assert_eq!(backup.state.fail_requests.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn repeated_failures_trigger_cooldown() {
    let mut bed = testbed(CONFIG, true);
    // Three consecutive failures on primary-a push it into cooldown, so a
    // fourth request routes around it.
    for _ in 0..3 {
        bed.openai.on_status("model-a", 500);
    }
    for model in ["model-b", "model-b", "model-b"] {
        bed.openai.on_success(model, Some(Usage::new(1, 1)));
    }
    bed.openai.on_success("model-b", Some(Usage::new(1, 1)));

    for _ in 0..3 {
        let response = bed.gateway.dispatch(&request()).await.unwrap();
        // The weighted rotation would pick primary-a first each time; the
        // 5xx pushes the request over to a fallback that succeeds.
        assert_ne!(response.deployment_id, "primary-a");
    }

    let response = bed.gateway.dispatch(&request()).await.unwrap();
    assert_ne!(response.deployment_id, "primary-a");
    assert_eq!(bed.openai.invocations.load(Ordering::SeqCst), 7);
    while bed.audit_rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn caller_request_limit_is_fatal() {
    const LIMITED: &str = r#"
deployments:
  - id: only
    model_name: chat
    provider: openai
    model: model-a
    endpoint: https://only.invalid/v1
limits:
  - scope: per-api-key
    kind: requests
    limit: 2
    window_secs: 3600
"#;
    let mut bed = testbed(LIMITED, true);
    bed.openai.on_success("model-a", Some(Usage::new(1, 1)));
    bed.openai.on_success("model-a", Some(Usage::new(1, 1)));

    bed.gateway.dispatch(&request()).await.unwrap();
    bed.gateway.dispatch(&request()).await.unwrap();

    let err = bed.gateway.dispatch(&request()).await.unwrap_err();
    match err {
        GatewayError::LimitExceeded { usage, limit, .. } => {
            assert_eq!(limit, 2);
            assert_eq!(usage, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    // A different caller still gets through.
    bed.openai.on_success("model-a", Some(Usage::new(1, 1)));
    let other_caller = ChatRequest::new(
        "chat",
        vec![Message::user("hello")],
        CallerIdentity::new("sk-other"),
    );
    bed.gateway.dispatch(&other_caller).await.unwrap();
    while bed.audit_rx.try_recv().is_ok() {}
}

#[tokio::test]
async fn unknown_model_is_fatal() {
    let bed = testbed(CONFIG, true);
    let req = ChatRequest::new(
        "missing-model",
        vec![Message::user("hello")],
        CallerIdentity::new("sk-test"),
    );
    let err = bed.gateway.dispatch(&req).await.unwrap_err();
    assert!(matches!(err, GatewayError::ModelNotFound(_)));
}
