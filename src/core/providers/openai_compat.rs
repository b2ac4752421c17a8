//! OpenAI-compatible chat-completions adapter
//!
//! Both OAuth-brokered backends used here (DashScope for Qwen, the Gemini
//! OpenAI-compat surface) and plain OpenAI-style backends speak the same
//! `/chat/completions` wire shape, so one adapter covers all three kinds,
//! parameterized by [`ProviderKind`].

use super::error::AdapterError;
use super::{AdapterResponse, ProviderAdapter};
use crate::core::credentials::{Credential, ProviderKind};
use crate::core::models::{ChatRequest, Usage};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// Adapter for OpenAI-compatible chat-completion endpoints.
pub struct OpenAiCompatAdapter {
    kind: ProviderKind,
    http: reqwest::Client,
}

impl OpenAiCompatAdapter {
    /// Create an adapter for one provider kind.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            http: reqwest::Client::new(),
        }
    }

    fn build_body(&self, physical_model: &str, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": physical_model,
            "messages": request.messages,
        });
        let overrides = &request.overrides;
        if let Some(max_tokens) = overrides.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = overrides.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(top_p) = overrides.top_p {
            body["top_p"] = json!(top_p);
        }
        if let Some(stop) = &overrides.stop {
            body["stop"] = json!(stop);
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn invoke(
        &self,
        credential: &Credential,
        endpoint: &str,
        physical_model: &str,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<AdapterResponse, AdapterError> {
        // Qwen credentials carry a resource_url naming the API base the
        // token is valid for; it wins over the configured endpoint.
        let base = credential
            .resource_url
            .as_deref()
            .unwrap_or(endpoint)
            .trim_end_matches('/');
        let url = format!("{base}/chat/completions");

        debug!(provider = %self.kind, model = %physical_model, url = %url, "invoking provider");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.access_token)
            .json(&self.build_body(physical_model, request))
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AdapterError::Timeout(timeout)
                } else {
                    AdapterError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| AdapterError::Transport(err.to_string()))?;

        if !status.is_success() {
            return Err(AdapterError::from_status(status.as_u16(), body));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            AdapterError::Provider {
                status: status.as_u16(),
                message: format!("unparseable provider response: {err}"),
                retriable: true,
            }
        })?;

        let usage = parse_usage(&payload);
        Ok(AdapterResponse { payload, usage })
    }
}

/// Extract usage counts from an OpenAI-format response, if present.
fn parse_usage(payload: &Value) -> Option<Usage> {
    let usage = payload.get("usage")?;
    let prompt = usage.get("prompt_tokens")?.as_u64()?;
    let completion = usage.get("completion_tokens").and_then(Value::as_u64)?;
    Some(Usage::new(prompt, completion))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CallerIdentity, Message};
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest::new(
            "fast-model",
            vec![Message::user("ping")],
            CallerIdentity::new("sk-caller"),
        )
    }

    fn credential(token: &str) -> Credential {
        Credential::static_key(ProviderKind::OpenAi, token)
    }

    #[tokio::test]
    async fn successful_call_parses_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(bearer_token("tok-1"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "pong"}}],
                "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
            })))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::new(ProviderKind::OpenAi);
        let response = adapter
            .invoke(
                &credential("tok-1"),
                &format!("{}/v1", server.uri()),
                "gpt-4o-mini",
                &request(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let usage = response.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 7);
        assert_eq!(usage.total_tokens, 10);
    }

    #[tokio::test]
    async fn resource_url_overrides_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compat/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let mut cred = credential("tok-2");
        cred.resource_url = Some(format!("{}/compat", server.uri()));

        let adapter = OpenAiCompatAdapter::new(ProviderKind::QwenOauth);
        let response = adapter
            .invoke(
                &cred,
                "https://configured.invalid/v1",
                "qwen3-coder-plus",
                &request(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        // Usage absent is fine; the engine falls back to its estimate.
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn server_errors_are_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::new(ProviderKind::OpenAi);
        let err = adapter
            .invoke(
                &credential("tok"),
                &server.uri(),
                "gpt-4o-mini",
                &request(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn bad_request_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_string("messages: invalid role"),
            )
            .mount(&server)
            .await;

        let adapter = OpenAiCompatAdapter::new(ProviderKind::OpenAi);
        let err = adapter
            .invoke(
                &credential("tok"),
                &server.uri(),
                "gpt-4o-mini",
                &request(),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(!err.is_retriable());
        match err {
            AdapterError::Provider { status, message, .. } => {
                assert_eq!(status, 400);
                assert!(message.contains("invalid role"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
