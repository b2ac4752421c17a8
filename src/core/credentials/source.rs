//! Credential sources
//!
//! A [`CredentialSource`] knows where credentials for one provider kind
//! live and how to refresh them. [`CliCacheSource`] reads the
//! `oauth_creds.json` cache written by third-party CLI login flows
//! (qwen-code, Gemini CLI) and performs the standard
//! `grant_type=refresh_token` exchange against the provider's token
//! endpoint. The store treats every source as opaque.

use super::types::{Credential, ProviderKind};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Expiry values above this are milliseconds; below, seconds.
/// (google-auth writes milliseconds, some caches write seconds.)
const EXPIRY_MS_THRESHOLD: f64 = 10_000_000_000.0;

/// Timeout for the refresh-token exchange itself.
const REFRESH_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Where credentials for one provider kind come from.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Load the cached credential, if one exists.
    ///
    /// Returns `Ok(None)` when no cache is present; IO noise while probing
    /// the cache is not an error for the caller to handle.
    async fn load_cached(&self) -> Result<Option<Credential>>;

    /// Exchange refresh material for a fresh credential.
    async fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

/// A static API key configured out-of-band. Never refreshes.
pub struct StaticKeySource {
    kind: ProviderKind,
    api_key: String,
}

impl StaticKeySource {
    /// Wrap a configured API key as a credential source.
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for StaticKeySource {
    async fn load_cached(&self) -> Result<Option<Credential>> {
        Ok(Some(Credential::static_key(self.kind, self.api_key.clone())))
    }

    async fn refresh(&self, _credential: &Credential) -> Result<Credential> {
        Err(GatewayError::CredentialRefreshFailed {
            provider: self.kind.to_string(),
            message: "static API keys cannot be refreshed".to_string(),
        })
    }
}

/// Credential source backed by a CLI-written OAuth cache file.
///
/// The cache format is the one both qwen-code and the Gemini CLI write:
///
/// ```json
/// {
///   "access_token": "...",
///   "refresh_token": "...",
///   "expiry_date": 1730000000000,
///   "resource_url": "https://dashscope.aliyuncs.com/compatible-mode/v1"
/// }
/// ```
pub struct CliCacheSource {
    kind: ProviderKind,
    token_path: PathBuf,
    token_endpoint: String,
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
}

impl CliCacheSource {
    /// Create a source reading `token_path` and refreshing against
    /// `token_endpoint`.
    pub fn new(
        kind: ProviderKind,
        token_path: impl Into<PathBuf>,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            kind,
            token_path: token_path.into(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret,
            http: reqwest::Client::new(),
        }
    }

    /// Path of the cache file this source reads.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    fn parse_cache(&self, raw: &Value) -> Option<Credential> {
        let access_token = raw.get("access_token")?.as_str()?.to_string();
        Some(Credential {
            kind: self.kind,
            access_token,
            expires_at: raw.get("expiry_date").and_then(parse_expiry),
            refresh_token: raw
                .get("refresh_token")
                .and_then(Value::as_str)
                .map(str::to_string),
            resource_url: raw
                .get("resource_url")
                .and_then(Value::as_str)
                .map(str::to_string),
            source_path: Some(self.token_path.clone()),
        })
    }

    async fn read_cache_file(&self) -> Option<Value> {
        match tokio::fs::read(&self.token_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(
                        provider = %self.kind,
                        path = %self.token_path.display(),
                        error = %err,
                        "credential cache is not valid JSON"
                    );
                    None
                }
            },
            Err(err) => {
                debug!(
                    provider = %self.kind,
                    path = %self.token_path.display(),
                    error = %err,
                    "unable to read credential cache"
                );
                None
            }
        }
    }

    /// Persist refreshed credentials with an atomic write so a concurrent
    /// reader (the CLI itself, or another gateway process) never observes
    /// a torn file.
    async fn persist(&self, merged: &Value) {
        let tmp_path = self.token_path.with_extension("json.tmp");
        let serialized = match serde_json::to_vec_pretty(merged) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(provider = %self.kind, error = %err, "failed to serialize refreshed credentials");
                return;
            }
        };

        if let Some(parent) = self.token_path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!(provider = %self.kind, error = %err, "failed to create credential cache directory");
                return;
            }
        }

        let result = async {
            tokio::fs::write(&tmp_path, &serialized).await?;
            tokio::fs::rename(&tmp_path, &self.token_path).await
        }
        .await;

        if let Err(err) = result {
            warn!(
                provider = %self.kind,
                path = %self.token_path.display(),
                error = %err,
                "failed to persist refreshed credentials"
            );
            let _ = tokio::fs::remove_file(&tmp_path).await;
        }
    }
}

#[async_trait]
impl CredentialSource for CliCacheSource {
    async fn load_cached(&self) -> Result<Option<Credential>> {
        let Some(raw) = self.read_cache_file().await else {
            return Ok(None);
        };
        Ok(self.parse_cache(&raw))
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            GatewayError::CredentialRefreshFailed {
                provider: self.kind.to_string(),
                message: "access token expired and no refresh token is available".to_string(),
            }
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.client_id.clone()),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&form)
            .timeout(REFRESH_HTTP_TIMEOUT)
            .send()
            .await
            .map_err(|err| GatewayError::CredentialRefreshFailed {
                provider: self.kind.to_string(),
                message: format!("token endpoint unreachable: {err}"),
            })?;

        let status = response.status();
        let payload: Value =
            response
                .json()
                .await
                .map_err(|err| GatewayError::CredentialRefreshFailed {
                    provider: self.kind.to_string(),
                    message: format!("token endpoint returned unparseable body: {err}"),
                })?;

        if !status.is_success() {
            return Err(GatewayError::CredentialRefreshFailed {
                provider: self.kind.to_string(),
                message: format!("token endpoint returned {status}: {payload}"),
            });
        }

        if payload.get("access_token").and_then(Value::as_str).is_none() {
            return Err(GatewayError::CredentialRefreshFailed {
                provider: self.kind.to_string(),
                message: "refresh response missing access_token".to_string(),
            });
        }

        // Merge over the cached JSON: keep the old refresh token when the
        // response omits one, and derive expiry_date from expires_in.
        let mut merged = self.read_cache_file().await.unwrap_or_else(|| json!({}));
        if let (Some(base), Some(update)) = (merged.as_object_mut(), payload.as_object()) {
            for (key, value) in update {
                base.insert(key.clone(), value.clone());
            }
            if !base.contains_key("refresh_token") {
                base.insert("refresh_token".to_string(), json!(refresh_token));
            }
            // expires_in is relative; overwrite any stale absolute expiry.
            if let Some(expires_in) = update.get("expires_in").and_then(Value::as_i64) {
                let expiry_ms = (Utc::now().timestamp() + expires_in) * 1000;
                base.insert("expiry_date".to_string(), json!(expiry_ms));
            }
        }

        self.persist(&merged).await;

        self.parse_cache(&merged)
            .ok_or_else(|| GatewayError::CredentialRefreshFailed {
                provider: self.kind.to_string(),
                message: "refreshed credentials are missing an access token".to_string(),
            })
    }
}

/// Normalize a cache `expiry_date` (seconds or milliseconds) to a UTC time.
fn parse_expiry(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_f64()?;
    let seconds = if raw > EXPIRY_MS_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    };
    Utc.timestamp_opt(seconds as i64, 0).single()
}
