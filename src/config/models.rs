//! Configuration models
//!
//! Everything here is deserialized once at startup and treated as
//! read-only afterwards. Runtime state (health, cursors, windows) lives
//! in the core components, never in the config.

use crate::core::credentials::ProviderKind;
use crate::core::ledger::LimitRule;
use crate::core::registry::CooldownConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Physical deployments the gateway can dispatch to
    #[serde(default)]
    pub deployments: Vec<DeploymentSpec>,
    /// Budget and rate limit rules enforced by the ledger
    #[serde(default)]
    pub limits: Vec<LimitRule>,
    /// Cooldown policy applied by the deployment registry
    #[serde(default)]
    pub cooldown: CooldownConfig,
    /// Credential source settings per provider kind
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// One deployment entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSpec {
    /// Stable unique id, referenced by deployment-scoped limits
    pub id: String,
    /// Logical model name callers request
    pub model_name: String,
    /// Which adapter and credential source serve this deployment
    pub provider: ProviderKind,
    /// Physical model identifier sent to the provider
    pub model: String,
    /// Base URL of the provider endpoint
    pub endpoint: String,
    /// Round-robin weight within the tier
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Priority tier, lower is tried first
    #[serde(default)]
    pub priority: u32,
    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Spend accounting rate, budget units per 1k tokens
    #[serde(default)]
    pub cost_per_1k_tokens: u64,
}

fn default_weight() -> u32 {
    1
}

fn default_timeout_secs() -> u64 {
    60
}

/// Credential source settings.
///
/// OpenAI-style providers use a static key from the environment; the
/// OAuth providers read the token cache their CLI login flow maintains.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Environment variable holding the OpenAI API key
    #[serde(default = "default_openai_key_env")]
    pub openai_api_key_env: String,
    /// Qwen CLI OAuth cache settings
    #[serde(default)]
    pub qwen: Option<CredentialCacheConfig>,
    /// Gemini CLI OAuth cache settings
    #[serde(default)]
    pub gemini: Option<CredentialCacheConfig>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            openai_api_key_env: default_openai_key_env(),
            qwen: None,
            gemini: None,
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Where one CLI login cache lives and how to refresh it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialCacheConfig {
    /// Path to the `oauth_creds.json` the CLI maintains.
    /// Defaults to the CLI's own location under the home directory.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// OAuth token endpoint for refresh grants
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// OAuth client id registered for the CLI
    #[serde(default)]
    pub client_id: Option<String>,
    /// OAuth client secret, when the provider requires one
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Built-in defaults matching the Qwen CLI login flow.
pub mod qwen_defaults {
    pub const CACHE_DIR: &str = ".qwen";
    pub const CACHE_FILE: &str = "oauth_creds.json";
    pub const TOKEN_ENDPOINT: &str = "https://chat.qwen.ai/api/v1/oauth2/token";
    pub const CLIENT_ID: &str = "f0304373b74a44d2b584a3fb70ca9e56";
}

/// Built-in defaults matching the Gemini CLI login flow.
pub mod gemini_defaults {
    pub const CACHE_DIR: &str = ".gemini";
    pub const CACHE_FILE: &str = "oauth_creds.json";
    pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
    pub const CLIENT_ID: &str =
        "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
    pub const CLIENT_SECRET: &str = "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";
}

impl CredentialCacheConfig {
    /// Resolve the cache path, falling back to `~/{dir}/{file}`.
    pub fn resolved_cache_path(&self, default_dir: &str, default_file: &str) -> PathBuf {
        match &self.cache_path {
            Some(path) => path.clone(),
            None => {
                let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
                home.join(default_dir).join(default_file)
            }
        }
    }
}
