//! Configuration loading and validation

use super::models::GatewayConfig;
use crate::utils::error::{GatewayError, Result};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

impl GatewayConfig {
    /// Load and validate a YAML config file.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("Failed to read config file: {e}")))?;

        let mut config: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))?;

        config.apply_env_overrides();
        config.validate()?;

        debug!(
            deployments = config.deployments.len(),
            limits = config.limits.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Environment variables take precedence over the file.
    fn apply_env_overrides(&mut self) {
        if let Ok(threshold) = env::var("LLMGATE_FAILURE_THRESHOLD") {
            if let Ok(value) = threshold.parse() {
                self.cooldown.failure_threshold = value;
            }
        }
        if let Ok(base) = env::var("LLMGATE_BASE_COOLDOWN_SECS") {
            if let Ok(value) = base.parse() {
                self.cooldown.base_cooldown_secs = value;
            }
        }
        if let Ok(key_env) = env::var("LLMGATE_OPENAI_KEY_ENV") {
            self.credentials.openai_api_key_env = key_env;
        }
    }

    /// Reject configurations the core components would choke on.
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for spec in &self.deployments {
            if spec.id.is_empty() {
                return Err(GatewayError::Config(
                    "deployment id must not be empty".to_string(),
                ));
            }
            if !seen_ids.insert(spec.id.as_str()) {
                return Err(GatewayError::Config(format!(
                    "duplicate deployment id: {}",
                    spec.id
                )));
            }
            if spec.weight == 0 {
                return Err(GatewayError::Config(format!(
                    "deployment {} has zero weight",
                    spec.id
                )));
            }
            if spec.timeout_secs == 0 {
                return Err(GatewayError::Config(format!(
                    "deployment {} has zero timeout",
                    spec.id
                )));
            }
            validate_endpoint(&spec.endpoint, &spec.id)?;
        }

        for rule in &self.limits {
            if rule.limit == 0 {
                return Err(GatewayError::Config(format!(
                    "limit rule ({:?}, {}) has zero limit",
                    rule.scope, rule.kind
                )));
            }
            if rule.window_secs == 0 {
                return Err(GatewayError::Config(format!(
                    "limit rule ({:?}, {}) has zero window",
                    rule.scope, rule.kind
                )));
            }
        }

        if self.cooldown.failure_threshold == 0 {
            return Err(GatewayError::Config(
                "cooldown failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.cooldown.base_cooldown_secs > self.cooldown.max_cooldown_secs {
            return Err(GatewayError::Config(
                "cooldown base exceeds max".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_endpoint(endpoint: &str, deployment_id: &str) -> Result<()> {
    let url = Url::parse(endpoint).map_err(|e| {
        GatewayError::Config(format!(
            "deployment {deployment_id} has invalid endpoint URL: {e}"
        ))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(GatewayError::Config(format!(
            "deployment {deployment_id} endpoint must be http or https, got: {scheme}"
        ))),
    }
}
