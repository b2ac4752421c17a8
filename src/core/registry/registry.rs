//! Deployment registry with health feedback
//!
//! Owns every configured deployment, grouped by logical model name, and
//! applies the cooldown policy when the dispatch engine reports provider
//! call outcomes. Health updates are eventually consistent; the registry
//! never blocks routing on them.

use super::deployment::{unix_now, Deployment, DeploymentId, HealthState};
use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// Cooldown policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Consecutive failures before entering cooldown
    pub failure_threshold: u32,
    /// Sliding window: a failure older than this breaks the streak (seconds)
    pub failure_window_secs: u64,
    /// First cooldown duration (seconds)
    pub base_cooldown_secs: u64,
    /// Cap for the geometric backoff (seconds)
    pub max_cooldown_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_secs: 60,
            base_cooldown_secs: 5,
            max_cooldown_secs: 300,
        }
    }
}

/// Registry of backend deployments, grouped by logical model name.
pub struct DeploymentRegistry {
    by_model: HashMap<String, Vec<Arc<Deployment>>>,
    by_id: HashMap<DeploymentId, Arc<Deployment>>,
    cooldown: CooldownConfig,
}

impl DeploymentRegistry {
    /// Build a registry from a list of deployments.
    ///
    /// Fails on duplicate deployment ids; preserves registration order
    /// within each logical model group.
    pub fn new(deployments: Vec<Deployment>, cooldown: CooldownConfig) -> Result<Self> {
        let mut by_model: HashMap<String, Vec<Arc<Deployment>>> = HashMap::new();
        let mut by_id: HashMap<DeploymentId, Arc<Deployment>> = HashMap::new();

        for deployment in deployments {
            let deployment = Arc::new(deployment);
            if by_id
                .insert(deployment.id.clone(), deployment.clone())
                .is_some()
            {
                return Err(GatewayError::Config(format!(
                    "duplicate deployment id: {}",
                    deployment.id
                )));
            }
            by_model
                .entry(deployment.model_name.clone())
                .or_default()
                .push(deployment);
        }

        Ok(Self {
            by_model,
            by_id,
            cooldown,
        })
    }

    /// All deployments registered under a logical model name, in
    /// registration order.
    pub fn resolve(&self, model_name: &str) -> Result<&[Arc<Deployment>]> {
        self.by_model
            .get(model_name)
            .map(Vec::as_slice)
            .ok_or_else(|| GatewayError::ModelNotFound(model_name.to_string()))
    }

    /// Look up a deployment by id.
    pub fn get(&self, id: &str) -> Option<&Arc<Deployment>> {
        self.by_id.get(id)
    }

    /// Logical model names with at least one deployment.
    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.by_model.keys().map(String::as_str)
    }

    /// Record the outcome of one provider call against a deployment.
    ///
    /// Only provider-call outcomes belong here; credential failures must
    /// not be reported (they say nothing about the deployment itself).
    pub fn report_outcome(&self, id: &str, success: bool) {
        let Some(deployment) = self.by_id.get(id) else {
            warn!(deployment_id = %id, "outcome reported for unknown deployment");
            return;
        };

        let state = &deployment.state;
        state.total_requests.fetch_add(1, Ordering::Relaxed);

        if success {
            state.success_requests.fetch_add(1, Ordering::Relaxed);
            state.consecutive_failures.store(0, Ordering::Relaxed);
            state.cooldown_entries.store(0, Ordering::Relaxed);
            return;
        }

        state.fail_requests.fetch_add(1, Ordering::Relaxed);

        // Disabled deployments keep their administrative state no matter
        // what outcomes trickle in.
        if state.health_state() == HealthState::Disabled {
            return;
        }

        let now = unix_now();
        let last_failure = state.last_failure_at.swap(now, Ordering::Relaxed);
        let within_window = now.saturating_sub(last_failure) <= self.cooldown.failure_window_secs;

        let streak = if within_window {
            state.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
        } else {
            state.consecutive_failures.store(1, Ordering::Relaxed);
            1
        };

        if streak >= self.cooldown.failure_threshold {
            self.enter_cooldown(deployment, now);
        }
    }

    fn enter_cooldown(&self, deployment: &Arc<Deployment>, now: u64) {
        let state = &deployment.state;
        let entries = state.cooldown_entries.fetch_add(1, Ordering::Relaxed);
        let backoff = self
            .cooldown
            .base_cooldown_secs
            .saturating_mul(1u64 << entries.min(16))
            .min(self.cooldown.max_cooldown_secs);

        state.cooldown_until.store(now + backoff, Ordering::Relaxed);
        state.consecutive_failures.store(0, Ordering::Relaxed);
        state
            .health
            .store(HealthState::CoolingDown as u8, Ordering::Relaxed);

        info!(
            deployment_id = %deployment.id,
            model = %deployment.model_name,
            cooldown_secs = backoff,
            "deployment entered cooldown"
        );
    }

    /// Administratively disable a deployment. Cooldown expiry will not
    /// bring it back; only [`DeploymentRegistry::enable`] does.
    pub fn disable(&self, id: &str) -> Result<()> {
        let deployment = self
            .by_id
            .get(id)
            .ok_or_else(|| GatewayError::DeploymentNotFound(id.to_string()))?;
        deployment
            .state
            .health
            .store(HealthState::Disabled as u8, Ordering::Relaxed);
        info!(deployment_id = %id, "deployment disabled");
        Ok(())
    }

    /// Re-enable a disabled deployment.
    pub fn enable(&self, id: &str) -> Result<()> {
        let deployment = self
            .by_id
            .get(id)
            .ok_or_else(|| GatewayError::DeploymentNotFound(id.to_string()))?;
        deployment
            .state
            .health
            .store(HealthState::Healthy as u8, Ordering::Relaxed);
        deployment
            .state
            .consecutive_failures
            .store(0, Ordering::Relaxed);
        deployment.state.cooldown_entries.store(0, Ordering::Relaxed);
        info!(deployment_id = %id, "deployment re-enabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::ProviderKind;
    use crate::core::registry::deployment::DeploymentConfig;

    fn registry_with(cooldown: CooldownConfig) -> DeploymentRegistry {
        let deployments = vec![
            Deployment::new(
                "d1",
                "fast-model",
                ProviderKind::QwenOauth,
                "qwen3-coder-plus",
                "https://example.invalid/v1",
            ),
            Deployment::new(
                "d2",
                "fast-model",
                ProviderKind::GeminiOauth,
                "gemini-2.0-flash",
                "https://example.invalid/v1",
            )
            .with_config(DeploymentConfig {
                priority_tier: 1,
                ..Default::default()
            }),
        ];
        DeploymentRegistry::new(deployments, cooldown).unwrap()
    }

    #[test]
    fn resolve_preserves_registration_order() {
        let registry = registry_with(CooldownConfig::default());
        let deployments = registry.resolve("fast-model").unwrap();
        assert_eq!(deployments.len(), 2);
        assert_eq!(deployments[0].id, "d1");
        assert_eq!(deployments[1].id, "d2");
    }

    #[test]
    fn unknown_model_is_an_error() {
        let registry = registry_with(CooldownConfig::default());
        assert!(matches!(
            registry.resolve("nope").unwrap_err(),
            GatewayError::ModelNotFound(_)
        ));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let deployments = vec![
            Deployment::new("dup", "m", ProviderKind::OpenAi, "a", "https://x.invalid"),
            Deployment::new("dup", "m", ProviderKind::OpenAi, "b", "https://x.invalid"),
        ];
        assert!(DeploymentRegistry::new(deployments, CooldownConfig::default()).is_err());
    }

    #[test]
    fn threshold_failures_trigger_cooldown() {
        let registry = registry_with(CooldownConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        registry.report_outcome("d1", false);
        registry.report_outcome("d1", false);
        assert!(registry.get("d1").unwrap().is_available());

        registry.report_outcome("d1", false);
        let d1 = registry.get("d1").unwrap();
        assert_eq!(d1.state.health_state(), HealthState::CoolingDown);
        assert!(!d1.is_available());
    }

    #[test]
    fn success_resets_failure_streak() {
        let registry = registry_with(CooldownConfig {
            failure_threshold: 3,
            ..Default::default()
        });

        registry.report_outcome("d1", false);
        registry.report_outcome("d1", false);
        registry.report_outcome("d1", true);
        registry.report_outcome("d1", false);
        registry.report_outcome("d1", false);

        assert!(registry.get("d1").unwrap().is_available());
    }

    #[test]
    fn cooldown_backoff_grows_geometrically_up_to_cap() {
        let cooldown = CooldownConfig {
            failure_threshold: 1,
            failure_window_secs: 600,
            base_cooldown_secs: 5,
            max_cooldown_secs: 12,
        };
        let registry = registry_with(cooldown);
        let d1 = registry.get("d1").unwrap().clone();

        registry.report_outcome("d1", false);
        let first = d1.state.cooldown_until.load(Ordering::Relaxed) - unix_now();
        assert!(first <= 5);

        // Force the cooldown to look expired, fail again: backoff doubles.
        d1.state.cooldown_until.store(0, Ordering::Relaxed);
        assert!(d1.is_available());
        registry.report_outcome("d1", false);
        let second = d1.state.cooldown_until.load(Ordering::Relaxed) - unix_now();
        assert!(second >= 9 && second <= 10, "expected ~10s, got {second}");

        // Next entry hits the cap.
        d1.state.cooldown_until.store(0, Ordering::Relaxed);
        assert!(d1.is_available());
        registry.report_outcome("d1", false);
        let third = d1.state.cooldown_until.load(Ordering::Relaxed) - unix_now();
        assert!(third <= 12, "cap exceeded: {third}");
    }

    #[test]
    fn disable_survives_outcomes_and_requires_enable() {
        let registry = registry_with(CooldownConfig::default());
        registry.disable("d2").unwrap();

        registry.report_outcome("d2", true);
        registry.report_outcome("d2", false);
        assert_eq!(
            registry.get("d2").unwrap().state.health_state(),
            HealthState::Disabled
        );

        registry.enable("d2").unwrap();
        assert!(registry.get("d2").unwrap().is_available());
    }
}
