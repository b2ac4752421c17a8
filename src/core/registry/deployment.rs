//! Deployment data structures
//!
//! A `Deployment` is one concrete (provider, physical model, endpoint)
//! combination backing a logical model name. Runtime health state lives in
//! atomics with `Relaxed` ordering: routing decisions tolerate slightly
//! stale state, and no cross-field invariant needs to hold atomically. A
//! deployment tried once more than ideal during a health transition is
//! acceptable.

use crate::core::credentials::ProviderKind;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Deployment identifier (unique within the registry)
pub type DeploymentId = String;

/// Health state of a deployment
///
/// Maps to `AtomicU8` values for lock-free updates:
/// - 0 = Healthy (serving traffic)
/// - 1 = CoolingDown (excluded until `cooldown_until` elapses)
/// - 2 = Disabled (administrative; only explicit re-enable clears it)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HealthState {
    Healthy = 0,
    CoolingDown = 1,
    Disabled = 2,
}

impl From<u8> for HealthState {
    fn from(value: u8) -> Self {
        match value {
            1 => HealthState::CoolingDown,
            2 => HealthState::Disabled,
            _ => HealthState::Healthy,
        }
    }
}

/// Static deployment parameters; never change after construction.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Weight for round-robin ordering within a tier (>= 1)
    pub weight: u32,
    /// Priority tier; lower tier number = higher preference
    pub priority_tier: u32,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Blended cost per 1000 tokens, in milli-cents (for spend reservations)
    pub cost_per_1k_tokens: u64,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            priority_tier: 0,
            timeout_secs: 60,
            cost_per_1k_tokens: 0,
        }
    }
}

/// Lock-free runtime state for one deployment.
#[derive(Debug)]
pub struct DeploymentState {
    /// Health state (see [`HealthState`])
    pub health: AtomicU8,
    /// Current consecutive-failure streak
    pub consecutive_failures: AtomicU32,
    /// Unix seconds of the last reported failure (for the sliding window)
    pub last_failure_at: AtomicU64,
    /// Unix seconds when the current cooldown expires
    pub cooldown_until: AtomicU64,
    /// How many times this deployment has entered cooldown since its last
    /// success; drives the geometric backoff
    pub cooldown_entries: AtomicU32,
    /// Lifetime totals
    pub total_requests: AtomicU64,
    /// Lifetime successes
    pub success_requests: AtomicU64,
    /// Lifetime failures
    pub fail_requests: AtomicU64,
}

impl DeploymentState {
    /// Fresh state, starting healthy.
    pub fn new() -> Self {
        Self {
            health: AtomicU8::new(HealthState::Healthy as u8),
            consecutive_failures: AtomicU32::new(0),
            last_failure_at: AtomicU64::new(0),
            cooldown_until: AtomicU64::new(0),
            cooldown_entries: AtomicU32::new(0),
            total_requests: AtomicU64::new(0),
            success_requests: AtomicU64::new(0),
            fail_requests: AtomicU64::new(0),
        }
    }

    /// Current health state.
    pub fn health_state(&self) -> HealthState {
        self.health.load(Ordering::Relaxed).into()
    }
}

impl Default for DeploymentState {
    fn default() -> Self {
        Self::new()
    }
}

/// One concrete backend deployment.
#[derive(Debug)]
pub struct Deployment {
    /// Unique deployment id
    pub id: DeploymentId,
    /// Caller-facing logical model name (model group)
    pub model_name: String,
    /// Provider kind, used for credential acquisition and adapter lookup
    pub provider: ProviderKind,
    /// Physical model identifier sent to the provider
    pub model: String,
    /// Endpoint base URL
    pub endpoint: String,
    /// Static configuration
    pub config: DeploymentConfig,
    /// Lock-free runtime state
    pub state: DeploymentState,
}

impl Deployment {
    /// Create a deployment with default configuration.
    pub fn new(
        id: impl Into<DeploymentId>,
        model_name: impl Into<String>,
        provider: ProviderKind,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model_name: model_name.into(),
            provider,
            model: model.into(),
            endpoint: endpoint.into(),
            config: DeploymentConfig::default(),
            state: DeploymentState::new(),
        }
    }

    /// Set configuration (builder pattern)
    pub fn with_config(mut self, config: DeploymentConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether the router may hand this deployment out right now.
    ///
    /// A cooled-down deployment whose cooldown has expired flips back to
    /// `Healthy` here, lazily, so no background task is needed. `Disabled`
    /// is never cleared by this path.
    pub fn is_available(&self) -> bool {
        match self.state.health_state() {
            HealthState::Healthy => true,
            HealthState::Disabled => false,
            HealthState::CoolingDown => {
                let now = unix_now();
                if self.state.cooldown_until.load(Ordering::Relaxed) <= now {
                    // Only flip if still CoolingDown; an admin disable that
                    // raced with us must win.
                    let _ = self.state.health.compare_exchange(
                        HealthState::CoolingDown as u8,
                        HealthState::Healthy as u8,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    );
                    self.state.health_state() == HealthState::Healthy
                } else {
                    false
                }
            }
        }
    }
}

/// Current Unix timestamp in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployment() -> Deployment {
        Deployment::new(
            "d1",
            "fast-model",
            ProviderKind::QwenOauth,
            "qwen3-coder-plus",
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
        )
    }

    #[test]
    fn new_deployment_is_available() {
        let d = deployment();
        assert!(d.is_available());
        assert_eq!(d.state.health_state(), HealthState::Healthy);
    }

    #[test]
    fn expired_cooldown_returns_to_healthy() {
        let d = deployment();
        d.state
            .health
            .store(HealthState::CoolingDown as u8, Ordering::Relaxed);
        d.state
            .cooldown_until
            .store(unix_now().saturating_sub(1), Ordering::Relaxed);

        assert!(d.is_available());
        assert_eq!(d.state.health_state(), HealthState::Healthy);
    }

    #[test]
    fn active_cooldown_is_unavailable() {
        let d = deployment();
        d.state
            .health
            .store(HealthState::CoolingDown as u8, Ordering::Relaxed);
        d.state
            .cooldown_until
            .store(unix_now() + 300, Ordering::Relaxed);

        assert!(!d.is_available());
    }

    #[test]
    fn disabled_never_self_heals() {
        let d = deployment();
        d.state
            .health
            .store(HealthState::Disabled as u8, Ordering::Relaxed);
        d.state.cooldown_until.store(0, Ordering::Relaxed);

        assert!(!d.is_available());
        assert_eq!(d.state.health_state(), HealthState::Disabled);
    }
}
