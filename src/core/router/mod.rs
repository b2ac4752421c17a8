//! Candidate routing
//!
//! Given a logical model name the router produces an ordered candidate
//! list: available deployments grouped by priority tier (lower tier first),
//! ordered within a tier by weighted round-robin. Ordering is driven by a
//! rotating cursor per (model, tier) rather than randomization, so a
//! deployment with weight 3 leads the ordering exactly three times as often
//! as one with weight 1, in a fixed, testable pattern.

use crate::core::registry::{Deployment, DeploymentId, DeploymentRegistry};
use crate::utils::error::Result;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Router over a shared deployment registry.
pub struct Router {
    registry: Arc<DeploymentRegistry>,
    /// Rotating cursor per (logical model, tier)
    cursors: DashMap<(String, u32), AtomicU64>,
}

impl Router {
    /// Create a router over the given registry.
    pub fn new(registry: Arc<DeploymentRegistry>) -> Self {
        Self {
            registry,
            cursors: DashMap::new(),
        }
    }

    /// Produce the ordered candidate list for a logical model.
    ///
    /// Filters out unavailable deployments and everything in `exclude`,
    /// then orders tier by tier. An empty result means no deployment can
    /// serve the request right now; the dispatch engine maps that to
    /// `NoAvailableDeployment` without touching credentials or ledgers.
    pub fn route(
        &self,
        model_name: &str,
        exclude: &HashSet<DeploymentId>,
    ) -> Result<Vec<Arc<Deployment>>> {
        let deployments = self.registry.resolve(model_name)?;

        let mut tiers: BTreeMap<u32, Vec<&Arc<Deployment>>> = BTreeMap::new();
        for deployment in deployments {
            if exclude.contains(&deployment.id) || !deployment.is_available() {
                continue;
            }
            tiers
                .entry(deployment.config.priority_tier)
                .or_default()
                .push(deployment);
        }

        let mut ordered = Vec::new();
        for (tier, members) in tiers {
            self.order_tier(model_name, tier, &members, &mut ordered);
        }

        debug!(
            model = %model_name,
            candidates = ordered.len(),
            excluded = exclude.len(),
            "routed candidate list"
        );
        Ok(ordered)
    }

    /// Order one tier by weighted round-robin and append it to `out`.
    ///
    /// The tier's members are expanded by weight in registration order,
    /// the expansion is rotated by the tier cursor, and duplicates are
    /// dropped keeping first occurrence. Every member therefore appears
    /// exactly once per call, and the lead slot cycles through the
    /// expansion deterministically.
    fn order_tier(
        &self,
        model_name: &str,
        tier: u32,
        members: &[&Arc<Deployment>],
        out: &mut Vec<Arc<Deployment>>,
    ) {
        if members.is_empty() {
            return;
        }

        let mut expanded: Vec<&Arc<Deployment>> = Vec::new();
        for deployment in members {
            for _ in 0..deployment.config.weight.max(1) {
                expanded.push(deployment);
            }
        }

        let cursor = self
            .cursors
            .entry((model_name.to_string(), tier))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
        let start = (cursor % expanded.len() as u64) as usize;

        let mut seen: HashSet<&str> = HashSet::with_capacity(members.len());
        for offset in 0..expanded.len() {
            let deployment = expanded[(start + offset) % expanded.len()];
            if seen.insert(deployment.id.as_str()) {
                out.push(Arc::clone(deployment));
            }
        }
    }
}
