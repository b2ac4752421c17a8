//! Deployment registry: static deployment list plus health feedback

pub mod deployment;
#[allow(clippy::module_inception)]
pub mod registry;

pub use deployment::{Deployment, DeploymentConfig, DeploymentId, DeploymentState, HealthState};
pub use registry::{CooldownConfig, DeploymentRegistry};
