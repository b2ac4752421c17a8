//! Configuration surface
//!
//! Loading, env overrides, and validation of the gateway's static
//! configuration. See [`GatewayConfig::from_file`].

pub mod loader;
pub mod models;

pub use models::{
    CredentialCacheConfig, CredentialsConfig, DeploymentSpec, GatewayConfig,
};
