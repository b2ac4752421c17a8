//! Shared utilities: error taxonomy, logging setup, token estimation

pub mod error;
pub mod logging;
pub mod tokens;

pub use error::{GatewayError, Result};
