//! # llmgate-rs
//!
//! Dispatch engine for a multi-provider LLM gateway: deployment routing
//! with weighted tiers, health-based cooldown, budget and rate
//! enforcement with reserve/commit/rollback, and ordered fallback across
//! deployments.
//!
//! ## Features
//!
//! - **Borrowed credentials**: OAuth tokens read from CLI login caches
//!   (qwen-code, Gemini CLI) with single-flight refresh, plus static keys
//! - **Deterministic routing**: tiered weighted round-robin, reproducible
//!   per (model, tier) cursor
//! - **Health feedback**: consecutive-failure cooldown with geometric
//!   backoff, operational disable/enable
//! - **Budget enforcement**: caller- and deployment-scoped windows,
//!   reserved before the call, settled to measured usage after
//! - **Ordered fallback**: one pass over routed candidates plus a single
//!   re-route, fatal errors short-circuit
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llmgate_rs::{CallerIdentity, ChatRequest, Gateway, GatewayConfig, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_file("config/gateway.yaml").await?;
//!     let gateway = Gateway::from_config(&config)?;
//!
//!     let request = ChatRequest::new(
//!         "gpt-4",
//!         vec![Message::user("What is the capital of France?")],
//!         CallerIdentity::new("sk-team-a"),
//!     );
//!     let response = gateway.dispatch(&request).await?;
//!     println!("served by {}: {}", response.deployment_id, response.payload);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;

pub use audit::{AuditSink, ChannelAuditSink, TracingAuditSink};
pub use config::GatewayConfig;
pub use crate::core::dispatch::{DispatchOutcome, DispatchStatus};
pub use crate::core::models::{
    CallOverrides, CallerIdentity, ChatRequest, DispatchResponse, Message, Usage,
};
pub use crate::core::{Gateway, GatewayBuilder};
pub use utils::error::{GatewayError, Result};
pub use utils::logging::{init_tracing, init_tracing_json};
