//! Core dispatch functionality
//!
//! Everything between an accepted request and a provider response lives
//! here: credential acquisition, deployment health, routing, budget
//! enforcement, and the dispatch state machine that ties them together.

pub mod credentials;
pub mod dispatch;
pub mod gateway;
pub mod ledger;
pub mod models;
pub mod providers;
pub mod registry;
pub mod router;

pub use gateway::{Gateway, GatewayBuilder};
