//! Normalized data models shared across the dispatch core

pub mod request;
pub mod response;

pub use request::{CallOverrides, CallerIdentity, ChatRequest, Message};
pub use response::{DispatchResponse, Usage};
