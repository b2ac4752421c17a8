//! Credential store and sources
//!
//! Backends here authenticate with OAuth tokens borrowed from third-party
//! CLI login flows rather than static API keys, so the store has to cope
//! with expiry, refresh, and concurrent acquisition without duplicating
//! refreshes.

pub mod source;
pub mod store;
pub mod types;

pub use source::{CliCacheSource, CredentialSource, StaticKeySource};
pub use store::{CredentialStore, DEFAULT_REFRESH_TIMEOUT, DEFAULT_SAFETY_MARGIN};
pub use types::{Credential, ProviderKind};
