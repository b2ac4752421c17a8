//! Ledger key, limit-rule, and reservation types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// What a ledger counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerKind {
    /// Spend in milli-cents
    Spend,
    /// Request count
    Requests,
    /// Token count
    Tokens,
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LedgerKind::Spend => "spend",
            LedgerKind::Requests => "requests",
            LedgerKind::Tokens => "tokens",
        };
        f.write_str(name)
    }
}

/// The concrete scope a limit applies to.
///
/// Caller-scoped limits (`ApiKey`) are fatal to the whole request when
/// exceeded, since no deployment choice can dodge them; deployment-scoped
/// limits only disqualify that one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LimitScope {
    /// Scoped to the caller's API key
    ApiKey(String),
    /// Scoped to one deployment
    Deployment(String),
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitScope::ApiKey(key) => write!(f, "api-key {key}"),
            LimitScope::Deployment(id) => write!(f, "deployment {id}"),
        }
    }
}

/// Which class of scope a configured rule binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeClass {
    /// One window per caller API key
    PerApiKey,
    /// One window per deployment
    PerDeployment,
}

/// One configured limit: scope class, counted kind, limit per window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitRule {
    /// Scope class the rule fans out over
    pub scope: ScopeClass,
    /// What is being counted
    pub kind: LedgerKind,
    /// Maximum pending+committed amount per window
    pub limit: u64,
    /// Fixed window size in seconds
    pub window_secs: u64,
}

/// Identifies the ledger entry a reservation claims against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    /// Concrete scope instance
    pub scope: LimitScope,
    /// Counted kind
    pub kind: LedgerKind,
}

/// Lifecycle of a reservation. Exactly one transition out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    /// Claimed, not yet finalized
    Pending,
    /// Finalized at a measured amount
    Committed,
    /// Released; net-zero effect on the ledger
    RolledBack,
}

/// An in-flight claim against one ledger window.
///
/// Created by `reserve`, resolved exactly once by `commit` or `rollback`.
#[derive(Debug)]
pub struct Reservation {
    /// Unique reservation id
    pub id: Uuid,
    /// Ledger entry the claim is against
    pub key: LedgerKey,
    /// Start of the window the claim targets (unix seconds)
    pub window_start: u64,
    /// Window size the claim was made under (seconds)
    pub window_secs: u64,
    /// Reserved (estimated) amount
    pub amount: u64,
    /// Current lifecycle state
    pub state: ReservationState,
}
