//! Budget and rate ledgers with reserve/commit/rollback semantics

#[allow(clippy::module_inception)]
pub mod ledger;
pub mod types;

pub use ledger::Ledger;
pub use types::{
    LedgerKey, LedgerKind, LimitRule, LimitScope, Reservation, ReservationState, ScopeClass,
};
