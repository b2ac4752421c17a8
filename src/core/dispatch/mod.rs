//! Request dispatch: the attempt record types and the engine that walks
//! candidates through credential acquisition, budget reservation, and the
//! provider call.

mod attempt;
mod engine;

pub use attempt::{AttemptOutcome, CallAttempt, DispatchOutcome, DispatchStatus};
pub use engine::DispatchEngine;
