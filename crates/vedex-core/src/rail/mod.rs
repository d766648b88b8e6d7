//! Action rail: a serializable action space over both ledgers, invariant checks, and a trace
//! runner that finds and minimizes invariant counterexamples.

mod actions;
mod invariant_rail;
mod invariants;

pub use actions::{ActionOutcome, LedgerAction, Ledgers, TimedAction, Trace};
pub use invariant_rail::{first_invariant_counterexample, minimize_counterexample};
pub use invariants::{
    check_custody, check_escrow, check_rewarder, InvariantCounterexample, InvariantId,
    InvariantViolation,
};
