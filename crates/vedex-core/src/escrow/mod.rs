//! Vote-escrow lock ledger.
//!
//! Voting power of a decaying lock is `slope * (end - t)` with `slope = amount / max_lock_time`;
//! permanent locks contribute their full amount at every `t`. Position histories and the global
//! history are [`CheckpointIndex`](crate::checkpoint::CheckpointIndex)es of [`Point`]s, and the
//! global point is kept equal to the sum of position points via scheduled slope changes at epoch
//! boundaries.

mod ledger;
mod managed;
mod types;


pub use ledger::{EscrowState, VotingEscrow};
pub use types::{DepositKind, EscrowEvent, LockedBalance, Point, PositionState, VotingMode};
