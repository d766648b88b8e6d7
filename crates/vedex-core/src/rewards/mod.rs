//! Epoch virtual rewarder.
//!
//! Tracks per-position "virtual" balances deposited by a strategy, bucketed into epochs, and
//! computes each position's pro-rata share of the rewards notified for every fully elapsed epoch.

mod rewarder;
mod types;

pub use rewarder::{RewarderState, VirtualRewarder};
pub use types::{BalanceCheckpoint, RewarderEvent, TokenInfo};
