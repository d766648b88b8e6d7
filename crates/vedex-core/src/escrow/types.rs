use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointIndex, Keyed};
use crate::{AccountId, Timestamp, TokenId};

/// How a lock contributes voting power.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotingMode {
    /// Linear decay to zero at `end` (an epoch boundary).
    Decaying { end: Timestamp },
    /// Constant voting power equal to the locked amount; never expires.
    Permanent,
}

/// Lock state of a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedBalance {
    pub amount: u128,
    pub mode: VotingMode,
}

impl LockedBalance {
    /// Zeroed lock of a withdrawn, merged-away or attached position.
    pub const EMPTY: LockedBalance = LockedBalance {
        amount: 0,
        mode: VotingMode::Decaying { end: 0 },
    };

    pub fn decaying(amount: u128, end: Timestamp) -> Self {
        Self {
            amount,
            mode: VotingMode::Decaying { end },
        }
    }

    pub fn permanent(amount: u128) -> Self {
        Self {
            amount,
            mode: VotingMode::Permanent,
        }
    }

    /// Unlock time; `0` for permanent locks.
    pub fn end(&self) -> Timestamp {
        match self.mode {
            VotingMode::Decaying { end } => end,
            VotingMode::Permanent => 0,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(self.mode, VotingMode::Permanent)
    }

    /// A decaying lock is expired strictly after its end. Permanent locks never expire.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.mode {
            VotingMode::Decaying { end } => now > end,
            VotingMode::Permanent => false,
        }
    }
}

/// Voting power snapshot: `bias - slope * (t - ts)` (floored at 0) plus `permanent`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub bias: i128,
    pub slope: i128,
    pub ts: Timestamp,
    pub permanent: u128,
}

impl Keyed for Point {
    fn key(&self) -> u64 {
        self.ts
    }
}

impl Point {
    /// Derive a position's point from its lock at `now`.
    ///
    /// `slope = amount / max_lock_time` (floor), `bias = slope * (end - now)`. Expired or empty
    /// decaying locks derive the zero point; permanent locks carry their amount in `permanent`.
    pub fn derive(locked: &LockedBalance, now: Timestamp, max_lock_time: u64) -> Point {
        match locked.mode {
            VotingMode::Permanent => Point {
                bias: 0,
                slope: 0,
                ts: now,
                permanent: locked.amount,
            },
            VotingMode::Decaying { end } if end > now && locked.amount > 0 && max_lock_time > 0 => {
                // Amounts are capped by `LedgerConfig::max_total_supply` (<= 2^100), so the
                // conversions and the product below stay inside i128.
                let slope = (locked.amount / u128::from(max_lock_time)) as i128;
                Point {
                    bias: slope * i128::from(end - now),
                    slope,
                    ts: now,
                    permanent: 0,
                }
            }
            VotingMode::Decaying { .. } => Point {
                ts: now,
                ..Point::default()
            },
        }
    }

    /// Voting power at `t >= ts`.
    pub fn balance_at(&self, t: Timestamp) -> u128 {
        let dt = i128::from(t.saturating_sub(self.ts));
        let bias = self.bias.saturating_sub(self.slope.saturating_mul(dt)).max(0);
        (bias as u128).saturating_add(self.permanent)
    }
}

/// Full per-position record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionState {
    /// `None` once the position has been burned (withdrawn or merged away).
    pub owner: Option<AccountId>,
    pub approved: Option<AccountId>,
    pub locked: LockedBalance,
    pub is_voted: bool,
    /// Managed aggregator this position is delegated into.
    pub attached_to: Option<TokenId>,
    pub is_managed: bool,
    pub last_transfer_block: Option<u64>,
    /// Position point history; its length is the position's `point_epoch`.
    pub history: CheckpointIndex<Point>,
}

impl PositionState {
    pub(crate) fn new(owner: AccountId, is_managed: bool) -> Self {
        Self {
            owner: Some(owner),
            approved: None,
            locked: LockedBalance::EMPTY,
            is_voted: false,
            attached_to: None,
            is_managed,
            last_transfer_block: None,
            history: CheckpointIndex::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached_to.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepositKind {
    CreateLock,
    DepositFor,
    IncreaseUnlockTime,
    Merge,
}

/// Observable escrow events, recorded after each committed transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowEvent {
    Deposit {
        provider: AccountId,
        token: TokenId,
        kind: DepositKind,
        value: u128,
        locktime: Timestamp,
        ts: Timestamp,
    },
    Withdraw {
        provider: AccountId,
        token: TokenId,
        value: u128,
        ts: Timestamp,
    },
    Supply {
        prev_supply: u128,
        supply: u128,
    },
    Merge {
        sender: AccountId,
        from: TokenId,
        to: TokenId,
        amount_from: u128,
        amount_to: u128,
        amount_final: u128,
        locktime: Timestamp,
        ts: Timestamp,
    },
    LockPermanent {
        owner: AccountId,
        token: TokenId,
        amount: u128,
        ts: Timestamp,
    },
    UnlockPermanent {
        owner: AccountId,
        token: TokenId,
        amount: u128,
        ts: Timestamp,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        token: TokenId,
    },
    Approval {
        owner: AccountId,
        approved: Option<AccountId>,
        token: TokenId,
    },
    ApprovalForAll {
        owner: AccountId,
        operator: AccountId,
        approved: bool,
    },
    Voted {
        token: TokenId,
        voted: bool,
    },
    CreateManaged {
        recipient: AccountId,
        token: TokenId,
    },
    Attach {
        token: TokenId,
        managed: TokenId,
        weight: u128,
    },
    Detach {
        token: TokenId,
        managed: TokenId,
        amount: u128,
        locktime: Timestamp,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: u64 = 604_800;
    const MAX: u64 = 26 * WEEK;

    #[test]
    fn permanent_point_is_constant() {
        let p = Point::derive(&LockedBalance::permanent(5), 100, MAX);
        assert_eq!(p.balance_at(100), 5);
        assert_eq!(p.balance_at(100 + 10 * MAX), 5);
    }

    #[test]
    fn expired_lock_derives_zero_point() {
        let p = Point::derive(&LockedBalance::decaying(1_000_000_000, WEEK), WEEK, MAX);
        assert_eq!(p, Point { ts: WEEK, ..Point::default() });
    }

    #[test]
    fn decaying_point_hits_zero_at_end() {
        let amount = 10u128.pow(18);
        let lock = LockedBalance::decaying(amount, MAX);
        let p = Point::derive(&lock, 0, MAX);
        assert_eq!(p.slope, (amount / u128::from(MAX)) as i128);
        assert!(p.balance_at(0) > p.balance_at(1));
        assert_eq!(p.balance_at(MAX), 0);
        assert_eq!(p.balance_at(MAX + 1), 0);
    }

    #[test]
    fn expiry_is_strictly_after_end() {
        let lock = LockedBalance::decaying(1, 10);
        assert!(!lock.is_expired(10));
        assert!(lock.is_expired(11));
        assert!(!LockedBalance::permanent(1).is_expired(u64::MAX));
        assert_eq!(LockedBalance::permanent(1).end(), 0);
    }
}
