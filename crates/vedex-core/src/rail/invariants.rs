use serde::{Deserialize, Serialize};

use crate::auth::Authorizer;
use crate::escrow::{LockedBalance, Point, VotingEscrow};
use crate::rewards::VirtualRewarder;
use crate::token::{InMemoryToken, UnderlyingToken};
use crate::{Hash32, LedgerError};

use super::actions::{ActionOutcome, LedgerAction, Ledgers, TimedAction};

/// Stable identifiers for ledger invariants (used for testing and counterexamples).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvariantId {
    /// A ledger mutated state even though the action returned `Err`.
    NoMutationOnError,

    /// Sum of position voting power disagreed with the global total at the last observed time.
    VotingPowerConserved,

    /// `permanent_total_supply` disagreed with the permanent locks or the latest global point.
    PermanentSupplyMatches,

    /// A position's latest point was not the point derived from its current lock.
    PositionPointMatchesLock,

    /// A burned or attached position still carried a lock.
    InactiveLockEmpty,

    /// A managed aggregator was not a permanent lock.
    ManagedArePermanent,

    /// Escrow custody of the underlying token disagreed with `supply`.
    CustodyMatchesSupply,

    /// `supply` changed across a transition that only moves existing locks.
    SupplyUnchanged,

    /// Sum of rewarder balances disagreed with its total supply.
    RewardBalancesMatchSupply,

    /// A rewarder balance disagreed with its latest checkpoint.
    RewardCheckpointsMatchBalances,

    /// Harvested rewards exceeded notified rewards, or a harvest paid an unrecorded amount.
    RewardConserve,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for LedgerError {
    fn from(v: InvariantViolation) -> Self {
        LedgerError::InvariantViolated(v.to_string())
    }
}

/// A reproducible invariant failure with a minimal action trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantCounterexample {
    pub violation: InvariantViolation,
    /// Index of the first action that leads to a violated invariant.
    pub at_step: usize,
    /// State hash at the time of detection.
    pub state_hash: Hash32,
    /// The action prefix that reproduces the violation (includes the failing step).
    pub actions: Vec<TimedAction>,
}

impl InvariantCounterexample {
    pub fn short(&self) -> String {
        format!(
            "Invariant {:?} violated at step {} (state_hash={})",
            self.violation.id,
            self.at_step,
            hex::encode(self.state_hash.0)
        )
    }
}

type Check = std::result::Result<(), InvariantViolation>;

fn ensure(cond: bool, id: InvariantId, details: impl FnOnce() -> String) -> Check {
    if cond {
        Ok(())
    } else {
        Err(InvariantViolation::new(id, details()))
    }
}

/// Escrow state invariants, evaluated at the last observed block time.
pub fn check_escrow<A: Authorizer, T: UnderlyingToken>(ve: &VotingEscrow<A, T>) -> Check {
    let state = &ve.state;
    let max_lock = ve.config().max_lock_time_secs;

    let mut permanent = 0u128;
    for (id, pos) in &state.positions {
        if let Some(latest) = pos.history.latest() {
            let derived = Point::derive(&pos.locked, latest.ts, max_lock);
            ensure(derived == *latest, InvariantId::PositionPointMatchesLock, || {
                format!("position {id}: latest point {latest:?} != derived {derived:?}")
            })?;
        }
        if pos.owner.is_none() || pos.is_attached() {
            ensure(pos.locked == LockedBalance::EMPTY, InvariantId::InactiveLockEmpty, || {
                format!("position {id} is burned or attached but holds {:?}", pos.locked)
            })?;
        }
        if pos.is_managed {
            ensure(pos.locked.is_permanent(), InvariantId::ManagedArePermanent, || {
                format!("managed position {id} holds {:?}", pos.locked)
            })?;
        }
        if pos.owner.is_some() && pos.locked.is_permanent() {
            permanent += pos.locked.amount;
        }
    }
    ensure(
        permanent == state.permanent_total_supply,
        InvariantId::PermanentSupplyMatches,
        || {
            format!(
                "sum of permanent locks({permanent}) != permanent_total_supply({})",
                state.permanent_total_supply
            )
        },
    )?;
    if let Some(global) = state.point_history.latest() {
        ensure(
            global.permanent == state.permanent_total_supply,
            InvariantId::PermanentSupplyMatches,
            || {
                format!(
                    "global point permanent({}) != permanent_total_supply({})",
                    global.permanent, state.permanent_total_supply
                )
            },
        )?;
    }

    if let Some(block) = state.last_block {
        let t = block.timestamp;
        let sum: u128 = state
            .positions
            .keys()
            .map(|id| ve.balance_of_nft_at(*id, t))
            .sum();
        let total = ve.total_supply_at(t);
        ensure(sum == total, InvariantId::VotingPowerConserved, || {
            format!("sum of position power({sum}) != total_supply_at({t})({total})")
        })?;
    }
    Ok(())
}

/// The escrow's token custody must equal the locked supply.
pub fn check_custody<A: Authorizer>(ve: &VotingEscrow<A, InMemoryToken>) -> Check {
    let custody = ve.token().custody();
    ensure(custody == ve.supply(), InvariantId::CustodyMatchesSupply, || {
        format!("custody({custody}) != supply({})", ve.supply())
    })
}

pub fn check_rewarder<A: Authorizer>(rw: &VirtualRewarder<A>) -> Check {
    let state = &rw.state;

    let mut sum = 0u128;
    for (id, info) in &state.tokens {
        sum += info.balance;
        let latest = info.checkpoints.latest().map_or(0, |c| c.amount);
        ensure(
            latest == info.balance,
            InvariantId::RewardCheckpointsMatchBalances,
            || format!("token {id}: balance({}) != latest checkpoint({latest})", info.balance),
        )?;
    }
    ensure(
        sum == state.total_supply,
        InvariantId::RewardBalancesMatchSupply,
        || format!("sum of balances({sum}) != total_supply({})", state.total_supply),
    )?;
    let latest_total = state.total_supply_checkpoints.latest().map_or(0, |c| c.amount);
    ensure(
        latest_total == state.total_supply,
        InvariantId::RewardCheckpointsMatchBalances,
        || {
            format!(
                "total_supply({}) != latest total checkpoint({latest_total})",
                state.total_supply
            )
        },
    )?;

    let pooled: u128 = state.rewards_per_epoch.values().sum();
    ensure(pooled == state.total_notified, InvariantId::RewardConserve, || {
        format!(
            "sum of epoch pools({pooled}) != total_notified({})",
            state.total_notified
        )
    })?;
    ensure(
        state.total_harvested <= state.total_notified,
        InvariantId::RewardConserve,
        || {
            format!(
                "total_harvested({}) > total_notified({})",
                state.total_harvested, state.total_notified
            )
        },
    )
}

/// Aggregates captured before a transition, for transition-level checks.
#[derive(Clone, Copy, Debug)]
pub struct TransitionSnapshot {
    supply: u128,
    voting_power: u128,
    harvested: u128,
}

impl TransitionSnapshot {
    pub fn capture(ledgers: &Ledgers, timed: &TimedAction) -> Self {
        Self {
            supply: ledgers.escrow.supply(),
            voting_power: ledgers.escrow.total_supply_at(timed.ctx.now()),
            harvested: ledgers.rewarder.total_harvested(),
        }
    }
}

/// Checks that relate the state before and after one successful action.
pub fn check_transition(
    before: &TransitionSnapshot,
    ledgers: &Ledgers,
    timed: &TimedAction,
    outcome: &ActionOutcome,
) -> Check {
    let supply = ledgers.escrow.supply();
    match (&timed.action, outcome) {
        (
            LedgerAction::Merge { .. }
            | LedgerAction::LockPermanent { .. }
            | LedgerAction::UnlockPermanent { .. }
            | LedgerAction::TransferFrom { .. }
            | LedgerAction::DetachFromManaged { .. },
            _,
        ) => ensure(supply == before.supply, InvariantId::SupplyUnchanged, || {
            format!("supply changed from {} to {supply}", before.supply)
        }),
        (LedgerAction::AttachToManaged { .. }, ActionOutcome::Amount(weight)) => {
            ensure(supply == before.supply, InvariantId::SupplyUnchanged, || {
                format!("supply changed from {} to {supply}", before.supply)
            })?;
            let power = ledgers.escrow.total_supply_at(timed.ctx.now());
            ensure(
                power == before.voting_power,
                InvariantId::VotingPowerConserved,
                || {
                    format!(
                        "attach of weight {weight} changed total voting power {} -> {power}",
                        before.voting_power
                    )
                },
            )
        }
        (LedgerAction::Harvest { .. }, ActionOutcome::Amount(paid)) => {
            let harvested = ledgers.rewarder.total_harvested();
            ensure(
                harvested == before.harvested + paid,
                InvariantId::RewardConserve,
                || {
                    format!(
                        "harvest paid {paid} but total_harvested moved {} -> {harvested}",
                        before.harvested
                    )
                },
            )
        }
        _ => Ok(()),
    }
}
