use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{Authorizer, Ownership, Role};
use crate::checkpoint::CheckpointIndex;
use crate::config::LedgerConfig;
use crate::math::{add_ts, add_u128, round_to_epoch, sub_u128};
use crate::token::UnderlyingToken;
use crate::{AccountId, BlockInfo, Hash32, LedgerError, Result, Timestamp, TokenId, TxContext};

use super::types::{DepositKind, EscrowEvent, LockedBalance, Point, PositionState, VotingMode};

/// All mutable escrow state. Aggregates live here, never in statics.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowState {
    pub(crate) next_token_id: u64,
    pub(crate) positions: BTreeMap<TokenId, PositionState>,
    /// `(owner, operator)` pairs approved for all of `owner`'s positions.
    pub(crate) operators: BTreeSet<(AccountId, AccountId)>,
    /// Underlying tokens held by the escrow.
    pub(crate) supply: u128,
    pub(crate) permanent_total_supply: u128,
    pub(crate) point_history: CheckpointIndex<Point>,
    /// Scheduled global slope deltas, keyed by the epoch boundary where locks end.
    pub(crate) slope_changes: BTreeMap<Timestamp, i128>,
    pub(crate) last_block: Option<BlockInfo>,
}

impl Default for EscrowState {
    fn default() -> Self {
        Self {
            next_token_id: 1,
            positions: BTreeMap::new(),
            operators: BTreeSet::new(),
            supply: 0,
            permanent_total_supply: 0,
            point_history: CheckpointIndex::new(),
            slope_changes: BTreeMap::new(),
            last_block: None,
        }
    }
}

impl EscrowState {
    /// Replace a position's lock and record the position and global checkpoints at `now`.
    ///
    /// Infallible by construction: callers validate every precondition and bound (including
    /// `permanent_total_supply`, which must already hold its post-transition value) first.
    pub(crate) fn commit_lock(
        &mut self,
        id: TokenId,
        new_locked: LockedBalance,
        now: Timestamp,
        config: &LedgerConfig,
    ) {
        let Some(pos) = self.positions.get_mut(&id) else {
            debug_assert!(false, "commit_lock on unknown position {id}");
            return;
        };
        let old_locked = std::mem::replace(&mut pos.locked, new_locked);
        let u_old = Point::derive(&old_locked, now, config.max_lock_time_secs);
        let u_new = Point::derive(&new_locked, now, config.max_lock_time_secs);
        pos.history.write(u_new);

        self.write_global_point(
            &old_locked,
            &new_locked,
            &u_old,
            &u_new,
            now,
            config.epoch_length_secs,
        );
        debug!(
            token = id.0,
            bias = u_new.bias,
            slope = u_new.slope,
            permanent = u_new.permanent,
            ts = now,
            "checkpoint"
        );
    }

    fn write_global_point(
        &mut self,
        old_locked: &LockedBalance,
        new_locked: &LockedBalance,
        u_old: &Point,
        u_new: &Point,
        now: Timestamp,
        epoch: u64,
    ) {
        let old_end = old_locked.end();
        let new_end = new_locked.end();
        let slope_at = |t: Timestamp| self.slope_changes.get(&t).copied().unwrap_or(0);

        let mut old_dslope = if old_end != 0 { slope_at(old_end) } else { 0 };
        let mut new_dslope = if new_end == 0 {
            0
        } else if new_end == old_end {
            old_dslope
        } else {
            slope_at(new_end)
        };

        // Replay the global point week by week up to `now`, applying scheduled slope changes.
        let mut last = self.point_history.latest().copied().unwrap_or(Point {
            ts: now,
            ..Point::default()
        });
        let mut last_checkpoint = last.ts;
        let mut t_i = round_to_epoch(last_checkpoint, epoch);
        loop {
            t_i = t_i.saturating_add(epoch);
            let mut d_slope = 0;
            if t_i > now {
                t_i = now;
            } else {
                d_slope = self.slope_changes.get(&t_i).copied().unwrap_or(0);
            }
            last.bias -= last.slope.saturating_mul(i128::from(t_i - last_checkpoint));
            last.slope += d_slope;
            last.bias = last.bias.max(0);
            last.slope = last.slope.max(0);
            last_checkpoint = t_i;
            last.ts = t_i;
            if t_i == now {
                break;
            }
            self.point_history.write(last);
        }

        last.slope = (last.slope + u_new.slope - u_old.slope).max(0);
        last.bias = (last.bias + u_new.bias - u_old.bias).max(0);
        last.permanent = self.permanent_total_supply;
        self.point_history.write(last);

        if old_end > now {
            // Cancel the old lock's scheduled slope drop.
            old_dslope += u_old.slope;
            if new_end == old_end {
                old_dslope -= u_new.slope;
            }
            self.slope_changes.insert(old_end, old_dslope);
        }
        if new_end > now && new_end > old_end {
            new_dslope -= u_new.slope;
            self.slope_changes.insert(new_end, new_dslope);
        }
    }

    /// Global voting power at `t`, replaying slope changes from the latest point at or before `t`.
    pub(crate) fn supply_at(&self, t: Timestamp, epoch: u64) -> u128 {
        let Some(point) = self.point_history.lookup(t) else {
            return 0;
        };
        let mut last = *point;
        let mut t_i = round_to_epoch(last.ts, epoch);
        loop {
            t_i = t_i.saturating_add(epoch);
            let mut d_slope = 0;
            if t_i > t {
                t_i = t;
            } else {
                d_slope = self.slope_changes.get(&t_i).copied().unwrap_or(0);
            }
            last.bias = last
                .bias
                .saturating_sub(last.slope.saturating_mul(i128::from(t_i - last.ts)));
            if t_i == t {
                break;
            }
            last.slope += d_slope;
            last.ts = t_i;
        }
        (last.bias.max(0) as u128).saturating_add(last.permanent)
    }

    pub(crate) fn live(&self, id: TokenId) -> Result<&PositionState> {
        self.positions
            .get(&id)
            .filter(|p| p.owner.is_some())
            .ok_or(LedgerError::NonexistentToken(id))
    }
}

/// Vote-escrow lock registry.
///
/// Each position locks `amount` of the underlying token either until an epoch-aligned `end`
/// (voting power decays linearly to zero) or permanently (constant voting power). Every mutator
/// takes a [`TxContext`], checks the monotone clock, computes all fallible values, moves tokens
/// through the [`UnderlyingToken`] collaborator, and only then commits.
pub struct VotingEscrow<A, T> {
    pub(crate) config: LedgerConfig,
    auth: A,
    token: T,
    pub(crate) state: EscrowState,
    events: Vec<EscrowEvent>,
}

impl<A: Authorizer, T: UnderlyingToken> VotingEscrow<A, T> {
    pub fn new(config: LedgerConfig, auth: A, token: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            auth,
            token,
            state: EscrowState::default(),
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn authorizer(&self) -> &A {
        &self.auth
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Direct access to the custody collaborator (boundary IO such as funding accounts).
    pub fn token_mut(&mut self) -> &mut T {
        &mut self.token
    }

    pub fn state(&self) -> &EscrowState {
        &self.state
    }

    // -------------------------------------------------------------------------
    // Lock lifecycle
    // -------------------------------------------------------------------------

    /// Lock `amount` for `lock_duration` seconds, minting a new position to `recipient`.
    ///
    /// Preconditions:
    /// - `amount > 0`
    /// - `now < round_to_epoch(now + lock_duration) <= now + max_lock_time`
    /// - the caller holds `amount` of the underlying token
    pub fn create_lock(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        lock_duration: u64,
        recipient: AccountId,
    ) -> Result<TokenId> {
        self.check_clock(ctx)?;
        if amount == 0 {
            return Err(LedgerError::ValueZero);
        }
        let unlock_time = self.unlock_time(ctx.now(), lock_duration)?;
        self.mint_lock(
            ctx,
            LockedBalance::decaying(amount, unlock_time),
            recipient,
            false,
        )
    }

    /// Lock `amount` directly in permanent mode.
    pub fn create_permanent_lock(
        &mut self,
        ctx: &TxContext,
        amount: u128,
        recipient: AccountId,
    ) -> Result<TokenId> {
        self.check_clock(ctx)?;
        if amount == 0 {
            return Err(LedgerError::ValueZero);
        }
        self.mint_lock(ctx, LockedBalance::permanent(amount), recipient, false)
    }

    pub(crate) fn mint_lock(
        &mut self,
        ctx: &TxContext,
        locked: LockedBalance,
        recipient: AccountId,
        is_managed: bool,
    ) -> Result<TokenId> {
        let now = ctx.now();
        let prev_supply = self.state.supply;
        let new_supply = self.checked_supply(locked.amount)?;
        let new_permanent = if locked.is_permanent() {
            add_u128(self.state.permanent_total_supply, locked.amount)?
        } else {
            self.state.permanent_total_supply
        };
        let id = TokenId(self.state.next_token_id);
        let next_id = id
            .0
            .checked_add(1)
            .ok_or(LedgerError::Overflow("token id"))?;
        if locked.amount > 0 {
            self.token.pull(ctx.caller, locked.amount)?;
        }

        // Commit.
        self.observe(ctx);
        self.state.next_token_id = next_id;
        self.state
            .positions
            .insert(id, PositionState::new(recipient, is_managed));
        self.state.supply = new_supply;
        self.state.permanent_total_supply = new_permanent;
        self.state.commit_lock(id, locked, now, &self.config);

        if is_managed {
            self.events.push(EscrowEvent::CreateManaged {
                recipient,
                token: id,
            });
        } else {
            self.events.push(EscrowEvent::Deposit {
                provider: ctx.caller,
                token: id,
                kind: DepositKind::CreateLock,
                value: locked.amount,
                locktime: locked.end(),
                ts: now,
            });
        }
        self.events.push(EscrowEvent::Supply {
            prev_supply,
            supply: new_supply,
        });
        info!(
            token = id.0,
            amount = locked.amount,
            end = locked.end(),
            managed = is_managed,
            "lock created"
        );
        Ok(id)
    }

    /// Add `amount` to an existing lock. Anyone may deposit for any live position.
    pub fn deposit_for(&mut self, ctx: &TxContext, id: TokenId, amount: u128) -> Result<()> {
        self.deposit_for_batch(ctx, &[id], &[amount])
    }

    /// Deposit into several positions at once; all-or-nothing over the batch.
    pub fn deposit_for_batch(
        &mut self,
        ctx: &TxContext,
        ids: &[TokenId],
        amounts: &[u128],
    ) -> Result<()> {
        if ids.len() != amounts.len() {
            return Err(LedgerError::ArraysLengthMismatch {
                left: ids.len(),
                right: amounts.len(),
            });
        }
        self.check_clock(ctx)?;
        let now = ctx.now();

        let mut updated: BTreeMap<TokenId, LockedBalance> = BTreeMap::new();
        let mut total = 0u128;
        let mut permanent_delta = 0u128;
        for (&id, &amount) in ids.iter().zip(amounts) {
            if amount == 0 {
                return Err(LedgerError::ValueZero);
            }
            let pos = self.state.live(id)?;
            if pos.is_attached() {
                return Err(LedgerError::TokenAttached(id));
            }
            if pos.locked.is_expired(now) {
                return Err(LedgerError::TokenExpired(id));
            }
            let cur = updated.get(&id).copied().unwrap_or(pos.locked);
            updated.insert(
                id,
                LockedBalance {
                    amount: add_u128(cur.amount, amount)?,
                    mode: cur.mode,
                },
            );
            if cur.is_permanent() {
                permanent_delta = add_u128(permanent_delta, amount)?;
            }
            total = add_u128(total, amount)?;
        }
        if updated.is_empty() {
            return Err(LedgerError::ValueZero);
        }
        let prev_supply = self.state.supply;
        let new_supply = self.checked_supply(total)?;
        let new_permanent = add_u128(self.state.permanent_total_supply, permanent_delta)?;
        self.token.pull(ctx.caller, total)?;

        // Commit.
        self.observe(ctx);
        self.state.supply = new_supply;
        self.state.permanent_total_supply = new_permanent;
        let mut locktimes = BTreeMap::new();
        for (id, locked) in updated {
            locktimes.insert(id, locked.end());
            self.state.commit_lock(id, locked, now, &self.config);
        }
        for (&id, &amount) in ids.iter().zip(amounts) {
            self.events.push(EscrowEvent::Deposit {
                provider: ctx.caller,
                token: id,
                kind: DepositKind::DepositFor,
                value: amount,
                locktime: locktimes.get(&id).copied().unwrap_or(0),
                ts: now,
            });
        }
        self.events.push(EscrowEvent::Supply {
            prev_supply,
            supply: new_supply,
        });
        info!(positions = ids.len(), amount = total, "deposit for");
        Ok(())
    }

    /// Extend a decaying lock to `round_to_epoch(now + lock_duration)`.
    pub fn increase_unlock_time(
        &mut self,
        ctx: &TxContext,
        id: TokenId,
        lock_duration: u64,
    ) -> Result<()> {
        self.check_clock(ctx)?;
        let now = ctx.now();
        let pos = self.authorized(ctx, id)?;
        if pos.is_attached() {
            return Err(LedgerError::TokenAttached(id));
        }
        let VotingMode::Decaying { end } = pos.locked.mode else {
            return Err(LedgerError::PermanentLocked(id));
        };
        if pos.locked.is_expired(now) {
            return Err(LedgerError::TokenExpired(id));
        }
        let amount = pos.locked.amount;
        let unlock_time = self.unlock_time(now, lock_duration)?;
        if unlock_time <= end {
            return Err(LedgerError::InvalidLockDuration {
                unlock_time,
                now,
                max_unlock: add_ts(now, self.config.max_lock_time_secs)?,
            });
        }

        // Commit.
        self.observe(ctx);
        self.state
            .commit_lock(id, LockedBalance::decaying(amount, unlock_time), now, &self.config);
        self.events.push(EscrowEvent::Deposit {
            provider: ctx.caller,
            token: id,
            kind: DepositKind::IncreaseUnlockTime,
            value: 0,
            locktime: unlock_time,
            ts: now,
        });
        info!(token = id.0, end = unlock_time, "unlock time increased");
        Ok(())
    }

    /// Return an expired lock's tokens to its owner and burn the position.
    pub fn withdraw(&mut self, ctx: &TxContext, id: TokenId) -> Result<u128> {
        self.check_clock(ctx)?;
        let now = ctx.now();
        let pos = self.authorized(ctx, id)?;
        if pos.is_attached() {
            return Err(LedgerError::TokenAttached(id));
        }
        if pos.is_voted {
            return Err(LedgerError::TokenVoted(id));
        }
        match pos.locked.mode {
            VotingMode::Permanent => return Err(LedgerError::TokenNoExpired(id)),
            VotingMode::Decaying { end } if now < end => {
                return Err(LedgerError::TokenNoExpired(id))
            }
            VotingMode::Decaying { .. } => {}
        }
        let owner = pos.owner.ok_or(LedgerError::NonexistentToken(id))?;
        let amount = pos.locked.amount;
        let prev_supply = self.state.supply;
        let new_supply = sub_u128(prev_supply, amount)?;
        if amount > 0 {
            self.token.push(owner, amount)?;
        }

        // Commit.
        self.observe(ctx);
        self.state.supply = new_supply;
        self.state
            .commit_lock(id, LockedBalance::EMPTY, now, &self.config);
        self.burn(id);
        self.events.push(EscrowEvent::Withdraw {
            provider: owner,
            token: id,
            value: amount,
            ts: now,
        });
        self.events.push(EscrowEvent::Supply {
            prev_supply,
            supply: new_supply,
        });
        info!(token = id.0, amount, "withdrawn");
        Ok(amount)
    }

    /// Fold `from` into `to`. The destination keeps its end (or permanent mode); `from` is burned.
    pub fn merge(&mut self, ctx: &TxContext, from: TokenId, to: TokenId) -> Result<()> {
        self.check_clock(ctx)?;
        let now = ctx.now();
        if from == to {
            return Err(LedgerError::MergeTokenIdsTheSame(from));
        }
        let src = self.authorized(ctx, from)?;
        let dst = self.authorized(ctx, to)?;

        if src.is_voted {
            return Err(LedgerError::TokenVoted(from));
        }
        if src.is_attached() {
            return Err(LedgerError::TokenAttached(from));
        }
        if src.is_managed {
            return Err(LedgerError::NotNormalNft(from));
        }
        if src.locked.is_permanent() {
            return Err(LedgerError::PermanentLocked(from));
        }
        if src.locked.is_expired(now) {
            return Err(LedgerError::TokenExpired(from));
        }
        if dst.is_managed {
            return Err(LedgerError::NotNormalNft(to));
        }
        if dst.is_attached() {
            return Err(LedgerError::TokenAttached(to));
        }
        if dst.locked.is_expired(now) {
            return Err(LedgerError::TokenExpired(to));
        }

        let amount_from = src.locked.amount;
        let amount_to = dst.locked.amount;
        let merged = LockedBalance {
            amount: add_u128(amount_to, amount_from)?,
            mode: dst.locked.mode,
        };
        let new_permanent = if merged.is_permanent() {
            add_u128(self.state.permanent_total_supply, amount_from)?
        } else {
            self.state.permanent_total_supply
        };

        // Commit.
        self.observe(ctx);
        self.state.permanent_total_supply = new_permanent;
        self.state
            .commit_lock(from, LockedBalance::EMPTY, now, &self.config);
        self.burn(from);
        self.state.commit_lock(to, merged, now, &self.config);
        self.events.push(EscrowEvent::Merge {
            sender: ctx.caller,
            from,
            to,
            amount_from,
            amount_to,
            amount_final: merged.amount,
            locktime: merged.end(),
            ts: now,
        });
        info!(from = from.0, to = to.0, amount = merged.amount, "merged");
        Ok(())
    }

    /// Convert a live decaying lock into a permanent lock.
    pub fn lock_permanent(&mut self, ctx: &TxContext, id: TokenId) -> Result<()> {
        self.check_clock(ctx)?;
        let now = ctx.now();
        let pos = self.authorized(ctx, id)?;
        if pos.is_managed {
            return Err(LedgerError::NotNormalNft(id));
        }
        if pos.is_attached() {
            return Err(LedgerError::TokenAttached(id));
        }
        if pos.locked.is_permanent() {
            return Err(LedgerError::PermanentLocked(id));
        }
        if pos.locked.is_expired(now) {
            return Err(LedgerError::TokenExpired(id));
        }
        let owner = pos.owner.ok_or(LedgerError::NonexistentToken(id))?;
        let amount = pos.locked.amount;
        let new_permanent = add_u128(self.state.permanent_total_supply, amount)?;

        // Commit.
        self.observe(ctx);
        self.state.permanent_total_supply = new_permanent;
        self.state
            .commit_lock(id, LockedBalance::permanent(amount), now, &self.config);
        self.events.push(EscrowEvent::LockPermanent {
            owner,
            token: id,
            amount,
            ts: now,
        });
        info!(token = id.0, amount, "lock made permanent");
        Ok(())
    }

    /// Convert a permanent lock back into a maximum-duration decaying lock.
    pub fn unlock_permanent(&mut self, ctx: &TxContext, id: TokenId) -> Result<()> {
        self.check_clock(ctx)?;
        let now = ctx.now();
        let pos = self.authorized(ctx, id)?;
        if pos.is_managed {
            return Err(LedgerError::NotNormalNft(id));
        }
        if pos.is_attached() {
            return Err(LedgerError::TokenAttached(id));
        }
        if !pos.locked.is_permanent() {
            return Err(LedgerError::NotPermanentLocked(id));
        }
        if pos.is_voted {
            return Err(LedgerError::TokenVoted(id));
        }
        let owner = pos.owner.ok_or(LedgerError::NonexistentToken(id))?;
        let amount = pos.locked.amount;
        let end = self.max_unlock_time(now)?;
        let new_permanent = sub_u128(self.state.permanent_total_supply, amount)?;

        // Commit.
        self.observe(ctx);
        self.state.permanent_total_supply = new_permanent;
        self.state
            .commit_lock(id, LockedBalance::decaying(amount, end), now, &self.config);
        self.events.push(EscrowEvent::UnlockPermanent {
            owner,
            token: id,
            amount,
            ts: now,
        });
        info!(token = id.0, amount, end, "permanent lock released");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Ownership
    // -------------------------------------------------------------------------

    pub fn transfer_from(
        &mut self,
        ctx: &TxContext,
        from: AccountId,
        to: AccountId,
        id: TokenId,
    ) -> Result<()> {
        self.check_clock(ctx)?;
        let pos = self.authorized(ctx, id)?;
        if pos.owner != Some(from) {
            return Err(LedgerError::AccessDenied { caller: ctx.caller });
        }
        if pos.is_voted {
            return Err(LedgerError::TokenVoted(id));
        }
        if pos.is_managed {
            return Err(LedgerError::ManagedNftTransferDisabled(id));
        }
        if pos.is_attached() {
            return Err(LedgerError::TokenAttached(id));
        }

        // Commit.
        self.observe(ctx);
        if let Some(pos) = self.state.positions.get_mut(&id) {
            pos.owner = Some(to);
            pos.approved = None;
            pos.last_transfer_block = Some(ctx.block.number);
        }
        self.events.push(EscrowEvent::Transfer { from, to, token: id });
        debug!(token = id.0, %from, %to, "transferred");
        Ok(())
    }

    /// Set (or clear) the single-position approval. Owner or operator only.
    pub fn approve(
        &mut self,
        ctx: &TxContext,
        approved: Option<AccountId>,
        id: TokenId,
    ) -> Result<()> {
        self.check_clock(ctx)?;
        let pos = self.state.live(id)?;
        let owner = pos.owner.ok_or(LedgerError::NonexistentToken(id))?;
        if ctx.caller != owner && !self.state.operators.contains(&(owner, ctx.caller)) {
            return Err(LedgerError::AccessDenied { caller: ctx.caller });
        }

        // Commit.
        self.observe(ctx);
        if let Some(pos) = self.state.positions.get_mut(&id) {
            pos.approved = approved;
        }
        self.events.push(EscrowEvent::Approval {
            owner,
            approved,
            token: id,
        });
        Ok(())
    }

    pub fn set_approval_for_all(
        &mut self,
        ctx: &TxContext,
        operator: AccountId,
        approved: bool,
    ) -> Result<()> {
        self.check_clock(ctx)?;
        if operator == ctx.caller {
            return Err(LedgerError::AccessDenied { caller: ctx.caller });
        }

        // Commit.
        self.observe(ctx);
        if approved {
            self.state.operators.insert((ctx.caller, operator));
        } else {
            self.state.operators.remove(&(ctx.caller, operator));
        }
        self.events.push(EscrowEvent::ApprovalForAll {
            owner: ctx.caller,
            operator,
            approved,
        });
        Ok(())
    }

    /// Voter hook: mark a position as (not) having active votes.
    pub fn voting_hook(&mut self, ctx: &TxContext, id: TokenId, voted: bool) -> Result<()> {
        self.check_clock(ctx)?;
        self.ensure_role(ctx, Role::Voter)?;
        self.state.live(id)?;

        // Commit.
        self.observe(ctx);
        if let Some(pos) = self.state.positions.get_mut(&id) {
            pos.is_voted = voted;
        }
        self.events.push(EscrowEvent::Voted { token: id, voted });
        debug!(token = id.0, voted, "voting hook");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Views
    // -------------------------------------------------------------------------

    /// Underlying tokens held by the escrow.
    pub fn supply(&self) -> u128 {
        self.state.supply
    }

    pub fn permanent_total_supply(&self) -> u128 {
        self.state.permanent_total_supply
    }

    pub fn position(&self, id: TokenId) -> Option<&PositionState> {
        self.state.positions.get(&id)
    }

    pub fn locked(&self, id: TokenId) -> Option<LockedBalance> {
        self.state.positions.get(&id).map(|p| p.locked)
    }

    pub fn owner_of(&self, id: TokenId) -> Result<AccountId> {
        self.state
            .positions
            .get(&id)
            .and_then(|p| p.owner)
            .ok_or(LedgerError::NonexistentToken(id))
    }

    pub fn is_approved_for_all(&self, owner: AccountId, operator: AccountId) -> bool {
        self.state.operators.contains(&(owner, operator))
    }

    /// Number of checkpoints in the position's history.
    pub fn point_epoch(&self, id: TokenId) -> usize {
        self.state.positions.get(&id).map_or(0, |p| p.history.len())
    }

    pub fn user_point_history(&self, id: TokenId, index: usize) -> Option<Point> {
        self.state
            .positions
            .get(&id)
            .and_then(|p| p.history.get(index).copied())
    }

    /// Number of global checkpoints.
    pub fn epoch(&self) -> usize {
        self.state.point_history.len()
    }

    pub fn point_history(&self, index: usize) -> Option<Point> {
        self.state.point_history.get(index).copied()
    }

    pub fn slope_change(&self, t: Timestamp) -> i128 {
        self.state.slope_changes.get(&t).copied().unwrap_or(0)
    }

    pub fn last_block(&self) -> Option<BlockInfo> {
        self.state.last_block
    }

    /// Voting power of `id` in `block`; zero if the position changed hands in that block.
    pub fn balance_of_nft(&self, id: TokenId, block: &BlockInfo) -> u128 {
        match self.state.positions.get(&id) {
            Some(p) if p.last_transfer_block == Some(block.number) => 0,
            Some(p) => Self::point_balance(&p.history, block.timestamp),
            None => 0,
        }
    }

    pub fn balance_of_nft_ignore_ownership_change(&self, id: TokenId, t: Timestamp) -> u128 {
        self.balance_of_nft_at(id, t)
    }

    /// Historical voting power of `id` at `t`.
    pub fn balance_of_nft_at(&self, id: TokenId, t: Timestamp) -> u128 {
        self.state
            .positions
            .get(&id)
            .map_or(0, |p| Self::point_balance(&p.history, t))
    }

    /// Global voting power at `t`.
    pub fn total_supply_at(&self, t: Timestamp) -> u128 {
        self.state.supply_at(t, self.config.epoch_length_secs)
    }

    pub fn voting_power_total_supply(&self, t: Timestamp) -> u128 {
        self.total_supply_at(t)
    }

    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<EscrowEvent> {
        std::mem::take(&mut self.events)
    }

    /// Commitment to the full escrow state (`SHA-256` over the canonical `bincode` encoding).
    pub fn state_hash(&self) -> Result<Hash32> {
        crate::hash::hash_escrow_state(&self.state)
    }

    fn point_balance(history: &CheckpointIndex<Point>, t: Timestamp) -> u128 {
        history.lookup(t).map_or(0, |p| p.balance_at(t))
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    pub(crate) fn check_clock(&self, ctx: &TxContext) -> Result<()> {
        match self.state.last_block {
            Some(last)
                if ctx.block.number < last.number || ctx.block.timestamp < last.timestamp =>
            {
                Err(LedgerError::ClockRegression {
                    last,
                    got: ctx.block,
                })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn observe(&mut self, ctx: &TxContext) {
        self.state.last_block = Some(ctx.block);
    }

    pub(crate) fn ensure_role(&self, ctx: &TxContext, role: Role) -> Result<()> {
        if self.auth.has_role(ctx.caller, role) {
            Ok(())
        } else {
            Err(LedgerError::AccessDenied { caller: ctx.caller })
        }
    }

    /// Live position that `ctx.caller` may mutate.
    fn authorized(&self, ctx: &TxContext, id: TokenId) -> Result<&PositionState> {
        let pos = self.state.live(id)?;
        let owner = pos.owner.ok_or(LedgerError::NonexistentToken(id))?;
        let ownership = Ownership {
            owner,
            approved: pos.approved,
            operator_approved: self.state.operators.contains(&(owner, ctx.caller)),
        };
        if !self.auth.can_mutate(ctx.caller, &ownership) {
            return Err(LedgerError::AccessDenied { caller: ctx.caller });
        }
        Ok(pos)
    }

    fn unlock_time(&self, now: Timestamp, lock_duration: u64) -> Result<Timestamp> {
        let max_unlock = add_ts(now, self.config.max_lock_time_secs)?;
        let unlock_time = round_to_epoch(
            add_ts(now, lock_duration)?,
            self.config.epoch_length_secs,
        );
        if unlock_time <= now || unlock_time > max_unlock {
            return Err(LedgerError::InvalidLockDuration {
                unlock_time,
                now,
                max_unlock,
            });
        }
        Ok(unlock_time)
    }

    pub(crate) fn max_unlock_time(&self, now: Timestamp) -> Result<Timestamp> {
        Ok(round_to_epoch(
            add_ts(now, self.config.max_lock_time_secs)?,
            self.config.epoch_length_secs,
        ))
    }

    fn checked_supply(&self, amount: u128) -> Result<u128> {
        let new_supply = add_u128(self.state.supply, amount)?;
        if new_supply > self.config.max_total_supply {
            return Err(LedgerError::SupplyCapExceeded {
                cap: self.config.max_total_supply,
            });
        }
        Ok(new_supply)
    }

    fn burn(&mut self, id: TokenId) {
        if let Some(pos) = self.state.positions.get_mut(&id) {
            pos.owner = None;
            pos.approved = None;
        }
    }

    pub(crate) fn push_event(&mut self, event: EscrowEvent) {
        self.events.push(event);
    }
}
