//! Managed (delegated) positions.
//!
//! A managed position is a permanent aggregator owned by a manager contract. Normal positions
//! attach to it, moving their current voting weight into the aggregator's permanent bucket, and
//! later detach with whatever amount the manager decides to return.

use tracing::info;

use crate::auth::{Authorizer, Role};
use crate::math::{add_u128, sub_u128};
use crate::token::UnderlyingToken;
use crate::{AccountId, LedgerError, Result, TokenId, TxContext};

use super::ledger::VotingEscrow;
use super::types::{EscrowEvent, LockedBalance};

impl<A: Authorizer, T: UnderlyingToken> VotingEscrow<A, T> {
    /// Mint an empty permanent aggregator to `recipient`.
    pub fn create_managed_nft(&mut self, ctx: &TxContext, recipient: AccountId) -> Result<TokenId> {
        self.check_clock(ctx)?;
        self.ensure_role(ctx, Role::ManagedNftManager)?;
        self.mint_lock(ctx, LockedBalance::permanent(0), recipient, true)
    }

    /// Delegate `token`'s current voting weight into `managed`. Returns the weight moved.
    ///
    /// Postconditions:
    /// - `token`'s lock is zeroed and it is recorded as attached to `managed`
    /// - `managed`'s permanent amount and `permanent_total_supply` grow by the weight
    /// - `supply` and the global voting power are unchanged
    pub fn on_attach_to_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
    ) -> Result<u128> {
        self.check_clock(ctx)?;
        self.ensure_role(ctx, Role::ManagedNftManager)?;
        let now = ctx.now();

        let m = self.state.live(managed)?;
        if !m.is_managed {
            return Err(LedgerError::NotManagedNft(managed));
        }
        let managed_amount = m.locked.amount;

        let p = self.state.live(token)?;
        if p.is_managed {
            return Err(LedgerError::NotNormalNft(token));
        }
        if p.is_attached() {
            return Err(LedgerError::TokenAttached(token));
        }
        if p.is_voted {
            return Err(LedgerError::TokenVoted(token));
        }
        if p.locked.is_expired(now) {
            return Err(LedgerError::TokenExpired(token));
        }
        let leaving_permanent = if p.locked.is_permanent() {
            p.locked.amount
        } else {
            0
        };

        let weight = self.balance_of_nft_at(token, now);
        if weight == 0 {
            return Err(LedgerError::ValueZero);
        }
        let new_managed_amount = add_u128(managed_amount, weight)?;
        let new_permanent = add_u128(
            sub_u128(self.state.permanent_total_supply, leaving_permanent)?,
            weight,
        )?;

        // Commit.
        self.observe(ctx);
        self.state.permanent_total_supply = new_permanent;
        if let Some(p) = self.state.positions.get_mut(&token) {
            p.attached_to = Some(managed);
        }
        self.state
            .commit_lock(token, LockedBalance::EMPTY, now, &self.config);
        self.state.commit_lock(
            managed,
            LockedBalance::permanent(new_managed_amount),
            now,
            &self.config,
        );
        self.push_event(EscrowEvent::Attach {
            token,
            managed,
            weight,
        });
        info!(token = token.0, managed = managed.0, weight, "attached to managed position");
        Ok(weight)
    }

    /// Release `token` from `managed`, returning `returned_amount` as a fresh maximum-duration
    /// decaying lock. The pro-rata share is computed by the manager, not here.
    pub fn on_detach_from_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
        returned_amount: u128,
    ) -> Result<()> {
        self.check_clock(ctx)?;
        self.ensure_role(ctx, Role::ManagedNftManager)?;
        let now = ctx.now();

        let m = self.state.live(managed)?;
        if !m.is_managed {
            return Err(LedgerError::NotManagedNft(managed));
        }
        let managed_amount = m.locked.amount;

        let p = self.state.live(token)?;
        if p.attached_to != Some(managed) {
            return Err(LedgerError::TokenNotAttached { token, managed });
        }
        if returned_amount > managed_amount {
            return Err(LedgerError::ManagedBalanceExceeded {
                requested: returned_amount,
                available: managed_amount,
            });
        }
        let end = self.max_unlock_time(now)?;
        let new_permanent = sub_u128(self.state.permanent_total_supply, returned_amount)?;

        // Commit.
        self.observe(ctx);
        self.state.permanent_total_supply = new_permanent;
        self.state.commit_lock(
            managed,
            LockedBalance::permanent(managed_amount - returned_amount),
            now,
            &self.config,
        );
        if let Some(p) = self.state.positions.get_mut(&token) {
            p.attached_to = None;
        }
        self.state.commit_lock(
            token,
            LockedBalance::decaying(returned_amount, end),
            now,
            &self.config,
        );
        self.push_event(EscrowEvent::Detach {
            token,
            managed,
            amount: returned_amount,
            locktime: end,
        });
        info!(
            token = token.0,
            managed = managed.0,
            returned_amount,
            end,
            "detached from managed position"
        );
        Ok(())
    }
}
