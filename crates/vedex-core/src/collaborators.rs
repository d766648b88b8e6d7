//! Interfaces the escrow exposes to its privileged collaborators.
//!
//! The voter (weight aggregation) only reads voting power and flips the `is_voted` flag; the
//! managed-position manager creates aggregators and moves weight in and out of them. Both talk
//! to the escrow through these traits so they can be tested against fakes.

use crate::auth::Authorizer;
use crate::escrow::VotingEscrow;
use crate::token::UnderlyingToken;
use crate::{AccountId, BlockInfo, Result, Timestamp, TokenId, TxContext};

/// Read-only voting power queries.
pub trait VotingPowerSource {
    /// Voting power of `id` in `block`, zero if the position changed hands in that block.
    fn balance_of_nft(&self, id: TokenId, block: &BlockInfo) -> u128;

    fn balance_of_nft_ignore_ownership_change(&self, id: TokenId, t: Timestamp) -> u128;

    fn voting_power_total_supply(&self, t: Timestamp) -> u128;
}

/// Vote bookkeeping callback.
pub trait VoteLockHook {
    fn voting_hook(&mut self, ctx: &TxContext, id: TokenId, voted: bool) -> Result<()>;
}

/// Managed (delegated) position lifecycle.
pub trait ManagedNftHooks {
    fn create_managed_nft(&mut self, ctx: &TxContext, recipient: AccountId) -> Result<TokenId>;

    /// Returns the voting weight moved into `managed`.
    fn on_attach_to_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
    ) -> Result<u128>;

    fn on_detach_from_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
        returned_amount: u128,
    ) -> Result<()>;
}

impl<A: Authorizer, T: UnderlyingToken> VotingPowerSource for VotingEscrow<A, T> {
    fn balance_of_nft(&self, id: TokenId, block: &BlockInfo) -> u128 {
        VotingEscrow::balance_of_nft(self, id, block)
    }

    fn balance_of_nft_ignore_ownership_change(&self, id: TokenId, t: Timestamp) -> u128 {
        VotingEscrow::balance_of_nft_ignore_ownership_change(self, id, t)
    }

    fn voting_power_total_supply(&self, t: Timestamp) -> u128 {
        VotingEscrow::voting_power_total_supply(self, t)
    }
}

impl<A: Authorizer, T: UnderlyingToken> VoteLockHook for VotingEscrow<A, T> {
    fn voting_hook(&mut self, ctx: &TxContext, id: TokenId, voted: bool) -> Result<()> {
        VotingEscrow::voting_hook(self, ctx, id, voted)
    }
}

impl<A: Authorizer, T: UnderlyingToken> ManagedNftHooks for VotingEscrow<A, T> {
    fn create_managed_nft(&mut self, ctx: &TxContext, recipient: AccountId) -> Result<TokenId> {
        VotingEscrow::create_managed_nft(self, ctx, recipient)
    }

    fn on_attach_to_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
    ) -> Result<u128> {
        VotingEscrow::on_attach_to_managed_nft(self, ctx, token, managed)
    }

    fn on_detach_from_managed_nft(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        managed: TokenId,
        returned_amount: u128,
    ) -> Result<()> {
        VotingEscrow::on_detach_from_managed_nft(self, ctx, token, managed, returned_amount)
    }
}
