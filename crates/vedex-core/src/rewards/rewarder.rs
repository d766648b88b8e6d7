use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::auth::{Authorizer, Role};
use crate::checkpoint::CheckpointIndex;
use crate::config::LedgerConfig;
use crate::math::{add_u128, mul_div_floor, round_to_epoch, sub_u128};
use crate::{BlockInfo, Hash32, LedgerError, Result, Timestamp, TokenId, TxContext};

use super::types::{BalanceCheckpoint, RewarderEvent, TokenInfo};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewarderState {
    pub(crate) tokens: BTreeMap<TokenId, TokenInfo>,
    pub(crate) total_supply: u128,
    pub(crate) total_supply_checkpoints: CheckpointIndex<BalanceCheckpoint>,
    pub(crate) rewards_per_epoch: BTreeMap<Timestamp, u128>,
    /// Sum of all notified rewards.
    pub(crate) total_notified: u128,
    /// Sum of all harvested rewards.
    pub(crate) total_harvested: u128,
    pub(crate) last_block: Option<BlockInfo>,
}

/// Strategy-driven virtual balance ledger with retroactive epoch rewards.
///
/// Rewards notified during epoch `e` are split across positions by their balance at the end of
/// `e` (the last checkpoint written in `e`), and become claimable once `e` has fully elapsed.
pub struct VirtualRewarder<A> {
    config: LedgerConfig,
    auth: A,
    pub(crate) state: RewarderState,
    events: Vec<RewarderEvent>,
}

impl<A: Authorizer> VirtualRewarder<A> {
    pub fn new(config: LedgerConfig, auth: A) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            auth,
            state: RewarderState::default(),
            events: Vec::new(),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn state(&self) -> &RewarderState {
        &self.state
    }

    pub fn current_epoch(&self, now: Timestamp) -> Timestamp {
        round_to_epoch(now, self.config.epoch_length_secs)
    }

    /// Credit `amount` of virtual balance to `token` in the current epoch.
    pub fn deposit(&mut self, ctx: &TxContext, token: TokenId, amount: u128) -> Result<()> {
        self.guard(ctx)?;
        if amount == 0 {
            return Err(LedgerError::ValueZero);
        }
        let balance = self.balance_of(token);
        let new_balance = add_u128(balance, amount)?;
        let new_total = add_u128(self.state.total_supply, amount)?;
        let epoch = self.current_epoch(ctx.now());

        // Commit.
        self.commit_balance(ctx, token, new_balance, new_total, epoch);
        self.events.push(RewarderEvent::Deposit {
            token,
            amount,
            epoch,
        });
        debug!(token = token.0, amount, epoch, "virtual deposit");
        Ok(())
    }

    /// Debit `amount` of virtual balance from `token` in the current epoch.
    pub fn withdraw(&mut self, ctx: &TxContext, token: TokenId, amount: u128) -> Result<()> {
        self.guard(ctx)?;
        if amount == 0 {
            return Err(LedgerError::ValueZero);
        }
        let balance = self.balance_of(token);
        if amount > balance {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: balance,
            });
        }
        let new_total = sub_u128(self.state.total_supply, amount)?;
        let epoch = self.current_epoch(ctx.now());

        // Commit.
        self.commit_balance(ctx, token, balance - amount, new_total, epoch);
        self.events.push(RewarderEvent::Withdraw {
            token,
            amount,
            epoch,
        });
        debug!(token = token.0, amount, epoch, "virtual withdraw");
        Ok(())
    }

    /// Add `amount` to the current epoch's reward pool.
    pub fn notify_reward_amount(&mut self, ctx: &TxContext, amount: u128) -> Result<()> {
        self.guard(ctx)?;
        if amount == 0 {
            return Err(LedgerError::ValueZero);
        }
        let epoch = self.current_epoch(ctx.now());
        let pool = self.rewards_per_epoch(epoch);
        let new_pool = add_u128(pool, amount)?;
        let new_notified = add_u128(self.state.total_notified, amount)?;

        // Commit.
        self.state.last_block = Some(ctx.block);
        self.state.rewards_per_epoch.insert(epoch, new_pool);
        self.state.total_notified = new_notified;
        self.events.push(RewarderEvent::NotifyReward { amount, epoch });
        info!(amount, epoch, "reward notified");
        Ok(())
    }

    /// Pay out everything earned by `token` over fully elapsed epochs.
    ///
    /// A token that never deposited earns nothing and leaves the state untouched.
    pub fn harvest(&mut self, ctx: &TxContext, token: TokenId) -> Result<u128> {
        self.guard(ctx)?;
        if !self.state.tokens.contains_key(&token) {
            return Ok(0);
        }
        let now = ctx.now();
        let reward = self.calculate_available_rewards_amount(token, now)?;
        let new_harvested = add_u128(self.state.total_harvested, reward)?;
        let epoch = self.current_epoch(now);

        // Commit.
        self.state.last_block = Some(ctx.block);
        if let Some(info) = self.state.tokens.get_mut(&token) {
            info.last_earn_epoch = Some(epoch);
        }
        self.state.total_harvested = new_harvested;
        self.events.push(RewarderEvent::Harvest {
            token,
            reward,
            epoch,
        });
        info!(token = token.0, reward, epoch, "harvested");
        Ok(reward)
    }

    /// Rewards `token` could harvest at `now`.
    ///
    /// Sums `rewards[e] * balance_of_at(token, e) / total_supply_at(e)` (floor) over epochs `e`
    /// from the last harvest epoch (or the first checkpoint epoch) up to, excluding, the current
    /// epoch.
    pub fn calculate_available_rewards_amount(
        &self,
        token: TokenId,
        now: Timestamp,
    ) -> Result<u128> {
        let Some(info) = self.state.tokens.get(&token) else {
            return Ok(0);
        };
        let Some(first) = info.checkpoints.first() else {
            return Ok(0);
        };
        let start = info.last_earn_epoch.unwrap_or(first.epoch);
        let current = self.current_epoch(now);
        if start >= current {
            return Ok(0);
        }

        let mut reward = 0u128;
        for (&epoch, &pool) in self.state.rewards_per_epoch.range(start..current) {
            let total = self.total_supply_at(epoch);
            if pool == 0 || total == 0 {
                continue;
            }
            let balance = Self::lookup(&info.checkpoints, epoch);
            reward = add_u128(reward, mul_div_floor(pool, balance, total)?)?;
        }
        Ok(reward)
    }

    pub fn balance_of(&self, token: TokenId) -> u128 {
        self.state.tokens.get(&token).map_or(0, |i| i.balance)
    }

    pub fn total_supply(&self) -> u128 {
        self.state.total_supply
    }

    /// Balance of `token` as of epoch `at` (latest checkpoint at or before `at`).
    pub fn balance_of_at(&self, token: TokenId, at: Timestamp) -> u128 {
        self.state
            .tokens
            .get(&token)
            .map_or(0, |i| Self::lookup(&i.checkpoints, at))
    }

    pub fn total_supply_at(&self, at: Timestamp) -> u128 {
        Self::lookup(&self.state.total_supply_checkpoints, at)
    }

    pub fn rewards_per_epoch(&self, epoch: Timestamp) -> u128 {
        self.state.rewards_per_epoch.get(&epoch).copied().unwrap_or(0)
    }

    pub fn token_info(&self, token: TokenId) -> Option<&TokenInfo> {
        self.state.tokens.get(&token)
    }

    pub fn total_notified(&self) -> u128 {
        self.state.total_notified
    }

    pub fn total_harvested(&self) -> u128 {
        self.state.total_harvested
    }

    pub fn last_block(&self) -> Option<BlockInfo> {
        self.state.last_block
    }

    pub fn events(&self) -> &[RewarderEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<RewarderEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn state_hash(&self) -> Result<Hash32> {
        crate::hash::hash_rewarder_state(&self.state)
    }

    fn lookup(index: &CheckpointIndex<BalanceCheckpoint>, at: Timestamp) -> u128 {
        index.lookup(at).map_or(0, |c| c.amount)
    }

    /// Clock monotonicity plus the strategy role.
    fn guard(&self, ctx: &TxContext) -> Result<()> {
        if let Some(last) = self.state.last_block {
            if ctx.block.number < last.number || ctx.block.timestamp < last.timestamp {
                return Err(LedgerError::ClockRegression {
                    last,
                    got: ctx.block,
                });
            }
        }
        if !self.auth.has_role(ctx.caller, Role::Strategy) {
            return Err(LedgerError::AccessDenied { caller: ctx.caller });
        }
        Ok(())
    }

    fn commit_balance(
        &mut self,
        ctx: &TxContext,
        token: TokenId,
        new_balance: u128,
        new_total: u128,
        epoch: Timestamp,
    ) {
        self.state.last_block = Some(ctx.block);
        let info = self.state.tokens.entry(token).or_default();
        info.balance = new_balance;
        info.checkpoints.write(BalanceCheckpoint {
            epoch,
            amount: new_balance,
        });
        self.state.total_supply = new_total;
        self.state
            .total_supply_checkpoints
            .write(BalanceCheckpoint {
                epoch,
                amount: new_total,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::RoleAuthorizer;
    use crate::config::WEEK;
    use crate::math::WAD;
    use crate::AccountId;
    use proptest::prelude::*;

    const STRATEGY: AccountId = AccountId(5);
    const E0: u64 = 200 * WEEK;

    fn rewarder() -> VirtualRewarder<RoleAuthorizer> {
        let auth = RoleAuthorizer::new().with_role(Role::Strategy, STRATEGY);
        VirtualRewarder::new(LedgerConfig::default(), auth).unwrap()
    }

    fn tx(number: u64, ts: u64) -> TxContext {
        TxContext::new(STRATEGY, number, ts)
    }

    #[test]
    fn fixture_split_one_to_three() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0 + 10), TokenId(1), WAD).unwrap();
        r.deposit(&tx(2, E0 + 20), TokenId(2), 3 * WAD).unwrap();
        r.notify_reward_amount(&tx(3, E0 + 30), 10 * WAD).unwrap();

        // Nothing is claimable while the epoch is open.
        assert_eq!(r.calculate_available_rewards_amount(TokenId(1), E0 + 40).unwrap(), 0);

        let next = E0 + WEEK;
        assert_eq!(
            r.calculate_available_rewards_amount(TokenId(1), next).unwrap(),
            2_500_000_000_000_000_000
        );
        assert_eq!(
            r.calculate_available_rewards_amount(TokenId(2), next).unwrap(),
            7_500_000_000_000_000_000
        );
    }

    #[test]
    fn split_one_to_ten_floors() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        r.deposit(&tx(1, E0), TokenId(2), 10 * WAD).unwrap();
        r.notify_reward_amount(&tx(1, E0), 16 * WAD).unwrap();

        let next = E0 + WEEK;
        let a = r.calculate_available_rewards_amount(TokenId(1), next).unwrap();
        let b = r.calculate_available_rewards_amount(TokenId(2), next).unwrap();
        assert_eq!(a, 16 * WAD / 11);
        assert_eq!(b, 160 * WAD / 11);
        assert!(a + b <= 16 * WAD);
    }

    #[test]
    fn second_harvest_in_same_epoch_is_zero() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        r.notify_reward_amount(&tx(1, E0), 4 * WAD).unwrap();

        let t = E0 + WEEK + 5;
        assert_eq!(r.harvest(&tx(2, t), TokenId(1)).unwrap(), 4 * WAD);
        assert_eq!(r.harvest(&tx(3, t + 1), TokenId(1)).unwrap(), 0);
        assert_eq!(r.token_info(TokenId(1)).unwrap().last_earn_epoch, Some(E0 + WEEK));
        assert_eq!(r.total_harvested(), 4 * WAD);
    }

    #[test]
    fn harvest_of_unknown_token_changes_nothing() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        r.notify_reward_amount(&tx(1, E0), 4 * WAD).unwrap();
        let before = r.state_hash().unwrap();
        let events = r.events().len();

        assert_eq!(r.harvest(&tx(2, E0 + WEEK), TokenId(9)).unwrap(), 0);
        assert!(r.token_info(TokenId(9)).is_none());
        assert_eq!(r.state_hash().unwrap(), before);
        assert_eq!(r.events().len(), events);
    }

    #[test]
    fn reward_notified_after_harvest_is_claimed_later() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        let e1 = E0 + WEEK;
        assert_eq!(r.harvest(&tx(2, e1 + 1), TokenId(1)).unwrap(), 0);
        r.notify_reward_amount(&tx(3, e1 + 2), 3 * WAD).unwrap();

        assert_eq!(r.calculate_available_rewards_amount(TokenId(1), e1 + 3).unwrap(), 0);
        assert_eq!(r.harvest(&tx(4, e1 + WEEK), TokenId(1)).unwrap(), 3 * WAD);
    }

    #[test]
    fn balance_changes_within_epoch_use_final_checkpoint() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), 5 * WAD).unwrap();
        r.deposit(&tx(1, E0), TokenId(2), 5 * WAD).unwrap();
        r.notify_reward_amount(&tx(2, E0 + 1), 10 * WAD).unwrap();
        r.withdraw(&tx(3, E0 + 2), TokenId(2), 5 * WAD).unwrap();

        let info = r.token_info(TokenId(2)).unwrap();
        assert_eq!(info.last_checkpoint_index(), 1);
        assert_eq!(r.balance_of_at(TokenId(2), E0), 0);
        assert_eq!(r.total_supply_at(E0), 5 * WAD);
        assert_eq!(
            r.calculate_available_rewards_amount(TokenId(1), E0 + WEEK).unwrap(),
            10 * WAD
        );
        assert_eq!(
            r.calculate_available_rewards_amount(TokenId(2), E0 + WEEK).unwrap(),
            0
        );
    }

    #[test]
    fn epochs_without_supply_pay_nothing() {
        let mut r = rewarder();
        r.notify_reward_amount(&tx(1, E0), 10 * WAD).unwrap();
        r.deposit(&tx(2, E0 + WEEK), TokenId(1), WAD).unwrap();
        assert_eq!(
            r.calculate_available_rewards_amount(TokenId(1), E0 + 5 * WEEK).unwrap(),
            0
        );
    }

    #[test]
    fn rewards_accumulate_across_epochs() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        r.deposit(&tx(1, E0), TokenId(2), WAD).unwrap();
        r.notify_reward_amount(&tx(1, E0), 2 * WAD).unwrap();
        r.withdraw(&tx(2, E0 + WEEK), TokenId(2), WAD).unwrap();
        r.notify_reward_amount(&tx(2, E0 + WEEK), 6 * WAD).unwrap();

        let t = E0 + 2 * WEEK;
        assert_eq!(r.calculate_available_rewards_amount(TokenId(1), t).unwrap(), 7 * WAD);
        assert_eq!(r.calculate_available_rewards_amount(TokenId(2), t).unwrap(), WAD);
    }

    #[test]
    fn withdraw_more_than_balance_fails() {
        let mut r = rewarder();
        r.deposit(&tx(1, E0), TokenId(1), WAD).unwrap();
        let before = r.state_hash().unwrap();
        assert_eq!(
            r.withdraw(&tx(2, E0), TokenId(1), 2 * WAD),
            Err(LedgerError::InsufficientBalance {
                requested: 2 * WAD,
                available: WAD
            })
        );
        assert_eq!(r.withdraw(&tx(2, E0), TokenId(1), 0), Err(LedgerError::ValueZero));
        assert_eq!(r.state_hash().unwrap(), before);
    }

    #[test]
    fn only_strategy_may_mutate() {
        let mut r = rewarder();
        let ctx = TxContext::new(AccountId(9), 1, E0);
        assert_eq!(
            r.deposit(&ctx, TokenId(1), WAD),
            Err(LedgerError::AccessDenied {
                caller: AccountId(9)
            })
        );
        assert_eq!(
            r.notify_reward_amount(&ctx, WAD),
            Err(LedgerError::AccessDenied {
                caller: AccountId(9)
            })
        );
        assert!(r.harvest(&ctx, TokenId(1)).is_err());
    }

    #[test]
    fn clock_regression_is_rejected() {
        let mut r = rewarder();
        r.deposit(&tx(5, E0 + 100), TokenId(1), WAD).unwrap();
        assert!(matches!(
            r.deposit(&tx(4, E0 + 200), TokenId(1), WAD),
            Err(LedgerError::ClockRegression { .. })
        ));
    }

    proptest! {
        #[test]
        fn harvests_never_exceed_notified(
            steps in proptest::collection::vec((0u8..4, 1u8..4, 1u64..100, 0u64..WEEK), 1..60),
        ) {
            let mut r = rewarder();
            let mut now = E0;
            let mut block = 0;
            for (kind, id, amount, dt) in steps {
                now += dt;
                block += 1;
                let ctx = tx(block, now);
                let token = TokenId(u64::from(id));
                let amount = u128::from(amount) * WAD;
                let _ = match kind {
                    0 => r.deposit(&ctx, token, amount),
                    1 => r.withdraw(&ctx, token, amount),
                    2 => r.notify_reward_amount(&ctx, amount),
                    _ => r.harvest(&ctx, token).map(|_| ()),
                };
                let pending: u128 = (1..4)
                    .map(|i| r.calculate_available_rewards_amount(TokenId(i), now).unwrap())
                    .sum();
                prop_assert!(r.total_harvested() + pending <= r.total_notified());
                let sum: u128 = r.state.tokens.values().map(|i| i.balance).sum();
                prop_assert_eq!(sum, r.total_supply());
            }
        }
    }
}
