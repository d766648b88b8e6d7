use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::RoleAuthorizer;
use crate::config::LedgerConfig;
use crate::escrow::VotingEscrow;
use crate::hash::{canonical_bytes, sha256_domain, LEDGERS_STATE_DOMAIN_V1};
use crate::metrics::LedgerMetrics;
use crate::rewards::VirtualRewarder;
use crate::token::InMemoryToken;
use crate::{AccountId, Hash32, Result, TokenId, TxContext};

use super::invariants::{self, InvariantViolation};

/// State transition inputs across both ledgers plus the custody boundary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    /// Credit underlying tokens to an account (boundary IO; minting lives outside the escrow).
    MintUnderlying { to: AccountId, amount: u128 },

    CreateLock {
        amount: u128,
        lock_duration: u64,
        recipient: AccountId,
    },
    CreatePermanentLock { amount: u128, recipient: AccountId },
    DepositFor { token: TokenId, amount: u128 },
    DepositForBatch {
        tokens: Vec<TokenId>,
        amounts: Vec<u128>,
    },
    IncreaseUnlockTime { token: TokenId, lock_duration: u64 },
    Withdraw { token: TokenId },
    Merge { from: TokenId, to: TokenId },
    LockPermanent { token: TokenId },
    UnlockPermanent { token: TokenId },

    TransferFrom {
        from: AccountId,
        to: AccountId,
        token: TokenId,
    },
    Approve {
        approved: Option<AccountId>,
        token: TokenId,
    },
    SetApprovalForAll { operator: AccountId, approved: bool },

    VotingHook { token: TokenId, voted: bool },

    CreateManagedNft { recipient: AccountId },
    AttachToManaged { token: TokenId, managed: TokenId },
    DetachFromManaged {
        token: TokenId,
        managed: TokenId,
        returned_amount: u128,
    },

    RewardDeposit { token: TokenId, amount: u128 },
    RewardWithdraw { token: TokenId, amount: u128 },
    NotifyRewardAmount { amount: u128 },
    Harvest { token: TokenId },
}

/// An action together with the caller and clock it runs under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedAction {
    pub ctx: TxContext,
    pub action: LedgerAction,
}

impl TimedAction {
    pub fn new(ctx: TxContext, action: LedgerAction) -> Self {
        Self { ctx, action }
    }
}

/// A replayable trace: role grants plus the ordered actions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    pub roles: RoleAuthorizer,
    pub actions: Vec<TimedAction>,
}

/// Observable result of a state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Unit,
    /// A new position was minted.
    Minted(TokenId),
    /// Tokens returned by a withdraw, weight moved by an attach, or reward paid by a harvest.
    Amount(u128),
}

/// Escrow, rewarder and custody driven as one simulated system.
pub struct Ledgers {
    pub escrow: VotingEscrow<RoleAuthorizer, InMemoryToken>,
    pub rewarder: VirtualRewarder<RoleAuthorizer>,
    pub metrics: LedgerMetrics,
}

impl Ledgers {
    pub fn new(config: LedgerConfig, roles: RoleAuthorizer) -> Result<Self> {
        Ok(Self {
            escrow: VotingEscrow::new(config.clone(), roles.clone(), InMemoryToken::new())?,
            rewarder: VirtualRewarder::new(config, roles)?,
            metrics: LedgerMetrics::new(),
        })
    }

    /// Dispatch one action. Errors leave every ledger unchanged.
    pub fn apply(&mut self, timed: &TimedAction) -> Result<ActionOutcome> {
        let before = self.checkpoint_entries();
        let r = self.dispatch(&timed.ctx, &timed.action);
        let written = self.checkpoint_entries().saturating_sub(before);
        self.metrics.record(r.is_ok(), written);
        match &r {
            Ok(ActionOutcome::Amount(paid))
                if matches!(timed.action, LedgerAction::Harvest { .. }) =>
            {
                if *paid > 0 {
                    self.metrics.rewards_harvested.inc();
                }
            }
            Err(e) => debug!(
                caller = %timed.ctx.caller,
                action = ?timed.action,
                error = %e,
                "action rejected"
            ),
            _ => {}
        }
        r
    }

    fn dispatch(&mut self, ctx: &TxContext, action: &LedgerAction) -> Result<ActionOutcome> {
        use ActionOutcome::{Amount, Minted, Unit};
        let ve = &mut self.escrow;
        let rw = &mut self.rewarder;
        Ok(match action {
            LedgerAction::MintUnderlying { to, amount } => {
                ve.token_mut().mint(*to, *amount)?;
                Unit
            }
            LedgerAction::CreateLock {
                amount,
                lock_duration,
                recipient,
            } => Minted(ve.create_lock(ctx, *amount, *lock_duration, *recipient)?),
            LedgerAction::CreatePermanentLock { amount, recipient } => {
                Minted(ve.create_permanent_lock(ctx, *amount, *recipient)?)
            }
            LedgerAction::DepositFor { token, amount } => {
                ve.deposit_for(ctx, *token, *amount)?;
                Unit
            }
            LedgerAction::DepositForBatch { tokens, amounts } => {
                ve.deposit_for_batch(ctx, tokens, amounts)?;
                Unit
            }
            LedgerAction::IncreaseUnlockTime {
                token,
                lock_duration,
            } => {
                ve.increase_unlock_time(ctx, *token, *lock_duration)?;
                Unit
            }
            LedgerAction::Withdraw { token } => Amount(ve.withdraw(ctx, *token)?),
            LedgerAction::Merge { from, to } => {
                ve.merge(ctx, *from, *to)?;
                Unit
            }
            LedgerAction::LockPermanent { token } => {
                ve.lock_permanent(ctx, *token)?;
                Unit
            }
            LedgerAction::UnlockPermanent { token } => {
                ve.unlock_permanent(ctx, *token)?;
                Unit
            }
            LedgerAction::TransferFrom { from, to, token } => {
                ve.transfer_from(ctx, *from, *to, *token)?;
                Unit
            }
            LedgerAction::Approve { approved, token } => {
                ve.approve(ctx, *approved, *token)?;
                Unit
            }
            LedgerAction::SetApprovalForAll { operator, approved } => {
                ve.set_approval_for_all(ctx, *operator, *approved)?;
                Unit
            }
            LedgerAction::VotingHook { token, voted } => {
                ve.voting_hook(ctx, *token, *voted)?;
                Unit
            }
            LedgerAction::CreateManagedNft { recipient } => {
                Minted(ve.create_managed_nft(ctx, *recipient)?)
            }
            LedgerAction::AttachToManaged { token, managed } => {
                Amount(ve.on_attach_to_managed_nft(ctx, *token, *managed)?)
            }
            LedgerAction::DetachFromManaged {
                token,
                managed,
                returned_amount,
            } => {
                ve.on_detach_from_managed_nft(ctx, *token, *managed, *returned_amount)?;
                Unit
            }
            LedgerAction::RewardDeposit { token, amount } => {
                rw.deposit(ctx, *token, *amount)?;
                Unit
            }
            LedgerAction::RewardWithdraw { token, amount } => {
                rw.withdraw(ctx, *token, *amount)?;
                Unit
            }
            LedgerAction::NotifyRewardAmount { amount } => {
                rw.notify_reward_amount(ctx, *amount)?;
                Unit
            }
            LedgerAction::Harvest { token } => Amount(rw.harvest(ctx, *token)?),
        })
    }

    /// Commitment to escrow state, rewarder state and custody balances.
    pub fn state_hash(&self) -> Result<Hash32> {
        let bytes = canonical_bytes(&(
            &self.escrow.state,
            &self.rewarder.state,
            self.escrow.token(),
        ))?;
        Ok(sha256_domain(LEDGERS_STATE_DOMAIN_V1, &bytes))
    }

    /// Check every state invariant of both ledgers and the custody link between them.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        invariants::check_escrow(&self.escrow)?;
        invariants::check_custody(&self.escrow)?;
        invariants::check_rewarder(&self.rewarder)
    }

    fn checkpoint_entries(&self) -> u64 {
        let escrow = &self.escrow.state;
        let rewarder = &self.rewarder.state;
        let total = escrow.point_history.len()
            + escrow.positions.values().map(|p| p.history.len()).sum::<usize>()
            + rewarder.total_supply_checkpoints.len()
            + rewarder.tokens.values().map(|t| t.checkpoints.len()).sum::<usize>();
        total as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::config::WEEK;
    use crate::math::WAD;

    const ALICE: AccountId = AccountId(1);
    const STRATEGY: AccountId = AccountId(92);
    const T0: u64 = 100 * WEEK;

    fn ledgers() -> Ledgers {
        let roles = RoleAuthorizer::new().with_role(Role::Strategy, STRATEGY);
        Ledgers::new(LedgerConfig::default(), roles).unwrap()
    }

    fn at(caller: AccountId, number: u64, ts: u64, action: LedgerAction) -> TimedAction {
        TimedAction::new(TxContext::new(caller, number, ts), action)
    }

    #[test]
    fn dispatch_returns_outcomes_and_counts() {
        let mut l = ledgers();
        let mint = at(ALICE, 1, T0, LedgerAction::MintUnderlying { to: ALICE, amount: WAD });
        assert_eq!(l.apply(&mint).unwrap(), ActionOutcome::Unit);

        let lock = at(
            ALICE,
            2,
            T0,
            LedgerAction::CreateLock {
                amount: WAD,
                lock_duration: 4 * WEEK,
                recipient: ALICE,
            },
        );
        assert_eq!(l.apply(&lock).unwrap(), ActionOutcome::Minted(TokenId(1)));
        assert!(l.apply(&lock).is_err());

        assert_eq!(l.metrics.actions_applied.get(), 2);
        assert_eq!(l.metrics.actions_rejected.get(), 1);
        // One position point plus one global point.
        assert_eq!(l.metrics.checkpoints_written.get(), 2);
        assert!(l.check_invariants().is_ok());
    }

    #[test]
    fn rejected_action_keeps_state_hash() {
        let mut l = ledgers();
        let before = l.state_hash().unwrap();
        let harvest = at(ALICE, 1, T0, LedgerAction::Harvest { token: TokenId(1) });
        assert!(l.apply(&harvest).is_err());
        assert_eq!(l.state_hash().unwrap(), before);
    }

    #[test]
    fn trace_json_uses_snake_case_tags() {
        let trace = Trace {
            roles: RoleAuthorizer::new().with_role(Role::Strategy, STRATEGY),
            actions: vec![at(
                STRATEGY,
                1,
                T0,
                LedgerAction::NotifyRewardAmount { amount: 10 * WAD },
            )],
        };
        let json = serde_json::to_string(&trace).unwrap();
        assert!(json.contains("\"notify_reward_amount\""));
        let back: Trace = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trace);
    }
}
