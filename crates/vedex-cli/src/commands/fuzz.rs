//! Random trace generation and invariant fuzzing.

use anyhow::{Context, Result};
use tracing::info;

use vedex_core::config::WEEK;
use vedex_core::rail::{
    first_invariant_counterexample, minimize_counterexample, ActionOutcome, LedgerAction, Ledgers,
    TimedAction, Trace,
};
use vedex_core::{AccountId, LedgerConfig, Role, RoleAuthorizer, TokenId, TxContext};

const WAD: u128 = 1_000_000_000_000_000_000;

pub const VOTER: AccountId = AccountId(90);
pub const MANAGER: AccountId = AccountId(91);
pub const STRATEGY: AccountId = AccountId(92);

/// First timestamp of every generated trace (epoch-aligned plus an offset).
const START_TS: u64 = 2_800 * WEEK + 3_600;

#[derive(Clone, Copy)]
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        // Avoid the all-zero state.
        Self(if seed == 0 {
            0x9E37_79B9_7F4A_7C15
        } else {
            seed
        })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn gen_range(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.next_u64() % upper
    }

    fn gen_bool(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> Option<T> {
        if items.is_empty() {
            return None;
        }
        Some(items[self.gen_range(items.len() as u64) as usize])
    }
}

pub fn default_roles() -> RoleAuthorizer {
    RoleAuthorizer::new()
        .with_role(Role::Voter, VOTER)
        .with_role(Role::ManagedNftManager, MANAGER)
        .with_role(Role::Strategy, STRATEGY)
}

fn user(i: u64) -> AccountId {
    AccountId(i + 1)
}

/// Generate a random, mostly-valid action trace.
///
/// The generator mirrors the trace into live ledgers so it can pick existing positions and their
/// owners as callers; rejected actions are kept (they must not mutate state).
pub fn generate_trace(
    config: &LedgerConfig,
    seed: u64,
    steps: u32,
    accounts: u32,
) -> Result<Trace> {
    let roles = default_roles();
    let mut ledgers = Ledgers::new(config.clone(), roles.clone())?;
    let mut rng = XorShift64::new(seed);
    let accounts = u64::from(accounts.max(1));
    let max_epochs = (config.max_lock_time_secs / config.epoch_length_secs).max(1);

    let mut actions: Vec<TimedAction> = Vec::new();
    let mut positions: Vec<TokenId> = Vec::new();
    let mut managed: Vec<TokenId> = Vec::new();
    let mut block = 1u64;
    let mut now = START_TS;

    // Bootstrap: fund users so locks are reachable.
    for i in 0..accounts {
        let to = user(i);
        push(
            &mut ledgers,
            &mut actions,
            TxContext::new(to, block, now),
            LedgerAction::MintUnderlying {
                to,
                amount: 1_000 * WAD,
            },
        );
    }

    for _ in 0..steps {
        block += 1;
        now += rng.gen_range(3 * 86_400);

        let amount = u128::from(rng.gen_range(20) + 1) * WAD / 2;
        let token = rng.pick(&positions);
        let owner = token.and_then(|t| ledgers.escrow.owner_of(t).ok());
        let someone = user(rng.gen_range(accounts));
        let caller = owner.unwrap_or(someone);

        // Pick an action kind.
        let (caller, action) = match rng.gen_range(18) {
            0 | 1 => (
                someone,
                LedgerAction::CreateLock {
                    amount,
                    lock_duration: (rng.gen_range(max_epochs) + 1) * config.epoch_length_secs,
                    recipient: someone,
                },
            ),
            2 => (
                someone,
                LedgerAction::CreatePermanentLock {
                    amount,
                    recipient: someone,
                },
            ),
            3 => {
                let Some(token) = token else { continue };
                (someone, LedgerAction::DepositFor { token, amount })
            }
            4 => {
                let Some(token) = token else { continue };
                (
                    caller,
                    LedgerAction::IncreaseUnlockTime {
                        token,
                        lock_duration: max_epochs * config.epoch_length_secs,
                    },
                )
            }
            5 => {
                let Some(token) = token else { continue };
                (caller, LedgerAction::Withdraw { token })
            }
            6 => {
                let Some(from) = token else { continue };
                let Some(to) = rng.pick(&positions) else { continue };
                (caller, LedgerAction::Merge { from, to })
            }
            7 => {
                let Some(token) = token else { continue };
                (caller, LedgerAction::LockPermanent { token })
            }
            8 => {
                let Some(token) = token else { continue };
                (caller, LedgerAction::UnlockPermanent { token })
            }
            9 => {
                let (Some(token), Some(from)) = (token, owner) else { continue };
                (
                    from,
                    LedgerAction::TransferFrom {
                        from,
                        to: someone,
                        token,
                    },
                )
            }
            10 => {
                let Some(token) = token else { continue };
                (
                    VOTER,
                    LedgerAction::VotingHook {
                        token,
                        voted: rng.gen_bool(),
                    },
                )
            }
            11 => {
                if managed.len() >= 2 {
                    continue;
                }
                (MANAGER, LedgerAction::CreateManagedNft { recipient: MANAGER })
            }
            12 => {
                let (Some(token), Some(target)) = (token, rng.pick(&managed)) else { continue };
                (
                    MANAGER,
                    LedgerAction::AttachToManaged {
                        token,
                        managed: target,
                    },
                )
            }
            13 => {
                let Some(token) = token else { continue };
                let Some(target) = ledgers.escrow.position(token).and_then(|p| p.attached_to)
                else {
                    continue;
                };
                let available = ledgers.escrow.locked(target).map_or(0, |l| l.amount);
                (
                    MANAGER,
                    LedgerAction::DetachFromManaged {
                        token,
                        managed: target,
                        returned_amount: available / (u128::from(rng.gen_range(3)) + 1),
                    },
                )
            }
            14 => {
                let Some(token) = token else { continue };
                (STRATEGY, LedgerAction::RewardDeposit { token, amount })
            }
            15 => {
                let Some(token) = token else { continue };
                let balance = ledgers.rewarder.balance_of(token);
                (
                    STRATEGY,
                    LedgerAction::RewardWithdraw {
                        token,
                        amount: balance / 2 + 1,
                    },
                )
            }
            16 => (STRATEGY, LedgerAction::NotifyRewardAmount { amount }),
            _ => {
                let Some(token) = token else { continue };
                (STRATEGY, LedgerAction::Harvest { token })
            }
        };

        let created_managed = matches!(action, LedgerAction::CreateManagedNft { .. });
        if let Some(ActionOutcome::Minted(id)) =
            push(&mut ledgers, &mut actions, TxContext::new(caller, block, now), action)
        {
            if created_managed {
                managed.push(id);
            } else {
                positions.push(id);
            }
        }
    }

    Ok(Trace { roles, actions })
}

/// Apply `action` to the mirror ledgers and record it in the trace.
fn push(
    ledgers: &mut Ledgers,
    actions: &mut Vec<TimedAction>,
    ctx: TxContext,
    action: LedgerAction,
) -> Option<ActionOutcome> {
    let timed = TimedAction::new(ctx, action);
    let out = ledgers.apply(&timed).ok();
    actions.push(timed);
    out
}

pub fn run(config: &LedgerConfig, seed: u64, steps: u32, iters: u32, accounts: u32) -> Result<()> {
    let roles = default_roles();

    for i in 0..iters {
        let run_seed = seed ^ (0x9E37_79B9_7F4A_7C15u64.wrapping_mul(u64::from(i) + 1));
        let trace = generate_trace(config, run_seed, steps, accounts)?;

        let Some(ce) = first_invariant_counterexample(config, &roles, &trace.actions)
            .context("Failed to run invariant check")?
        else {
            info!(iter = i, seed = run_seed, "trace clean");
            continue;
        };

        let min = minimize_counterexample(config, &roles, &ce)
            .context("Failed to minimize invariant counterexample")?;

        println!("{}", min.short());
        println!("  {}", min.violation.details);
        println!();
        println!("Minimal trace ({} actions):", min.actions.len());
        for (idx, a) in min.actions.iter().enumerate() {
            println!("  {:03}: {:?}", idx, a);
        }
        return Ok(());
    }

    println!("No invariant violations found (iters={iters}, steps={steps}, accounts={accounts}).");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_is_deterministic() {
        let config = LedgerConfig::default();
        let a = generate_trace(&config, 7, 60, 3).unwrap();
        let b = generate_trace(&config, 7, 60, 3).unwrap();
        assert_eq!(a, b);
        assert!(a.actions.len() >= 3);
    }

    #[test]
    fn random_traces_have_no_counterexample() {
        let config = LedgerConfig::default();
        for seed in 1..=4 {
            let trace = generate_trace(&config, seed, 150, 3).unwrap();
            let ce = first_invariant_counterexample(&config, &trace.roles, &trace.actions).unwrap();
            assert!(ce.is_none(), "seed {seed}: {:?}", ce.map(|c| c.short()));
        }
    }
}
