//! Property tests: random action traces never produce an invariant counterexample.

use proptest::prelude::*;

use vedex_core::config::WEEK;
use vedex_core::math::WAD;
use vedex_core::rail::{first_invariant_counterexample, LedgerAction, TimedAction};
use vedex_core::{AccountId, LedgerConfig, Role, RoleAuthorizer, TokenId, TxContext};

const VOTER: AccountId = AccountId(90);
const MANAGER: AccountId = AccountId(91);
const STRATEGY: AccountId = AccountId(92);
const START_TS: u64 = 2_000 * WEEK + 600;

fn roles() -> RoleAuthorizer {
    RoleAuthorizer::new()
        .with_role(Role::Voter, VOTER)
        .with_role(Role::ManagedNftManager, MANAGER)
        .with_role(Role::Strategy, STRATEGY)
}

// =============================================================================
// Trace construction
// =============================================================================

/// Raw step: `(kind, account, token, other token, amount, clock advance in hours)`.
type Step = (u8, u64, u64, u64, u64, u16);

fn step() -> impl Strategy<Value = Step> {
    (0u8..20, 1u64..=3, 1u64..=8, 1u64..=8, 1u64..=40, 0u16..=96)
}

fn decode(
    kind: u8,
    who: AccountId,
    a: TokenId,
    b: TokenId,
    amount: u128,
) -> (AccountId, LedgerAction) {
    match kind {
        0 | 1 => (
            who,
            LedgerAction::CreateLock {
                amount,
                lock_duration: u64::from(kind + 1) * 8 * WEEK,
                recipient: who,
            },
        ),
        2 => (who, LedgerAction::CreatePermanentLock { amount, recipient: who }),
        3 => (who, LedgerAction::DepositFor { token: a, amount }),
        4 => (
            who,
            LedgerAction::IncreaseUnlockTime {
                token: a,
                lock_duration: 26 * WEEK,
            },
        ),
        5 => (who, LedgerAction::Withdraw { token: a }),
        6 => (who, LedgerAction::Merge { from: a, to: b }),
        7 => (who, LedgerAction::LockPermanent { token: a }),
        8 => (who, LedgerAction::UnlockPermanent { token: a }),
        9 => (
            who,
            LedgerAction::TransferFrom {
                from: who,
                to: AccountId(who.0 % 3 + 1),
                token: a,
            },
        ),
        10 => (VOTER, LedgerAction::VotingHook { token: a, voted: b.0 % 2 == 0 }),
        11 => (MANAGER, LedgerAction::CreateManagedNft { recipient: MANAGER }),
        12 => (MANAGER, LedgerAction::AttachToManaged { token: a, managed: b }),
        13 => (
            MANAGER,
            LedgerAction::DetachFromManaged {
                token: a,
                managed: b,
                returned_amount: amount / 4,
            },
        ),
        14 => (STRATEGY, LedgerAction::RewardDeposit { token: a, amount }),
        15 => (STRATEGY, LedgerAction::RewardWithdraw { token: a, amount: amount / 2 }),
        16 => (STRATEGY, LedgerAction::NotifyRewardAmount { amount }),
        17 => (
            who,
            LedgerAction::DepositForBatch {
                tokens: vec![a, b],
                amounts: vec![amount, amount / 2],
            },
        ),
        _ => (STRATEGY, LedgerAction::Harvest { token: a }),
    }
}

fn build_trace(steps: &[Step]) -> Vec<TimedAction> {
    let mut actions = Vec::with_capacity(steps.len() + 3);
    let mut now = START_TS;

    for i in 1..=3 {
        let to = AccountId(i);
        actions.push(TimedAction::new(
            TxContext::new(to, i, now),
            LedgerAction::MintUnderlying { to, amount: 500 * WAD },
        ));
    }

    for (i, &(kind, who, a, b, amount, hours)) in steps.iter().enumerate() {
        now += u64::from(hours) * 3_600;
        let (caller, action) = decode(
            kind,
            AccountId(who),
            TokenId(a),
            TokenId(b),
            u128::from(amount) * WAD / 4,
        );
        actions.push(TimedAction::new(
            TxContext::new(caller, i as u64 + 4, now),
            action,
        ));
    }
    actions
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_traces_hold_every_invariant(steps in prop::collection::vec(step(), 1..80)) {
        let actions = build_trace(&steps);
        let ce = first_invariant_counterexample(&LedgerConfig::default(), &roles(), &actions)
            .unwrap();
        prop_assert!(ce.is_none(), "{:?}", ce.map(|c| (c.short(), c.violation.details)));
    }

    #[test]
    fn traces_survive_long_idle_gaps(
        steps in prop::collection::vec(step(), 1..30),
        gap_weeks in 1u64..60,
    ) {
        let mut actions = build_trace(&steps);
        // Jump far ahead so decaying locks expire and slope changes replay across empty weeks.
        let last = actions.last().map(|a| a.ctx.block).unwrap();
        let later = last.timestamp + gap_weeks * WEEK;
        for (i, token) in (1..=8).map(TokenId).enumerate() {
            actions.push(TimedAction::new(
                TxContext::new(AccountId(1 + (i as u64 % 3)), last.number + 1 + i as u64, later),
                LedgerAction::Withdraw { token },
            ));
        }
        let ce = first_invariant_counterexample(&LedgerConfig::default(), &roles(), &actions)
            .unwrap();
        prop_assert!(ce.is_none(), "{:?}", ce.map(|c| (c.short(), c.violation.details)));
    }
}
