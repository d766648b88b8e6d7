#![no_main]

use libfuzzer_sys::fuzz_target;
use vedex_core::config::WEEK;
use vedex_core::rail::{first_invariant_counterexample, LedgerAction, TimedAction};
use vedex_core::{AccountId, LedgerConfig, Role, RoleAuthorizer, TokenId, TxContext};

const MAX_ACTIONS: usize = 96;
const WAD: u128 = 1_000_000_000_000_000_000;
const START_TS: u64 = 2_800 * WEEK;

const VOTER: AccountId = AccountId(90);
const MANAGER: AccountId = AccountId(91);
const STRATEGY: AccountId = AccountId(92);

struct Cursor<'a> {
    bytes: &'a [u8],
    index: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, index: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.index.checked_add(n)?;
        if end > self.bytes.len() {
            return None;
        }
        let out = &self.bytes[self.index..end];
        self.index = end;
        Some(out)
    }

    fn take_u8(&mut self) -> Option<u8> {
        Some(*self.take(1)?.first()?)
    }

    fn take_u64_le(&mut self) -> Option<u64> {
        let s = self.take(8)?;
        let mut out = [0u8; 8];
        out.copy_from_slice(s);
        Some(u64::from_le_bytes(out))
    }

    fn take_u128_le(&mut self) -> Option<u128> {
        let s = self.take(16)?;
        let mut out = [0u8; 16];
        out.copy_from_slice(s);
        Some(u128::from_le_bytes(out))
    }

    fn account(&mut self) -> Option<AccountId> {
        Some(AccountId(u64::from(self.take_u8()? % 4) + 1))
    }

    fn token(&mut self) -> Option<TokenId> {
        Some(TokenId(u64::from(self.take_u8()? % 16) + 1))
    }

    /// Mostly small WAD multiples, occasionally a raw amount to probe bounds.
    fn amount(&mut self) -> Option<u128> {
        match self.take_u8()? {
            0 => self.take_u128_le(),
            b => Some(u128::from(b) * WAD / 8),
        }
    }
}

fn decode_action(c: &mut Cursor<'_>) -> Option<(AccountId, LedgerAction)> {
    let user = c.account()?;
    let action = match c.take_u8()? % 18 {
        0 => LedgerAction::MintUnderlying {
            to: user,
            amount: c.amount()?,
        },
        1 => LedgerAction::CreateLock {
            amount: c.amount()?,
            lock_duration: c.take_u64_le()? % (30 * WEEK),
            recipient: user,
        },
        2 => LedgerAction::CreatePermanentLock {
            amount: c.amount()?,
            recipient: user,
        },
        3 => LedgerAction::DepositFor {
            token: c.token()?,
            amount: c.amount()?,
        },
        4 => LedgerAction::IncreaseUnlockTime {
            token: c.token()?,
            lock_duration: c.take_u64_le()? % (30 * WEEK),
        },
        5 => LedgerAction::Withdraw { token: c.token()? },
        6 => LedgerAction::Merge {
            from: c.token()?,
            to: c.token()?,
        },
        7 => LedgerAction::LockPermanent { token: c.token()? },
        8 => LedgerAction::UnlockPermanent { token: c.token()? },
        9 => LedgerAction::TransferFrom {
            from: user,
            to: c.account()?,
            token: c.token()?,
        },
        10 => LedgerAction::SetApprovalForAll {
            operator: c.account()?,
            approved: c.take_u8()? & 1 == 1,
        },
        11 => {
            return Some((
                VOTER,
                LedgerAction::VotingHook {
                    token: c.token()?,
                    voted: c.take_u8()? & 1 == 1,
                },
            ))
        }
        12 => return Some((MANAGER, LedgerAction::CreateManagedNft { recipient: MANAGER })),
        13 => {
            return Some((
                MANAGER,
                LedgerAction::AttachToManaged {
                    token: c.token()?,
                    managed: c.token()?,
                },
            ))
        }
        14 => {
            return Some((
                MANAGER,
                LedgerAction::DetachFromManaged {
                    token: c.token()?,
                    managed: c.token()?,
                    returned_amount: c.amount()?,
                },
            ))
        }
        15 => {
            return Some((
                STRATEGY,
                LedgerAction::RewardDeposit {
                    token: c.token()?,
                    amount: c.amount()?,
                },
            ))
        }
        16 => {
            return Some((
                STRATEGY,
                LedgerAction::NotifyRewardAmount {
                    amount: c.amount()?,
                },
            ))
        }
        _ => return Some((STRATEGY, LedgerAction::Harvest { token: c.token()? })),
    };
    Some((user, action))
}

fuzz_target!(|data: &[u8]| {
    let mut c = Cursor::new(data);
    let roles = RoleAuthorizer::new()
        .with_role(Role::Voter, VOTER)
        .with_role(Role::ManagedNftManager, MANAGER)
        .with_role(Role::Strategy, STRATEGY);

    let mut actions = Vec::new();
    let mut block = 0u64;
    let mut now = START_TS;
    while actions.len() < MAX_ACTIONS {
        // Clock step: mostly forward, occasionally backwards to exercise regression checks.
        let Some(step) = c.take_u8() else { break };
        if step == 0xff {
            block = block.saturating_sub(1);
            now = now.saturating_sub(86_400);
        } else {
            block += 1;
            now += u64::from(step) * 3_600;
        }
        let Some((caller, action)) = decode_action(&mut c) else { break };
        actions.push(TimedAction::new(TxContext::new(caller, block, now), action));
    }

    let ce = first_invariant_counterexample(&LedgerConfig::default(), &roles, &actions)
        .expect("ledgers build with default config");
    if let Some(ce) = ce {
        panic!("{}: {}", ce.short(), ce.violation.details);
    }
});
