//! End-to-end tests across the escrow, the managed-position hooks and the virtual rewarder.

use vedex_core::collaborators::{ManagedNftHooks, VotingPowerSource};
use vedex_core::config::{DEFAULT_MAX_LOCK_TIME, WEEK};
use vedex_core::math::{round_to_epoch, WAD};
use vedex_core::{
    AccountId, InMemoryToken, LedgerConfig, LockedBalance, Role, RoleAuthorizer, TokenId,
    TxContext, VirtualRewarder, VotingEscrow,
};

const USER_A: AccountId = AccountId(1);
const MANAGER: AccountId = AccountId(91);
const STRATEGY: AccountId = AccountId(92);
const T0: u64 = 100 * WEEK + 1234;

fn roles() -> RoleAuthorizer {
    RoleAuthorizer::new()
        .with_role(Role::ManagedNftManager, MANAGER)
        .with_role(Role::Strategy, STRATEGY)
}

fn escrow() -> VotingEscrow<RoleAuthorizer, InMemoryToken> {
    let mut token = InMemoryToken::new();
    token.mint(USER_A, 1_000 * WAD).unwrap();
    VotingEscrow::new(LedgerConfig::default(), roles(), token).unwrap()
}

#[test]
fn attach_reward_and_detach() {
    let mut ve = escrow();
    let mut rewarder = VirtualRewarder::new(LedgerConfig::default(), roles()).unwrap();

    // Lock 100 tokens for the maximum duration.
    let id = ve
        .create_lock(&TxContext::new(USER_A, 1, T0), 100 * WAD, DEFAULT_MAX_LOCK_TIME, USER_A)
        .unwrap();
    assert_eq!(id, TokenId(1));
    let managed = ve
        .create_managed_nft(&TxContext::new(MANAGER, 1, T0), MANAGER)
        .unwrap();

    // Attach three days later.
    let t1 = T0 + 3 * 86_400;
    let pre = ve.balance_of_nft_at(id, t1);
    let total_before = ve.voting_power_total_supply(t1);
    assert!(pre > 0 && pre < 100 * WAD);

    let ctx = TxContext::new(MANAGER, 2, t1);
    let weight = ManagedNftHooks::on_attach_to_managed_nft(&mut ve, &ctx, id, managed).unwrap();
    assert_eq!(weight, pre);
    assert_eq!(ve.balance_of_nft_at(id, t1), 0);
    assert_eq!(ve.balance_of_nft_at(managed, t1), pre);
    assert_eq!(ve.permanent_total_supply(), pre);
    assert_eq!(ve.voting_power_total_supply(t1), total_before);
    assert_eq!(ve.supply(), 100 * WAD);

    // The manager's reward strategy mirrors the delegated weight into the rewarder.
    let strat = |number, ts| TxContext::new(STRATEGY, number, ts);
    rewarder.deposit(&strat(2, t1), id, weight).unwrap();
    rewarder.notify_reward_amount(&strat(3, t1 + 60), 10 * WAD).unwrap();

    // Managed power is flat while delegated.
    let t2 = t1 + WEEK;
    assert_eq!(VotingPowerSource::balance_of_nft_ignore_ownership_change(&ve, managed, t2), pre);
    assert_eq!(rewarder.harvest(&strat(4, t2), id).unwrap(), 10 * WAD);
    assert_eq!(rewarder.harvest(&strat(5, t2 + 1), id).unwrap(), 0);

    // Detach with half of the weight returned.
    let returned = pre / 2;
    ve.on_detach_from_managed_nft(&TxContext::new(MANAGER, 6, t2), id, managed, returned)
        .unwrap();
    rewarder.withdraw(&strat(6, t2 + 1), id, weight).unwrap();

    let end = round_to_epoch(t2 + DEFAULT_MAX_LOCK_TIME, WEEK);
    assert_eq!(ve.locked(id), Some(LockedBalance::decaying(returned, end)));
    assert_eq!(ve.locked(managed), Some(LockedBalance::permanent(pre - returned)));
    assert_eq!(ve.permanent_total_supply(), pre - returned);
    assert!(ve.position(id).is_some_and(|p| !p.is_attached()));

    let slope = returned / u128::from(DEFAULT_MAX_LOCK_TIME);
    assert_eq!(ve.balance_of_nft_at(id, t2), slope * u128::from(end - t2));
    assert_eq!(
        ve.voting_power_total_supply(t2),
        ve.balance_of_nft_at(id, t2) + ve.balance_of_nft_at(managed, t2)
    );
    assert_eq!(rewarder.balance_of(id), 0);
    assert_eq!(rewarder.total_supply(), 0);
}

#[test]
fn detached_lock_withdraws_after_expiry() {
    let mut ve = escrow();
    let id = ve
        .create_permanent_lock(&TxContext::new(USER_A, 1, T0), 40 * WAD, USER_A)
        .unwrap();
    let managed = ve
        .create_managed_nft(&TxContext::new(MANAGER, 2, T0), MANAGER)
        .unwrap();
    ve.on_attach_to_managed_nft(&TxContext::new(MANAGER, 3, T0 + 10), id, managed)
        .unwrap();
    ve.on_detach_from_managed_nft(&TxContext::new(MANAGER, 4, T0 + 20), id, managed, 40 * WAD)
        .unwrap();

    let end = ve.locked(id).map(|l| l.end()).unwrap();
    let early = TxContext::new(USER_A, 5, end - 1);
    assert!(ve.withdraw(&early, id).is_err());

    let returned = ve.withdraw(&TxContext::new(USER_A, 6, end), id).unwrap();
    assert_eq!(returned, 40 * WAD);
    assert_eq!(ve.token().balance_of(USER_A), 1_000 * WAD);
    assert_eq!(ve.supply(), 0);
    assert!(ve.owner_of(id).is_err());
}

#[test]
fn historical_queries_survive_later_activity() {
    let mut ve = escrow();
    let a = ve
        .create_lock(&TxContext::new(USER_A, 1, T0), 10 * WAD, 20 * WEEK, USER_A)
        .unwrap();
    let past = T0 + 2 * WEEK;
    let snapshot = (ve.balance_of_nft_at(a, past), ve.total_supply_at(past));

    let b = ve
        .create_lock(&TxContext::new(USER_A, 2, T0 + 3 * WEEK), 5 * WAD, 10 * WEEK, USER_A)
        .unwrap();
    ve.deposit_for(&TxContext::new(USER_A, 3, T0 + 4 * WEEK), a, WAD)
        .unwrap();
    ve.merge(&TxContext::new(USER_A, 4, T0 + 5 * WEEK), b, a).unwrap();

    assert_eq!((ve.balance_of_nft_at(a, past), ve.total_supply_at(past)), snapshot);
    assert_eq!(ve.supply(), 16 * WAD);
}
