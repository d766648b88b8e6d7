//! Authorization hooks for ledger state transitions.
//!
//! Ledgers call the injected [`Authorizer`] before mutating state. Position-level checks
//! (`can_mutate`) receive the ownership record so implementations stay IO-free; privileged
//! collaborator entry points are gated by [`Role`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::AccountId;

/// Privileged collaborator roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Weight aggregator allowed to flip `is_voted` through the voting hook.
    Voter,
    /// Managed-position manager allowed to create, attach to and detach from aggregators.
    ManagedNftManager,
    /// Reward strategy allowed to mutate the virtual rewarder.
    Strategy,
}

/// Ownership view of a single position, as seen by the authorizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ownership {
    pub owner: AccountId,
    pub approved: Option<AccountId>,
    /// `caller` is an operator approved for all of `owner`'s positions.
    pub operator_approved: bool,
}

pub trait Authorizer {
    /// Whether `caller` may mutate the position described by `ownership`.
    fn can_mutate(&self, caller: AccountId, ownership: &Ownership) -> bool;

    /// Whether `caller` holds `role`.
    fn has_role(&self, caller: AccountId, role: Role) -> bool;
}

/// Owner / approved / operator semantics with an explicit role table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAuthorizer {
    grants: BTreeSet<(Role, AccountId)>,
}

impl RoleAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Role, account: AccountId) -> Self {
        self.grant(role, account);
        self
    }

    pub fn grant(&mut self, role: Role, account: AccountId) {
        self.grants.insert((role, account));
    }

    pub fn revoke(&mut self, role: Role, account: AccountId) {
        self.grants.remove(&(role, account));
    }
}

impl Authorizer for RoleAuthorizer {
    fn can_mutate(&self, caller: AccountId, ownership: &Ownership) -> bool {
        caller == ownership.owner
            || ownership.approved == Some(caller)
            || ownership.operator_approved
    }

    fn has_role(&self, caller: AccountId, role: Role) -> bool {
        self.grants.contains(&(role, caller))
    }
}

/// Authorizer that allows everything (useful for simulation/tests).
pub struct AllowAllAuthorizer;

impl Authorizer for AllowAllAuthorizer {
    fn can_mutate(&self, _caller: AccountId, _ownership: &Ownership) -> bool {
        true
    }

    fn has_role(&self, _caller: AccountId, _role: Role) -> bool {
        true
    }
}

/// Authorizer that denies everything (useful for tests).
pub struct DenyAllAuthorizer;

impl Authorizer for DenyAllAuthorizer {
    fn can_mutate(&self, _caller: AccountId, _ownership: &Ownership) -> bool {
        false
    }

    fn has_role(&self, _caller: AccountId, _role: Role) -> bool {
        false
    }
}
