//! Underlying token custody.
//!
//! The escrow pulls the locked token from depositors and pushes it back on withdraw. Custody is an
//! external collaborator; its failures surface unchanged as [`crate::LedgerError::Token`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::AccountId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Insufficient funds for {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("Token balance overflow for {0}")]
    BalanceOverflow(AccountId),
}

/// Custody interface for the locked token.
///
/// Contract: a call either moves exactly `amount` or fails without side effects.
pub trait UnderlyingToken {
    /// Move `amount` from `from` into escrow custody.
    fn pull(&mut self, from: AccountId, amount: u128) -> Result<(), TokenError>;

    /// Move `amount` out of escrow custody to `to`.
    fn push(&mut self, to: AccountId, amount: u128) -> Result<(), TokenError>;
}

/// In-memory ledger of account balances plus the escrow's custody balance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryToken {
    balances: BTreeMap<AccountId, u128>,
    custody: u128,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, to: AccountId, amount: u128) -> Result<(), TokenError> {
        let bal = self.balances.entry(to).or_default();
        *bal = bal
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow(to))?;
        Ok(())
    }

    pub fn balance_of(&self, account: AccountId) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Tokens currently held by the escrow.
    pub fn custody(&self) -> u128 {
        self.custody
    }
}

impl UnderlyingToken for InMemoryToken {
    fn pull(&mut self, from: AccountId, amount: u128) -> Result<(), TokenError> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(TokenError::InsufficientFunds {
                account: from,
                needed: amount,
                available,
            });
        }
        let custody = self
            .custody
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow(from))?;

        // Commit.
        self.balances.insert(from, available - amount);
        self.custody = custody;
        Ok(())
    }

    fn push(&mut self, to: AccountId, amount: u128) -> Result<(), TokenError> {
        if self.custody < amount {
            return Err(TokenError::InsufficientFunds {
                account: to,
                needed: amount,
                available: self.custody,
            });
        }
        let new_bal = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::BalanceOverflow(to))?;

        // Commit.
        self.custody -= amount;
        self.balances.insert(to, new_bal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pull_and_push_move_custody() {
        let mut t = InMemoryToken::new();
        t.mint(AccountId(1), 100).unwrap();
        t.pull(AccountId(1), 60).unwrap();
        assert_eq!(t.balance_of(AccountId(1)), 40);
        assert_eq!(t.custody(), 60);

        t.push(AccountId(2), 60).unwrap();
        assert_eq!(t.balance_of(AccountId(2)), 60);
        assert_eq!(t.custody(), 0);
    }

    #[test]
    fn insufficient_funds_leaves_balances_untouched() {
        let mut t = InMemoryToken::new();
        t.mint(AccountId(1), 10).unwrap();
        let before = t.clone();
        let err = t.pull(AccountId(1), 11).unwrap_err();
        assert!(matches!(err, TokenError::InsufficientFunds { needed: 11, available: 10, .. }));
        assert_eq!(t, before);
    }
}
