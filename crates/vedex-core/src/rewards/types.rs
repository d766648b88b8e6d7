use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointIndex, Keyed};
use crate::{Timestamp, TokenId};

/// Balance as of the end of an epoch (keyed by epoch start).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCheckpoint {
    pub epoch: Timestamp,
    pub amount: u128,
}

impl Keyed for BalanceCheckpoint {
    fn key(&self) -> u64 {
        self.epoch
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub balance: u128,
    pub checkpoints: CheckpointIndex<BalanceCheckpoint>,
    /// Epoch of the last harvest; `None` until the first one.
    pub last_earn_epoch: Option<Timestamp>,
}

impl TokenInfo {
    /// Number of balance checkpoints written for this position.
    pub fn last_checkpoint_index(&self) -> usize {
        self.checkpoints.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewarderEvent {
    Deposit {
        token: TokenId,
        amount: u128,
        epoch: Timestamp,
    },
    Withdraw {
        token: TokenId,
        amount: u128,
        epoch: Timestamp,
    },
    NotifyReward {
        amount: u128,
        epoch: Timestamp,
    },
    Harvest {
        token: TokenId,
        reward: u128,
        epoch: Timestamp,
    },
}
