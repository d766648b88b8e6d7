//! vedex core: checkpointed balance ledgers for a vote-escrow DEX.
//!
//! Two ledgers share one checkpoint primitive:
//! - [`escrow::VotingEscrow`]: decaying / permanent lock positions, global voting power
//!   history, merges, and managed (delegated) aggregation.
//! - [`rewards::VirtualRewarder`]: epoch-bucketed deposit history with retroactive pro-rata
//!   reward accounting.
//!
//! Design goals:
//! - IO-free core (pure state machines); hosts provide the clock, token custody and roles
//! - Every mutator is all-or-nothing: fallible work first, then an infallible commit
//! - Deterministic arithmetic (checked integer math, floor division, 256-bit intermediates)

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod auth;
pub mod checkpoint;
pub mod collaborators;
pub mod config;
pub mod escrow;
pub mod hash;
pub mod math;
pub mod metrics;
pub mod rail;
pub mod rewards;
pub mod token;

pub use auth::{AllowAllAuthorizer, Authorizer, DenyAllAuthorizer, Ownership, Role, RoleAuthorizer};
pub use checkpoint::{CheckpointIndex, Keyed};
pub use config::LedgerConfig;
pub use escrow::{LockedBalance, Point, VotingEscrow, VotingMode};
pub use rewards::VirtualRewarder;
pub use token::{InMemoryToken, TokenError, UnderlyingToken};

/// 32-byte hash newtype used for state commitments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Opaque account handle assigned by the host (wallet, contract, module).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

/// Identifier of a lock position (the escrow NFT id). Ids start at 1 and are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "acct:{}", self.0)
    }
}

/// Block coordinates observed by a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: Timestamp,
}

/// Caller and clock for a single state transition.
///
/// Contract: hosts feed contexts in non-decreasing `(number, timestamp)` order; ledgers reject
/// regressions with [`LedgerError::ClockRegression`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    pub caller: AccountId,
    pub block: BlockInfo,
}

impl TxContext {
    pub fn new(caller: AccountId, number: u64, timestamp: Timestamp) -> Self {
        Self {
            caller,
            block: BlockInfo { number, timestamp },
        }
    }

    pub fn now(&self) -> Timestamp {
        self.block.timestamp
    }
}

/// Ledger error taxonomy. Each variant is a distinct, machine-checkable failure kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // Input validation errors
    #[error("Amount must be greater than zero")]
    ValueZero,

    #[error("Invalid lock duration: unlock time {unlock_time} outside ({now}, {max_unlock}]")]
    InvalidLockDuration {
        unlock_time: Timestamp,
        now: Timestamp,
        max_unlock: Timestamp,
    },

    #[error("Array length mismatch: {left} != {right}")]
    ArraysLengthMismatch { left: usize, right: usize },

    #[error("Total locked supply would exceed cap {cap}")]
    SupplyCapExceeded { cap: u128 },

    #[error("Clock regression: block {got:?} is older than last observed {last:?}")]
    ClockRegression { last: BlockInfo, got: BlockInfo },

    // State precondition errors
    #[error("Token {0} does not exist")]
    NonexistentToken(TokenId),

    #[error("Token {0} lock has expired")]
    TokenExpired(TokenId),

    #[error("Token {0} lock has not expired")]
    TokenNoExpired(TokenId),

    #[error("Token {0} is permanently locked")]
    PermanentLocked(TokenId),

    #[error("Token {0} is not permanently locked")]
    NotPermanentLocked(TokenId),

    #[error("Token {0} has active votes")]
    TokenVoted(TokenId),

    #[error("Token {0} is attached to a managed position")]
    TokenAttached(TokenId),

    #[error("Token {token} is not attached to managed position {managed}")]
    TokenNotAttached { token: TokenId, managed: TokenId },

    #[error("Managed position {0} cannot be transferred")]
    ManagedNftTransferDisabled(TokenId),

    #[error("Token {0} is not a managed position")]
    NotManagedNft(TokenId),

    #[error("Token {0} is a managed position")]
    NotNormalNft(TokenId),

    #[error("Cannot merge token {0} into itself")]
    MergeTokenIdsTheSame(TokenId),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    #[error("Returned amount {requested} exceeds managed balance {available}")]
    ManagedBalanceExceeded { requested: u128, available: u128 },

    // Authorization errors
    #[error("Access denied for {caller}")]
    AccessDenied { caller: AccountId },

    // Collaborator errors
    #[error(transparent)]
    Token(#[from] TokenError),

    // Arithmetic errors
    #[error("Arithmetic overflow: {0}")]
    Overflow(&'static str),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violated: {0}")]
    InvariantViolated(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Trace replay error: {0}")]
    Replay(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
