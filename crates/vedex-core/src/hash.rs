use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::escrow::EscrowState;
use crate::rewards::RewarderState;
use crate::{Hash32, LedgerError, Result};

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    Hash32(bytes)
}

/// Domain separation tag for escrow state commitments.
pub const ESCROW_STATE_DOMAIN_V1: &[u8] = b"VEDEX_ESCROW_STATE_V1";

/// Domain separation tag for rewarder state commitments.
pub const REWARDER_STATE_DOMAIN_V1: &[u8] = b"VEDEX_REWARDER_STATE_V1";

/// Domain separation tag for combined simulation state (escrow, rewarder, custody).
pub const LEDGERS_STATE_DOMAIN_V1: &[u8] = b"VEDEX_LEDGERS_STATE_V1";

/// Canonical preimage bytes. `bincode` over `BTreeMap`-backed state is deterministic.
pub fn canonical_bytes<S: Serialize + ?Sized>(value: &S) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| LedgerError::Serialization(e.to_string()))
}

pub fn hash_escrow_state(state: &EscrowState) -> Result<Hash32> {
    Ok(sha256_domain(ESCROW_STATE_DOMAIN_V1, &canonical_bytes(state)?))
}

pub fn hash_rewarder_state(state: &RewarderState) -> Result<Hash32> {
    Ok(sha256_domain(REWARDER_STATE_DOMAIN_V1, &canonical_bytes(state)?))
}
