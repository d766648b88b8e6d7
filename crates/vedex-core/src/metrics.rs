//! Ledger counters.
//!
//! Lock-free counters updated by the action rail (`rail::Ledgers::apply`) and exported as JSON by
//! the CLI.

use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Metric Types
// =============================================================================

/// A simple counter that can only increase.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Ledger Metrics Collection
// =============================================================================

#[derive(Debug, Default)]
pub struct LedgerMetrics {
    pub actions_applied: Counter,
    pub actions_rejected: Counter,
    /// New checkpoint entries (escrow position and global points, rewarder balances). Same-key
    /// overwrites are not counted.
    pub checkpoints_written: Counter,
    pub rewards_harvested: Counter,
}

impl LedgerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one action.
    pub fn record(&self, applied: bool, checkpoints: u64) {
        if applied {
            self.actions_applied.inc();
            self.checkpoints_written.inc_by(checkpoints);
        } else {
            self.actions_rejected.inc();
        }
    }

    /// Export metrics as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "counters": {
                "actions_applied": self.actions_applied.get(),
                "actions_rejected": self.actions_rejected.get(),
                "checkpoints_written": self.checkpoints_written.get(),
                "rewards_harvested": self.rewards_harvested.get(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_increments() {
        let c = Counter::new();
        c.inc();
        c.inc_by(4);
        assert_eq!(c.get(), 5);
    }

    #[test]
    fn rejected_actions_write_no_checkpoints() {
        let m = LedgerMetrics::new();
        m.record(true, 3);
        m.record(false, 7);
        assert_eq!(m.actions_applied.get(), 1);
        assert_eq!(m.actions_rejected.get(), 1);
        assert_eq!(m.checkpoints_written.get(), 3);
        assert_eq!(m.to_json()["counters"]["checkpoints_written"], 3);
    }
}
