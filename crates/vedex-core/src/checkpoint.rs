//! Append-only checkpoint history with binary-search lookup.
//!
//! Both ledgers store "balance as of key K" sequences: the escrow keys points by timestamp, the
//! rewarder keys balances by epoch start. Keys never decrease; writing at the current key
//! overwrites the last entry so at most one checkpoint exists per key.

use serde::{Deserialize, Serialize};

/// An entry that carries its own ordering key.
pub trait Keyed {
    fn key(&self) -> u64;
}

/// Append-only, key-non-decreasing checkpoint sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointIndex<T> {
    entries: Vec<T>,
}

impl<T> Default for CheckpointIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T: Keyed> CheckpointIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`, or overwrite the last entry when it has the same key.
    ///
    /// Preconditions:
    /// - `entry.key()` is not smaller than the last key (callers write at a monotone clock).
    pub fn write(&mut self, entry: T) {
        match self.entries.last_mut() {
            Some(last) if last.key() == entry.key() => *last = entry,
            last => {
                debug_assert!(
                    last.map_or(true, |l| l.key() < entry.key()),
                    "checkpoint keys must be non-decreasing"
                );
                self.entries.push(entry);
            }
        }
    }

    /// Entry with the greatest key `<= at`, if any.
    pub fn lookup(&self, at: u64) -> Option<&T> {
        let idx = self.entries.partition_point(|e| e.key() <= at);
        idx.checked_sub(1).map(|i| &self.entries[i])
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.last()
    }

    pub fn first(&self) -> Option<&T> {
        self.entries.first()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct At(u64, u32);

    impl Keyed for At {
        fn key(&self) -> u64 {
            self.0
        }
    }

    #[test]
    fn empty_index_has_no_entry() {
        let idx: CheckpointIndex<At> = CheckpointIndex::new();
        assert!(idx.lookup(0).is_none());
        assert!(idx.lookup(u64::MAX).is_none());
        assert!(idx.latest().is_none());
    }

    #[test]
    fn lookup_before_first_key_is_none() {
        let mut idx = CheckpointIndex::new();
        idx.write(At(10, 1));
        assert!(idx.lookup(9).is_none());
        assert_eq!(idx.lookup(10), Some(&At(10, 1)));
        assert_eq!(idx.lookup(11), Some(&At(10, 1)));
    }

    #[test]
    fn same_key_overwrites_last_entry() {
        let mut idx = CheckpointIndex::new();
        idx.write(At(5, 1));
        idx.write(At(7, 2));
        idx.write(At(7, 3));
        assert_eq!(idx.len(), 2);
        assert_eq!(idx.lookup(7), Some(&At(7, 3)));
        assert_eq!(idx.lookup(6), Some(&At(5, 1)));
    }

    proptest! {
        #[test]
        fn lookup_matches_linear_scan(
            mut keys in proptest::collection::vec(0u64..1_000, 0..64),
            q in 0u64..1_100,
        ) {
            keys.sort_unstable();
            let mut idx = CheckpointIndex::new();
            for (i, k) in keys.iter().enumerate() {
                idx.write(At(*k, i as u32));
            }
            let expected = keys
                .iter()
                .enumerate()
                .filter(|(_, k)| **k <= q)
                .last()
                .map(|(i, k)| At(*k, i as u32));
            prop_assert_eq!(idx.lookup(q).copied(), expected);
        }
    }
}
