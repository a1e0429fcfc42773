#![forbid(unsafe_code)]
//! Bad-block discovery.
//!
//! Bad blocks come from one of two places: an active read probe of the
//! medium ([`Scanner`]) or a list of block numbers produced by another tool
//! ([`load_bad_block_list`]). Either way every bad block is reported to a
//! marker callback as soon as it is known, so the caller can flag it in the
//! zone bitmap, and is collected into a sorted [`BadBlocks`] set.

pub mod list;
pub mod progress;
pub mod scan;

pub use list::{load_bad_block_list, parse_bad_block_list};
pub use progress::{ProgressReporter, ScanProgress};
pub use scan::{Scanner, TEST_BUFFER_BLOCKS};

use mfs_types::BlockNumber;
use serde::{Deserialize, Serialize};

/// Sorted, duplicate-free set of unreadable blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadBlocks {
    blocks: Vec<u32>,
}

impl BadBlocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the block was already recorded.
    pub fn insert(&mut self, block: BlockNumber) -> bool {
        match self.blocks.binary_search(&block.0) {
            Ok(_) => false,
            Err(pos) => {
                self.blocks.insert(pos, block.0);
                true
            }
        }
    }

    #[must_use]
    pub fn contains(&self, block: BlockNumber) -> bool {
        self.blocks.binary_search(&block.0).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = BlockNumber> + '_ {
        self.blocks.iter().copied().map(BlockNumber)
    }

    /// `"one bad block"`, `"N bad blocks"`, or nothing for a clean medium.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        match self.blocks.len() {
            0 => None,
            1 => Some("one bad block".to_owned()),
            n => Some(format!("{n} bad blocks")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_dedups() {
        let mut bad = BadBlocks::new();
        assert!(bad.insert(BlockNumber(40)));
        assert!(bad.insert(BlockNumber(25)));
        assert!(!bad.insert(BlockNumber(40)));
        assert_eq!(bad.iter().collect::<Vec<_>>(), vec![BlockNumber(25), BlockNumber(40)]);
        assert!(bad.contains(BlockNumber(25)));
        assert!(!bad.contains(BlockNumber(26)));
    }

    #[test]
    fn summary_wording() {
        let mut bad = BadBlocks::new();
        assert_eq!(bad.summary(), None);
        bad.insert(BlockNumber(30));
        assert_eq!(bad.summary().as_deref(), Some("one bad block"));
        bad.insert(BlockNumber(31));
        assert_eq!(bad.summary().as_deref(), Some("2 bad blocks"));
    }
}
