//! Logical block addressing tiers.

use mfs_error::{MfsError, Result};
use mfs_types::DIRECT_ZONES;

/// Where logical block `index` of a file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Zone slot `0..7` of the inode.
    Direct(usize),
    /// Entry of the single-indirect block.
    Indirect(u32),
    /// Entry `inner` of the leaf named by entry `outer` of the
    /// double-indirect block.
    DoubleIndirect { outer: u32, inner: u32 },
}

impl Tier {
    /// Classify `index` for pointer blocks holding `ptrs` entries each.
    #[expect(clippy::cast_possible_truncation)]
    pub fn locate(index: u64, ptrs: u32) -> Result<Self> {
        let n = u64::from(ptrs);
        let direct = u64::from(DIRECT_ZONES);
        if index < direct {
            return Ok(Self::Direct(index as usize));
        }
        let rel = index - direct;
        if rel < n {
            return Ok(Self::Indirect(rel as u32));
        }
        let rel = rel - n;
        if rel < n * n {
            return Ok(Self::DoubleIndirect {
                outer: (rel / n) as u32,
                inner: (rel % n) as u32,
            });
        }
        Err(MfsError::FileTooLarge {
            index,
            max: direct + n + n * n,
        })
    }
}
