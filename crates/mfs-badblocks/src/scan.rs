//! Active read probe of the medium.
//!
//! Blocks are read in batches of [`TEST_BUFFER_BLOCKS`]. A batch that comes
//! back short stops at the first unreadable block: the blocks before it are
//! good, that block is bad, and the probe resumes right after it.

use mfs_block::ByteDevice;
use mfs_error::{MfsError, Result};
use mfs_types::{BLOCK_SIZE, BlockNumber};
use tracing::{debug, warn};

use crate::BadBlocks;
use crate::progress::ScanProgress;

pub const TEST_BUFFER_BLOCKS: u32 = 16;

pub struct Scanner<'a, D: ByteDevice + ?Sized> {
    device: &'a D,
    zones: u32,
    progress: ScanProgress,
}

impl<'a, D: ByteDevice + ?Sized> Scanner<'a, D> {
    /// Probe blocks `0..zones` of `device`.
    pub fn new(device: &'a D, zones: u32) -> Self {
        Self {
            device,
            zones,
            progress: ScanProgress::new(u64::from(zones)),
        }
    }

    /// Shared cursor, for a [`crate::ProgressReporter`].
    #[must_use]
    pub fn progress(&self) -> &ScanProgress {
        &self.progress
    }

    /// Blocks of a batch that read back completely.
    fn readable_blocks(&self, start: u32, count: u32, buffer: &mut [u8]) -> u32 {
        let len = count as usize * BLOCK_SIZE;
        let got = match self
            .device
            .read_at(BlockNumber(start).byte_offset(), &mut buffer[..len])
        {
            Ok(got) => got,
            Err(err) => {
                debug!(target: "mfs::badblocks", event = "probe_read_error", start, count, error = %err);
                0
            }
        };
        if got % BLOCK_SIZE != 0 {
            debug!(target: "mfs::badblocks", event = "probe_partial_block", start, got);
        }
        u32::try_from(got / BLOCK_SIZE).map_or(count, |blocks| blocks.min(count))
    }

    /// Run the probe. `marker` sees each bad block as it is found.
    ///
    /// A bad block before `first_data_zone` cannot be worked around and
    /// aborts the scan.
    pub fn scan<F>(&self, first_data_zone: u32, mut marker: F) -> Result<BadBlocks>
    where
        F: FnMut(BlockNumber),
    {
        let mut buffer = vec![0_u8; TEST_BUFFER_BLOCKS as usize * BLOCK_SIZE];
        let mut bad = BadBlocks::new();
        let mut cursor = 0_u32;
        while cursor < self.zones {
            let want = TEST_BUFFER_BLOCKS.min(self.zones - cursor);
            let got = self.readable_blocks(cursor, want, &mut buffer);
            cursor += got;
            self.progress.advance_to(u64::from(cursor));
            if got == want {
                continue;
            }
            if cursor < first_data_zone {
                return Err(MfsError::BadBlockInMetadata {
                    block: u64::from(cursor),
                    first_data_zone: u64::from(first_data_zone),
                });
            }
            warn!(target: "mfs::badblocks", event = "bad_block", block = cursor);
            marker(BlockNumber(cursor));
            bad.insert(BlockNumber(cursor));
            cursor += 1;
            self.progress.advance_to(u64::from(cursor));
        }
        debug!(
            target: "mfs::badblocks",
            event = "scan_complete",
            zones = self.zones,
            bad = bad.len()
        );
        Ok(bad)
    }
}
