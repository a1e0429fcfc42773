#![forbid(unsafe_code)]
//! Inode and zone allocation for a fresh Minix image.
//!
//! ## Design
//!
//! The allocator is layered:
//!
//! 1. **Bitmap**: raw bit manipulation on the inode and zone maps.
//! 2. **Geometry**: the planned layout and the initial maps it implies.
//! 3. **Allocator**: forward-only cursors handing out inodes and zones.
//! 4. **GoodBlocks**: zones reserved for metadata while bad blocks are
//!    still being recorded, marked in bulk afterwards.
//!
//! Nothing is ever freed. A new image is filled front to back, so each
//! cursor only moves forward and never revisits a bit it has passed.

pub mod bitmap;
pub mod geometry;

pub use bitmap::Bitmap;
pub use geometry::{Geometry, plan_layout};

use mfs_error::{MfsError, Result};
use mfs_types::{BlockNumber, InodeNumber};
use tracing::trace;

/// Most zones the good-blocks table can hold.
pub const MAX_GOOD_BLOCKS: usize = 512;

// ── Allocator ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Allocator {
    geometry: Geometry,
    inode_map: Bitmap,
    zone_map: Bitmap,
    last_inode: u32,
    last_zone: u32,
}

impl Allocator {
    #[must_use]
    pub fn new(geometry: Geometry) -> Self {
        Self {
            inode_map: geometry.inode_bitmap(),
            zone_map: geometry.zone_bitmap(),
            geometry,
            last_inode: 0,
            last_zone: 0,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[must_use]
    pub fn inode_map(&self) -> &Bitmap {
        &self.inode_map
    }

    #[must_use]
    pub fn zone_map(&self) -> &Bitmap {
        &self.zone_map
    }

    /// Next free inode after the last one handed out.
    pub fn allocate_inode(&mut self) -> Result<InodeNumber> {
        let start = self.last_inode + 1;
        let found = self
            .inode_map
            .find_clear(start..self.geometry.inodes + 1)
            .ok_or(MfsError::NoFreeInodes)?;
        self.inode_map.set(found);
        self.last_inode = found;
        trace!(target: "mfs::alloc", event = "inode_allocated", ino = found);
        Ok(InodeNumber(found))
    }

    /// Next free data zone after the last one handed out.
    pub fn allocate_zone(&mut self) -> Result<BlockNumber> {
        let start = self.last_zone.max(self.geometry.first_data_zone - 1) + 1;
        let zone = (start..self.geometry.blocks)
            .find(|&zone| !self.zone_in_use(zone))
            .ok_or(MfsError::NoFreeZones)?;
        self.mark_zone(zone);
        self.last_zone = zone;
        trace!(target: "mfs::alloc", event = "zone_allocated", zone);
        Ok(BlockNumber(zone))
    }

    /// Metadata zones always read as in use.
    #[must_use]
    pub fn zone_in_use(&self, zone: u32) -> bool {
        !self.geometry.is_data_zone(zone) || self.zone_map.get(self.geometry.zone_bit(zone))
    }

    /// Ignored for zones outside the data area.
    pub fn mark_zone(&mut self, zone: u32) {
        if self.geometry.is_data_zone(zone) {
            self.zone_map.set(self.geometry.zone_bit(zone));
        }
    }

    #[must_use]
    pub fn inode_in_use(&self, ino: InodeNumber) -> bool {
        self.inode_map.get(ino.0)
    }

    pub fn mark_inode(&mut self, ino: InodeNumber) {
        if ino.0 != 0 && ino.0 <= self.geometry.inodes {
            self.inode_map.set(ino.0);
        }
    }

    /// The first in-use data zone strictly after `after`. Passing 0 starts
    /// at the first data zone.
    #[must_use]
    pub fn next_marked_zone(&self, after: u32) -> Option<BlockNumber> {
        let start = after.max(self.geometry.first_data_zone - 1) + 1;
        (start..self.geometry.blocks)
            .find(|&zone| self.zone_in_use(zone))
            .map(BlockNumber)
    }

    /// Allocated inodes, not counting the reserved bit.
    #[must_use]
    pub fn used_inodes(&self) -> u32 {
        self.inode_map.count_set(self.geometry.inodes + 1) - 1
    }

    /// In-use data zones, not counting the reserved bit.
    #[must_use]
    pub fn used_zones(&self) -> u32 {
        self.zone_map.count_set(self.geometry.data_zones() + 1) - 1
    }
}

// ── Good-blocks table ───────────────────────────────────────────────────────

/// Zones set aside for the root directory and the bad-block inode's pointer
/// blocks.
///
/// While bad blocks are being gathered the zone map marks only bad zones,
/// so zones taken here are recorded without marking. [`GoodBlocks::mark_all`]
/// commits them once the bad-block inode is complete.
#[derive(Debug, Clone, Default)]
pub struct GoodBlocks {
    zones: Vec<u32>,
}

impl GoodBlocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First zone not in use after the last one taken.
    pub fn take_free_zone(&mut self, alloc: &Allocator) -> Result<BlockNumber> {
        if self.zones.len() >= MAX_GOOD_BLOCKS {
            return Err(MfsError::TooManyBadBlocks);
        }
        let geometry = alloc.geometry();
        let start = self
            .zones
            .last()
            .map_or(geometry.first_data_zone, |&last| last + 1);
        let zone = (start..geometry.blocks)
            .find(|&zone| !alloc.zone_in_use(zone))
            .ok_or(MfsError::NoFreeZones)?;
        self.zones.push(zone);
        trace!(target: "mfs::alloc", event = "good_block_taken", zone);
        Ok(BlockNumber(zone))
    }

    #[must_use]
    pub fn zones(&self) -> &[u32] {
        &self.zones
    }

    pub fn mark_all(&self, alloc: &mut Allocator) {
        for &zone in &self.zones {
            alloc.mark_zone(zone);
        }
    }
}
