//! Layout planning.
//!
//! ```text
//! block 0          boot block (first 512 bytes zeroed)
//! block 1          superblock
//! block 2..        inode bitmap   (imap_blocks)
//!                  zone bitmap    (zmap_blocks)
//!                  inode table    (inode_table_blocks)
//! first_data_zone  data zones up to `blocks`
//! ```
//!
//! The zone bitmap must cover every data zone plus the reserved bit 0, but
//! its own size changes how many data zones remain, so it is found by fixed
//! point iteration.

use mfs_error::{MfsError, Result};
use mfs_ondisk::Superblock;
use mfs_types::{
    BITS_PER_BLOCK, BlockNumber, FsVersion, INODE_BITMAP_START, MAX_INODES, MIN_BLOCKS,
    MinixFormat, V1_MAX_BLOCKS,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bitmap::Bitmap;

const MAX_ZMAP_ITERATIONS: u32 = 1000;

/// The resolved layout of an image. Zones and blocks coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub format: MinixFormat,
    pub blocks: u32,
    pub inodes: u32,
    pub imap_blocks: u32,
    pub zmap_blocks: u32,
    pub inode_table_blocks: u32,
    pub first_data_zone: u32,
}

/// Plan the layout for a device of `blocks` blocks.
///
/// `requested_inodes == 0` selects one inode per three blocks.
pub fn plan_layout(blocks: u64, requested_inodes: u32, format: MinixFormat) -> Result<Geometry> {
    if blocks < u64::from(MIN_BLOCKS) {
        return Err(MfsError::ImageTooSmall {
            blocks,
            min: u64::from(MIN_BLOCKS),
        });
    }
    let max_blocks = match format.version {
        FsVersion::V1 => V1_MAX_BLOCKS,
        FsVersion::V2 => u32::MAX,
    };
    let blocks = u32::try_from(blocks.min(u64::from(max_blocks))).unwrap_or(max_blocks);

    let per_block = format.inodes_per_block();
    let wanted = if requested_inodes == 0 {
        blocks / 3
    } else {
        requested_inodes
    };
    let rounded = u64::from(wanted).div_ceil(u64::from(per_block)) * u64::from(per_block);
    let inodes = u32::try_from(rounded.min(u64::from(MAX_INODES))).unwrap_or(MAX_INODES);
    if inodes == 0 {
        return Err(MfsError::InvalidGeometry(
            "inode count rounds to zero".to_owned(),
        ));
    }

    let bits = u64::from(BITS_PER_BLOCK);
    let imap_blocks = (u64::from(inodes) + 1).div_ceil(bits);
    let inode_table_blocks = u64::from(inodes).div_ceil(u64::from(per_block));
    let fixed = 2 + imap_blocks + inode_table_blocks;
    let total = u64::from(blocks);

    let zmap_for = |zmap: u64| -> Option<u64> {
        let metadata = fixed + zmap;
        (metadata < total).then(|| (total - metadata + 1).div_ceil(bits))
    };

    let mut zmap_blocks = 0_u64;
    let mut converged = false;
    for _ in 0..MAX_ZMAP_ITERATIONS {
        let Some(next) = zmap_for(zmap_blocks) else {
            return Err(MfsError::InvalidGeometry(format!(
                "{inodes} inodes leave no data zones in {blocks} blocks"
            )));
        };
        if next == zmap_blocks {
            converged = true;
            break;
        }
        zmap_blocks = next;
    }
    if !converged {
        return Err(MfsError::InvalidGeometry(format!(
            "filesystem geometry does not converge for {blocks} blocks and {inodes} inodes"
        )));
    }

    let first_data_zone = fixed + zmap_blocks;
    let narrow = |value: u64, what: &str| -> Result<u32> {
        u16::try_from(value).map(u32::from).map_err(|_| {
            MfsError::InvalidGeometry(format!("{what} {value} does not fit the superblock"))
        })
    };
    let geometry = Geometry {
        format,
        blocks,
        inodes,
        imap_blocks: narrow(imap_blocks, "inode bitmap size")?,
        zmap_blocks: narrow(zmap_blocks, "zone bitmap size")?,
        inode_table_blocks: u32::try_from(inode_table_blocks).map_err(|_| {
            MfsError::InvalidGeometry("inode table size overflows".to_owned())
        })?,
        first_data_zone: narrow(first_data_zone, "first data zone")?,
    };
    debug!(
        target: "mfs::alloc",
        event = "layout_planned",
        blocks,
        inodes,
        imap_blocks = geometry.imap_blocks,
        zmap_blocks = geometry.zmap_blocks,
        first_data_zone = geometry.first_data_zone,
    );
    Ok(geometry)
}

impl Geometry {
    #[must_use]
    pub fn zones(&self) -> u32 {
        self.blocks
    }

    #[must_use]
    pub fn data_zones(&self) -> u32 {
        self.blocks - self.first_data_zone
    }

    #[must_use]
    pub fn inode_bitmap_start(&self) -> BlockNumber {
        INODE_BITMAP_START
    }

    #[must_use]
    pub fn zone_bitmap_start(&self) -> BlockNumber {
        BlockNumber(INODE_BITMAP_START.0 + self.imap_blocks)
    }

    #[must_use]
    pub fn inode_table_start(&self) -> BlockNumber {
        BlockNumber(INODE_BITMAP_START.0 + self.imap_blocks + self.zmap_blocks)
    }

    /// Zone-bitmap bit tracking `zone`.
    #[must_use]
    pub fn zone_bit(&self, zone: u32) -> u32 {
        zone - self.first_data_zone + 1
    }

    #[must_use]
    pub fn is_data_zone(&self, zone: u32) -> bool {
        zone >= self.first_data_zone && zone < self.blocks
    }

    /// Superblock for this layout with the state left clear.
    #[must_use]
    #[expect(clippy::cast_possible_truncation)]
    pub fn superblock(&self) -> Superblock {
        // plan_layout bounds every u16 field.
        Superblock {
            ninodes: self.inodes as u16,
            zones: self.blocks,
            imap_blocks: self.imap_blocks as u16,
            zmap_blocks: self.zmap_blocks as u16,
            first_data_zone: self.first_data_zone as u16,
            log_zone_size: 0,
            max_size: self.format.max_file_size(),
            magic: self.format.magic(),
            state: 0,
        }
    }

    /// Every inode free except the reserved bit 0.
    #[must_use]
    pub fn inode_bitmap(&self) -> Bitmap {
        let mut map = Bitmap::all_set(self.imap_blocks);
        map.clear_range(1..self.inodes + 1);
        map
    }

    /// Every data zone free except the reserved bit 0.
    #[must_use]
    pub fn zone_bitmap(&self) -> Bitmap {
        let mut map = Bitmap::all_set(self.zmap_blocks);
        map.clear_range(1..self.data_zones() + 1);
        map
    }
}
