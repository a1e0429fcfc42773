//! Reading a finished image back.

use mfs_alloc::Bitmap;
use mfs_block::{BlockDevice, ByteBlockDevice, FileByteDevice};
use mfs_dir::read_dir;
use mfs_error::{MfsError, Result};
use mfs_inode::{InodeTable, map_block, referenced_zones};
use mfs_ondisk::{DirEntry, Inode, Superblock};
use mfs_types::{
    BAD_INO, BLOCK_SIZE, BlockNumber, FsVersion, INODE_BITMAP_START, InodeNumber, MinixFormat,
    ROOT_INO, SUPERBLOCK_BLOCK,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use crate::parse_error_to_mfs;

/// Headline facts about an image, as printed by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub version: FsVersion,
    pub name_len: usize,
    pub magic: u16,
    pub inodes: u32,
    pub zones: u32,
    pub imap_blocks: u32,
    pub zmap_blocks: u32,
    pub first_data_zone: u32,
    pub max_size: u32,
    pub clean: bool,
    pub used_inodes: u32,
    pub used_zones: u32,
    pub bad_blocks: u32,
    pub root_entries: Vec<String>,
}

/// A Minix image opened for reading.
pub struct Image<D: BlockDevice> {
    dev: D,
    superblock: Superblock,
    format: MinixFormat,
    inodes: InodeTable,
    inode_map: Bitmap,
    zone_map: Bitmap,
}

impl<D: BlockDevice> std::fmt::Debug for Image<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("superblock", &self.superblock)
            .field("block_count", &self.dev.block_count())
            .finish_non_exhaustive()
    }
}

impl Image<ByteBlockDevice<FileByteDevice>> {
    /// Open an image file or block device read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let dev = ByteBlockDevice::new(FileByteDevice::open_read_only(path)?)?;
        Self::from_device(dev)
    }
}

fn read_region<D: BlockDevice>(dev: &D, start: u32, blocks: u32) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(blocks as usize * BLOCK_SIZE);
    for block in start..start + blocks {
        out.extend_from_slice(dev.read_block(BlockNumber(block))?.as_slice());
    }
    Ok(out)
}

impl<D: BlockDevice> Image<D> {
    /// Parse and cross-check the superblock, then load the bitmaps and the
    /// inode table.
    pub fn from_device(dev: D) -> Result<Self> {
        if dev.block_count() <= SUPERBLOCK_BLOCK.0 {
            return Err(MfsError::ImageTooSmall {
                blocks: u64::from(dev.block_count()),
                min: u64::from(SUPERBLOCK_BLOCK.0 + 1),
            });
        }
        let raw = dev.read_block(SUPERBLOCK_BLOCK)?;
        let superblock =
            Superblock::parse_from_bytes(raw.as_slice()).map_err(|e| parse_error_to_mfs(&e))?;
        let format = superblock.format().map_err(|e| parse_error_to_mfs(&e))?;

        let inodes = u32::from(superblock.ninodes);
        let imap = u32::from(superblock.imap_blocks);
        let zmap = u32::from(superblock.zmap_blocks);
        let table_blocks = inodes.div_ceil(format.inodes_per_block());
        let first = u32::from(superblock.first_data_zone);
        if INODE_BITMAP_START.0 + imap + zmap + table_blocks != first {
            return Err(MfsError::Corruption {
                block: u64::from(SUPERBLOCK_BLOCK.0),
                detail: format!(
                    "first data zone {first} does not follow {imap}+{zmap} bitmap and {table_blocks} inode table blocks"
                ),
            });
        }
        if superblock.zones > dev.block_count() || first >= superblock.zones {
            return Err(MfsError::Corruption {
                block: u64::from(SUPERBLOCK_BLOCK.0),
                detail: format!(
                    "{} zones with first data zone {first} on a {}-block device",
                    superblock.zones,
                    dev.block_count()
                ),
            });
        }

        let inode_map = Bitmap::from_bytes(read_region(&dev, INODE_BITMAP_START.0, imap)?);
        let zone_map = Bitmap::from_bytes(read_region(&dev, INODE_BITMAP_START.0 + imap, zmap)?);
        let table = read_region(&dev, INODE_BITMAP_START.0 + imap + zmap, table_blocks)?;
        let inodes = InodeTable::decode(&table, format, inodes)?;

        debug!(
            target: "mfs::reader",
            event = "image_opened",
            magic = superblock.magic,
            ninodes = superblock.ninodes,
            zones = superblock.zones
        );
        Ok(Self {
            dev,
            superblock,
            format,
            inodes,
            inode_map,
            zone_map,
        })
    }

    #[must_use]
    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    #[must_use]
    pub fn format(&self) -> MinixFormat {
        self.format
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn inode(&self, ino: InodeNumber) -> Result<&Inode> {
        self.inodes.get(ino)
    }

    #[must_use]
    pub fn inode_in_use(&self, ino: InodeNumber) -> bool {
        self.inode_map.get(ino.0)
    }

    /// Whether the zone map marks `zone`. Metadata zones read as in use.
    #[must_use]
    pub fn zone_in_use(&self, zone: u32) -> bool {
        let first = u32::from(self.superblock.first_data_zone);
        zone < first || self.zone_map.get(zone - first + 1)
    }

    pub fn list_dir(&self, ino: InodeNumber) -> Result<Vec<DirEntry>> {
        read_dir(&self.dev, self.format, self.inode(ino)?)
    }

    /// Walk `/`-separated components from the root.
    pub fn lookup(&self, path: &str) -> Result<Option<InodeNumber>> {
        let mut ino = ROOT_INO;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let found = self
                .list_dir(ino)?
                .into_iter()
                .find(|entry| entry.name == component.as_bytes());
            match found {
                Some(entry) => ino = InodeNumber(u32::from(entry.inode)),
                None => return Ok(None),
            }
        }
        Ok(Some(ino))
    }

    /// Full content of a regular file or symlink target. Holes read as
    /// zeros; device inodes have no content.
    pub fn read_file(&self, ino: InodeNumber) -> Result<Vec<u8>> {
        let inode = self.inode(ino)?;
        if inode.is_device() {
            return Ok(Vec::new());
        }
        let size = inode.size as usize;
        let mut out = vec![0_u8; size];
        for (index, chunk) in out.chunks_mut(BLOCK_SIZE).enumerate() {
            if let Some(zone) = map_block(&self.dev, self.format, inode, index as u64)? {
                let block = self.dev.read_block(zone)?;
                chunk.copy_from_slice(&block.as_slice()[..chunk.len()]);
            }
        }
        Ok(out)
    }

    /// Every zone reachable from an allocated inode, pointer blocks
    /// included.
    pub fn referenced_zones(&self) -> Result<BTreeSet<u32>> {
        let mut zones = BTreeSet::new();
        for (_, inode) in self.inodes.iter_allocated() {
            // zone 0 of a device inode holds its device number
            if inode.is_device() {
                continue;
            }
            zones.extend(referenced_zones(&self.dev, self.format, inode)?);
        }
        Ok(zones)
    }

    /// Data zones the zone map marks in use.
    #[must_use]
    pub fn marked_zones(&self) -> BTreeSet<u32> {
        let first = u32::from(self.superblock.first_data_zone);
        (first..self.superblock.zones)
            .filter(|&zone| self.zone_in_use(zone))
            .collect()
    }

    /// The zone map must mark exactly the zones some inode references.
    pub fn verify_zone_map(&self) -> Result<()> {
        let referenced = self.referenced_zones()?;
        let marked = self.marked_zones();
        if let Some(zone) = referenced.symmetric_difference(&marked).next() {
            let detail = if marked.contains(zone) {
                format!("zone {zone} is marked but unreferenced")
            } else {
                format!("zone {zone} is referenced but not marked")
            };
            return Err(MfsError::Corruption {
                block: u64::from(*zone),
                detail,
            });
        }
        Ok(())
    }

    pub fn summary(&self) -> Result<ImageSummary> {
        let sb = &self.superblock;
        let inodes = u32::from(sb.ninodes);
        let data_zones = sb.zones - u32::from(sb.first_data_zone);
        let root_entries = self
            .list_dir(ROOT_INO)?
            .iter()
            .map(DirEntry::name_str)
            .collect();
        Ok(ImageSummary {
            version: self.format.version,
            name_len: self.format.name_len.get(),
            magic: sb.magic,
            inodes,
            zones: sb.zones,
            imap_blocks: u32::from(sb.imap_blocks),
            zmap_blocks: u32::from(sb.zmap_blocks),
            first_data_zone: u32::from(sb.first_data_zone),
            max_size: sb.max_size,
            clean: sb.is_valid(),
            used_inodes: self.inode_map.count_set(inodes + 1).saturating_sub(1),
            used_zones: self.zone_map.count_set(data_zones + 1).saturating_sub(1),
            bad_blocks: self.inode(BAD_INO)?.size / BLOCK_SIZE as u32,
            root_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs_block::MemByteDevice;

    #[test]
    fn rejects_non_minix_superblock() {
        let dev = ByteBlockDevice::new(MemByteDevice::new(64 * BLOCK_SIZE)).expect("dev");
        let err = Image::from_device(dev).expect_err("no magic");
        assert!(matches!(err, MfsError::Format(_)));
    }

    #[test]
    fn rejects_inconsistent_layout() {
        let mut bytes = vec![0_u8; 64 * BLOCK_SIZE];
        let sb = Superblock {
            ninodes: 32,
            zones: 64,
            imap_blocks: 1,
            zmap_blocks: 1,
            first_data_zone: 9,
            log_zone_size: 0,
            max_size: 0x7fff_ffff,
            magic: 0x2478,
            state: 1,
        };
        // 32 v2 inodes need 2 table blocks, so the first zone should be 6
        bytes[BLOCK_SIZE..2 * BLOCK_SIZE].copy_from_slice(&sb.to_block().expect("encode"));
        let dev = ByteBlockDevice::new(MemByteDevice::from_bytes(bytes)).expect("dev");
        assert!(matches!(
            Image::from_device(dev),
            Err(MfsError::Corruption { block: 1, .. })
        ));
    }

    #[test]
    fn tiny_device_is_rejected() {
        let dev = ByteBlockDevice::new(MemByteDevice::new(BLOCK_SIZE)).expect("dev");
        assert!(matches!(
            Image::from_device(dev),
            Err(MfsError::ImageTooSmall { .. })
        ));
    }
}
