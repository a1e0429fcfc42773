//! Final flush of the metadata area.

use mfs_alloc::{Allocator, Geometry};
use mfs_block::BlockDevice;
use mfs_error::Result;
use mfs_inode::InodeTable;
use mfs_types::{BOOT_SECTOR_SIZE, BlockNumber, SUPERBLOCK_BLOCK};
use tracing::debug;

use crate::parse_error_to_mfs;

/// Put the planned superblock on disk with the state left clear.
///
/// Runs before the first content write, so an aborted build over an older
/// image never leaves that image's superblock claiming a clean volume.
pub fn write_unfinished_superblock<D: BlockDevice + ?Sized>(
    dev: &D,
    geometry: &Geometry,
) -> Result<()> {
    let encoded = geometry
        .superblock()
        .to_block()
        .map_err(|e| parse_error_to_mfs(&e))?;
    dev.write_block(SUPERBLOCK_BLOCK, &encoded)?;
    dev.sync()?;
    debug!(target: "mfs::core", event = "superblock_invalidated");
    Ok(())
}

/// Write the superblock, both bitmaps and the inode table, then sync.
///
/// The first 512 bytes of block 0 are cleared so stale boot code cannot be
/// mistaken for a bootable volume; the rest of block 0 is left alone. The
/// superblock goes out marked clean.
pub fn write_tables<D: BlockDevice + ?Sized>(
    dev: &D,
    geometry: &Geometry,
    alloc: &Allocator,
    inodes: &InodeTable,
) -> Result<()> {
    let mut boot = dev.read_block(BlockNumber(0))?;
    boot.as_mut_slice()[..BOOT_SECTOR_SIZE].fill(0);
    dev.write_block(BlockNumber(0), boot.as_slice())?;

    let mut superblock = geometry.superblock();
    superblock.mark_valid();
    let encoded = superblock.to_block().map_err(|e| parse_error_to_mfs(&e))?;
    dev.write_block(SUPERBLOCK_BLOCK, &encoded)?;

    dev.write_blocks(geometry.inode_bitmap_start(), alloc.inode_map().as_bytes())?;
    dev.write_blocks(geometry.zone_bitmap_start(), alloc.zone_map().as_bytes())?;
    dev.write_blocks(
        geometry.inode_table_start(),
        &inodes.encode(geometry.inode_table_blocks)?,
    )?;
    dev.sync()?;

    debug!(
        target: "mfs::core",
        event = "tables_written",
        imap_blocks = geometry.imap_blocks,
        zmap_blocks = geometry.zmap_blocks,
        inode_table_blocks = geometry.inode_table_blocks
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs_alloc::plan_layout;
    use mfs_block::{ByteBlockDevice, MemByteDevice};
    use mfs_ondisk::Superblock;
    use mfs_types::{BLOCK_SIZE, FsVersion, MINIX_VALID_FS, MinixFormat, NameLen, ROOT_INO};

    #[test]
    fn tables_land_at_planned_offsets() {
        let format = MinixFormat::new(FsVersion::V1, NameLen::Short14);
        let geo = plan_layout(1440, 0, format).expect("plan");
        let mut image = vec![0xAA_u8; 1440 * BLOCK_SIZE];
        image[600] = 0x55;
        let dev = ByteBlockDevice::new(MemByteDevice::from_bytes(image)).expect("dev");
        let mut alloc = Allocator::new(geo);
        alloc.mark_inode(ROOT_INO);
        let mut inodes = InodeTable::new(format, geo.inodes);
        inodes.get_mut(ROOT_INO).expect("root").nlinks = 2;

        write_tables(&dev, &geo, &alloc, &inodes).expect("write");

        let bytes = dev.inner().snapshot();
        assert!(bytes[..BOOT_SECTOR_SIZE].iter().all(|&b| b == 0));
        assert_eq!(bytes[600], 0x55);

        let sb = Superblock::parse_from_bytes(&bytes[BLOCK_SIZE..2 * BLOCK_SIZE]).expect("sb");
        assert_eq!(sb.magic, 0x137F);
        assert_eq!(sb.state, MINIX_VALID_FS);
        assert_eq!(sb.first_data_zone, 19);

        // bits 0 (reserved) and 1 (root) set, 2 clear
        assert_eq!(bytes[2 * BLOCK_SIZE] & 0b111, 0b011);
        // inode bits past the inode count stay set
        let past = 2 * BLOCK_SIZE + 481 / 8;
        assert_ne!(bytes[past] & (1 << (481 % 8)), 0);
        // zone bitmap: only the reserved bit inside the data area
        assert_eq!(bytes[3 * BLOCK_SIZE] & 0b11, 0b01);

        let table = geo.inode_table_start().0 as usize * BLOCK_SIZE;
        assert_eq!(bytes[table + 0x0D], 2);
    }

    #[test]
    fn unfinished_superblock_replaces_a_clean_one() {
        let format = MinixFormat::new(FsVersion::V2, NameLen::Long30);
        let geo = plan_layout(600, 0, format).expect("plan");
        let dev = ByteBlockDevice::new(MemByteDevice::new(600 * BLOCK_SIZE)).expect("dev");
        let mut old = geo.superblock();
        old.mark_valid();
        dev.write_block(SUPERBLOCK_BLOCK, &old.to_block().expect("encode"))
            .expect("seed");

        write_unfinished_superblock(&dev, &geo).expect("invalidate");

        let raw = dev.read_block(SUPERBLOCK_BLOCK).expect("read");
        let sb = Superblock::parse_from_bytes(raw.as_slice()).expect("sb");
        assert!(!sb.is_valid());
        assert_eq!(sb.zones, geo.blocks);
        assert_eq!(u32::from(sb.first_data_zone), geo.first_data_zone);
    }
}
