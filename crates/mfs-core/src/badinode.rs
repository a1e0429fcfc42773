//! The bad-block inode (#2).
//!
//! Every bad zone becomes one logical block of a regular file nobody can
//! open, which keeps the zones referenced and out of reach of any later
//! allocation. The pointer blocks it needs come from the good-blocks table.

use mfs_block::BlockDevice;
use mfs_error::{MfsError, Result};
use mfs_inode::place_zone;
use mfs_types::{BAD_INO, BLOCK_SIZE, S_IFREG};
use tracing::debug;

use crate::context::BuildContext;

pub fn make_bad_inode<D: BlockDevice + ?Sized>(ctx: &mut BuildContext<'_, D>) -> Result<()> {
    let format = ctx.format();
    let BuildContext {
        dev,
        alloc,
        inodes,
        good,
        bad,
        timestamp,
        ..
    } = ctx;

    alloc.mark_inode(BAD_INO);
    let inode = inodes.get_mut(BAD_INO)?;
    inode.mode = S_IFREG;
    inode.nlinks = 1;
    inode.set_times(*timestamp);
    if bad.is_empty() {
        return Ok(());
    }

    // Only bad zones are marked in the zone map until the good blocks are
    // committed, so walking the map visits exactly the bad list.
    let mut index = 0_u64;
    let mut cursor = 0_u32;
    while let Some(zone) = alloc.next_marked_zone(cursor) {
        place_zone(*dev, format, inode, index, zone, || good.take_free_zone(alloc)).map_err(
            |e| match e {
                MfsError::FileTooLarge { .. } => MfsError::TooManyBadBlocks,
                other => other,
            },
        )?;
        index += 1;
        cursor = zone.0;
    }
    inode.size = u32::try_from(index * BLOCK_SIZE as u64).map_err(|_| MfsError::TooManyBadBlocks)?;

    debug!(
        target: "mfs::core",
        event = "bad_inode_built",
        zones = index,
        good_blocks = good.zones().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::RootOwner;
    use crate::root::make_root_inode;
    use mfs_alloc::plan_layout;
    use mfs_block::{ByteBlockDevice, MemByteDevice};
    use mfs_inode::{map_block, referenced_zones};
    use mfs_types::{BlockNumber, DOUBLE_INDIRECT_SLOT, FsVersion, INDIRECT_SLOT, MinixFormat, NameLen};

    fn context_with_bad(
        dev: &ByteBlockDevice<MemByteDevice>,
        blocks: u32,
        bad: impl IntoIterator<Item = u32>,
    ) -> BuildContext<'_, ByteBlockDevice<MemByteDevice>> {
        let format = MinixFormat::new(FsVersion::V1, NameLen::Long30);
        let geo = plan_layout(u64::from(blocks), 0, format).expect("plan");
        let mut ctx = BuildContext::new(dev, geo, 42, RootOwner::default());
        for block in bad {
            ctx.alloc.mark_zone(block);
            ctx.bad.insert(BlockNumber(block));
        }
        ctx
    }

    #[test]
    fn clean_medium_still_allocates_inode_two() {
        let dev = ByteBlockDevice::new(MemByteDevice::new(1440 * BLOCK_SIZE)).expect("dev");
        let mut ctx = context_with_bad(&dev, 1440, []);
        make_bad_inode(&mut ctx).expect("bad inode");
        let inode = ctx.inodes.get(BAD_INO).expect("ino");
        assert_eq!((inode.mode, inode.nlinks, inode.size), (S_IFREG, 1, 0));
        assert_eq!(inode.mtime, 42);
        assert!(ctx.alloc.inode_in_use(BAD_INO));
        assert!(ctx.good.zones().is_empty());
    }

    #[test]
    fn bad_zones_are_chained_in_order() {
        let dev = ByteBlockDevice::new(MemByteDevice::new(1440 * BLOCK_SIZE)).expect("dev");
        let bad: Vec<u32> = (100..110).collect();
        let mut ctx = context_with_bad(&dev, 1440, bad.clone());
        make_root_inode(&mut ctx).expect("root");
        make_bad_inode(&mut ctx).expect("bad inode");

        let format = ctx.format();
        let inode = ctx.inodes.get(BAD_INO).expect("ino").clone();
        assert_eq!(inode.size, 10 * 1024);
        for (index, zone) in bad.iter().enumerate() {
            assert_eq!(
                map_block(&dev, format, &inode, index as u64).expect("map"),
                Some(BlockNumber(*zone))
            );
        }
        // root zone plus the single-indirect block
        assert_eq!(ctx.good.zones().len(), 2);
        assert_eq!(inode.zones[INDIRECT_SLOT], ctx.good.zones()[1]);
        assert_eq!(inode.zones[DOUBLE_INDIRECT_SLOT], 0);

        ctx.good.mark_all(&mut ctx.alloc);
        for zone in referenced_zones(&dev, format, &inode).expect("zones") {
            assert!(ctx.alloc.zone_in_use(zone));
        }
    }

    #[test]
    fn too_many_bad_blocks_for_the_good_table() {
        // With the table full, the eighth bad zone cannot get its indirect
        // block.
        let dev = ByteBlockDevice::new(MemByteDevice::new(4000 * BLOCK_SIZE)).expect("dev");
        let mut ctx = context_with_bad(&dev, 4000, []);
        let first = ctx.geometry().first_data_zone;
        for _ in 0..mfs_alloc::MAX_GOOD_BLOCKS {
            ctx.good.take_free_zone(&ctx.alloc).expect("take");
        }
        ctx.alloc.mark_zone(first + 600);
        ctx.bad.insert(BlockNumber(first + 600));
        for zone in first + 601..first + 609 {
            ctx.alloc.mark_zone(zone);
            ctx.bad.insert(BlockNumber(zone));
        }
        assert!(matches!(
            make_bad_inode(&mut ctx),
            Err(MfsError::TooManyBadBlocks)
        ));
    }
}
