//! The root directory.

use mfs_block::BlockDevice;
use mfs_dir::{add_entry, init_dir_block};
use mfs_error::Result;
use mfs_types::{BAD_INO, BLOCK_SIZE, ROOT_INO, S_IFDIR};
use tracing::debug;

use crate::context::BuildContext;

/// Name of the root entry for the bad-block inode.
pub const BAD_BLOCKS_NAME: &[u8] = b".badblocks";

#[expect(clippy::cast_possible_truncation)]
fn low_16(id: u32) -> u16 {
    id as u16
}

/// Create inode #1 with `.` and `..` pointing at itself, plus a
/// `.badblocks` entry when the medium has bad blocks.
///
/// The root's zone comes from the good-blocks table, since the zone map
/// still holds only bad blocks at this point.
pub fn make_root_inode<D: BlockDevice + ?Sized>(ctx: &mut BuildContext<'_, D>) -> Result<()> {
    let format = ctx.format();
    let zone = ctx.good.take_free_zone(&ctx.alloc)?;

    let mut block = vec![0_u8; BLOCK_SIZE];
    init_dir_block(&mut block, ROOT_INO, ROOT_INO, format)?;
    let slots: u32 = if ctx.bad.is_empty() {
        2
    } else {
        add_entry(&mut block, 2, BAD_INO, BAD_BLOCKS_NAME, format)?;
        3
    };
    ctx.dev.write_block(zone, &block)?;

    ctx.alloc.mark_inode(ROOT_INO);
    let owner = ctx.root_owner;
    let timestamp = ctx.timestamp;
    let root = ctx.inodes.get_mut(ROOT_INO)?;
    root.mode = S_IFDIR | 0o755;
    root.nlinks = 2;
    root.uid = low_16(owner.uid);
    if owner.uid != 0 {
        root.gid = low_16(owner.gid);
    }
    root.size = slots * format.dir_entry_size() as u32;
    root.zones[0] = zone.0;
    root.set_times(timestamp);

    debug!(target: "mfs::core", event = "root_created", zone = zone.0, slots);
    Ok(())
}
