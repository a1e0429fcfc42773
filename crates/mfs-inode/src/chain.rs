//! Zone-pointer chains: placing data zones behind an inode and resolving
//! them again.

use mfs_alloc::Allocator;
use mfs_block::BlockDevice;
use mfs_error::{MfsError, Result};
use mfs_ondisk::{Inode, ZoneBlock};
use mfs_types::{BLOCK_SIZE, BlockNumber, DOUBLE_INDIRECT_SLOT, INDIRECT_SLOT, MinixFormat};
use tracing::trace;

use crate::parse_to_mfs_error;
use crate::tier::Tier;

fn read_pointers<D: BlockDevice + ?Sized>(
    dev: &D,
    zone: u32,
    format: MinixFormat,
) -> Result<ZoneBlock> {
    let buf = dev.read_block(BlockNumber(zone))?;
    ZoneBlock::from_bytes(buf.into_inner(), format).map_err(|e| parse_to_mfs_error(&e))
}

fn write_pointers<D: BlockDevice + ?Sized>(dev: &D, zone: u32, block: &ZoneBlock) -> Result<()> {
    dev.write_block(BlockNumber(zone), block.as_bytes())
}

fn set_pointer(block: &mut ZoneBlock, index: u32, zone: BlockNumber) -> Result<()> {
    block.set(index, zone.0).map_err(|e| parse_to_mfs_error(&e))
}

/// Record `data_zone` as logical block `index` of `inode`.
///
/// Pointer blocks are taken from `meta_alloc` the first time a tier is
/// entered and start zeroed; afterwards they are read, patched and written
/// back. A new double-indirect leaf is started whenever `inner` wraps to 0.
pub fn place_zone<D, F>(
    dev: &D,
    format: MinixFormat,
    inode: &mut Inode,
    index: u64,
    data_zone: BlockNumber,
    mut meta_alloc: F,
) -> Result<()>
where
    D: BlockDevice + ?Sized,
    F: FnMut() -> Result<BlockNumber>,
{
    match Tier::locate(index, format.ptrs_per_block())? {
        Tier::Direct(slot) => {
            inode.zones[slot] = data_zone.0;
        }
        Tier::Indirect(entry) => {
            let mut block = if entry == 0 {
                let zone = meta_alloc()?;
                inode.zones[INDIRECT_SLOT] = zone.0;
                trace!(target: "mfs::inode", event = "indirect_started", zone = zone.0);
                ZoneBlock::zeroed(format)
            } else {
                read_pointers(dev, inode.zones[INDIRECT_SLOT], format)?
            };
            set_pointer(&mut block, entry, data_zone)?;
            write_pointers(dev, inode.zones[INDIRECT_SLOT], &block)?;
        }
        Tier::DoubleIndirect { outer, inner } => {
            let mut outer_block = if outer == 0 && inner == 0 {
                let zone = meta_alloc()?;
                inode.zones[DOUBLE_INDIRECT_SLOT] = zone.0;
                trace!(target: "mfs::inode", event = "double_indirect_started", zone = zone.0);
                ZoneBlock::zeroed(format)
            } else {
                read_pointers(dev, inode.zones[DOUBLE_INDIRECT_SLOT], format)?
            };
            let (leaf_zone, mut leaf) = if inner == 0 {
                let zone = meta_alloc()?;
                set_pointer(&mut outer_block, outer, zone)?;
                write_pointers(dev, inode.zones[DOUBLE_INDIRECT_SLOT], &outer_block)?;
                trace!(target: "mfs::inode", event = "leaf_started", outer, zone = zone.0);
                (zone.0, ZoneBlock::zeroed(format))
            } else {
                let zone = outer_block.get(outer).map_err(|e| parse_to_mfs_error(&e))?;
                (zone, read_pointers(dev, zone, format)?)
            };
            set_pointer(&mut leaf, inner, data_zone)?;
            write_pointers(dev, leaf_zone, &leaf)?;
        }
    }
    Ok(())
}

/// Give `inode` one more data zone and return it.
///
/// The new zone becomes logical block `ceil(size / BLOCK_SIZE)` and the size
/// grows by one block; callers that write less than a full block set the
/// exact size afterwards.
pub fn extend<D: BlockDevice + ?Sized>(
    dev: &D,
    alloc: &mut Allocator,
    inode: &mut Inode,
) -> Result<BlockNumber> {
    let format = alloc.geometry().format;
    let index = u64::from(inode.size).div_ceil(BLOCK_SIZE as u64);
    // Fail before allocating anything the file could never reference.
    Tier::locate(index, format.ptrs_per_block())?;
    let zone = alloc.allocate_zone()?;
    place_zone(dev, format, inode, index, zone, || alloc.allocate_zone())?;
    inode.size = inode
        .size
        .checked_add(BLOCK_SIZE as u32)
        .ok_or(MfsError::FileTooLarge {
            index,
            max: format.max_file_blocks(),
        })?;
    Ok(zone)
}

/// Physical zone behind logical block `index`, or `None` for a hole.
pub fn map_block<D: BlockDevice + ?Sized>(
    dev: &D,
    format: MinixFormat,
    inode: &Inode,
    index: u64,
) -> Result<Option<BlockNumber>> {
    let nonzero = |zone: u32| (zone != 0).then_some(BlockNumber(zone));
    let zone = match Tier::locate(index, format.ptrs_per_block())? {
        Tier::Direct(slot) => inode.zones[slot],
        Tier::Indirect(entry) => {
            let Some(ind) = nonzero(inode.zones[INDIRECT_SLOT]) else {
                return Ok(None);
            };
            read_pointers(dev, ind.0, format)?
                .get(entry)
                .map_err(|e| parse_to_mfs_error(&e))?
        }
        Tier::DoubleIndirect { outer, inner } => {
            let Some(dind) = nonzero(inode.zones[DOUBLE_INDIRECT_SLOT]) else {
                return Ok(None);
            };
            let leaf = read_pointers(dev, dind.0, format)?
                .get(outer)
                .map_err(|e| parse_to_mfs_error(&e))?;
            let Some(leaf) = nonzero(leaf) else {
                return Ok(None);
            };
            read_pointers(dev, leaf.0, format)?
                .get(inner)
                .map_err(|e| parse_to_mfs_error(&e))?
        }
    };
    Ok(nonzero(zone))
}

/// Every zone an inode references: data zones and the pointer blocks
/// holding them, in chain order.
pub fn referenced_zones<D: BlockDevice + ?Sized>(
    dev: &D,
    format: MinixFormat,
    inode: &Inode,
) -> Result<Vec<u32>> {
    let mut zones: Vec<u32> = inode.zones[..INDIRECT_SLOT]
        .iter()
        .copied()
        .filter(|&z| z != 0)
        .collect();
    let ind = inode.zones[INDIRECT_SLOT];
    if ind != 0 {
        zones.push(ind);
        zones.extend(read_pointers(dev, ind, format)?.iter_nonzero());
    }
    let dind = inode.zones[DOUBLE_INDIRECT_SLOT];
    if dind != 0 {
        zones.push(dind);
        for leaf in read_pointers(dev, dind, format)?.iter_nonzero() {
            zones.push(leaf);
            zones.extend(read_pointers(dev, leaf, format)?.iter_nonzero());
        }
    }
    Ok(zones)
}
