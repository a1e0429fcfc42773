#![forbid(unsafe_code)]
//! Directory operations.
//!
//! Minix directories are flat arrays of fixed-width slots. Entries are only
//! ever appended here: a new image has no deletions, so a directory's live
//! slots are always a prefix of its slot array and its size is exactly
//! `slots * entry_width`.

use mfs_alloc::Allocator;
use mfs_block::BlockDevice;
use mfs_error::{MfsError, Result};
use mfs_inode::{extend, map_block};
use mfs_ondisk::{DirEntry, Inode, encode_dir_entry, parse_dir_entry};
use mfs_types::{BLOCK_SIZE, BlockNumber, InodeNumber, MinixFormat};
use tracing::{trace, warn};

fn slot_range(format: MinixFormat, slot: usize) -> std::ops::Range<usize> {
    let width = format.dir_entry_size();
    slot * width..(slot + 1) * width
}

fn ino_u16(ino: InodeNumber) -> Result<u16> {
    u16::try_from(ino.0).map_err(|_| MfsError::Format(format!("inode {ino} exceeds 16 bits")))
}

/// Write `name -> ino` into `slot` of `block`. Returns whether the name was
/// truncated to fit.
pub fn add_entry(
    block: &mut [u8],
    slot: usize,
    ino: InodeNumber,
    name: &[u8],
    format: MinixFormat,
) -> Result<bool> {
    if ino.0 == 0 {
        return Err(MfsError::Format(
            "directory entry inode cannot be zero".to_owned(),
        ));
    }
    if slot >= format.dir_entries_per_block() {
        return Err(MfsError::Format(format!(
            "directory slot {slot} beyond block capacity {}",
            format.dir_entries_per_block()
        )));
    }
    encode_dir_entry(&mut block[slot_range(format, slot)], ino_u16(ino)?, name, format)
        .map_err(|e| MfsError::Format(e.to_string()))
}

/// Initialize an empty directory block with `.` and `..` entries.
pub fn init_dir_block(
    block: &mut [u8],
    self_ino: InodeNumber,
    parent_ino: InodeNumber,
    format: MinixFormat,
) -> Result<()> {
    if block.len() != BLOCK_SIZE {
        return Err(MfsError::Format(format!(
            "directory block must be {BLOCK_SIZE} bytes, got {}",
            block.len()
        )));
    }
    block.fill(0);
    add_entry(block, 0, self_ino, b".", format)?;
    add_entry(block, 1, parent_ino, b"..", format)?;
    Ok(())
}

/// Slots in use at the front of a block, up to the first empty one.
#[must_use]
pub fn live_slots(block: &[u8], format: MinixFormat) -> usize {
    (0..format.dir_entries_per_block())
        .take_while(|&slot| {
            let range = slot_range(format, slot);
            block
                .get(range.start..range.start + 2)
                .is_some_and(|ino| ino != [0, 0])
        })
        .count()
}

/// Live entries of one block with their slot indices.
pub fn parse_dir_block(block: &[u8], format: MinixFormat) -> Result<Vec<(usize, DirEntry)>> {
    let mut entries = Vec::new();
    for slot in 0..format.dir_entries_per_block() {
        let range = slot_range(format, slot);
        let raw = block.get(range).ok_or_else(|| MfsError::Corruption {
            block: 0,
            detail: "directory block shorter than one block".to_owned(),
        })?;
        if let Some(entry) = parse_dir_entry(raw, format).map_err(|e| MfsError::Parse(e.to_string()))? {
            entries.push((slot, entry));
        }
    }
    Ok(entries)
}

/// Every live entry of a directory, following its zone chain.
pub fn read_dir<D: BlockDevice + ?Sized>(
    dev: &D,
    format: MinixFormat,
    inode: &Inode,
) -> Result<Vec<DirEntry>> {
    if !inode.is_dir() {
        return Err(MfsError::Format(format!(
            "mode {:o} is not a directory",
            inode.mode
        )));
    }
    let width = format.dir_entry_size();
    let slots = inode.size as usize / width;
    let per_block = format.dir_entries_per_block();
    let mut entries = Vec::new();
    for index in 0..slots.div_ceil(per_block) {
        let Some(zone) = map_block(dev, format, inode, index as u64)? else {
            continue;
        };
        let block = dev.read_block(zone)?;
        let in_block = (slots - index * per_block).min(per_block);
        entries.extend(
            parse_dir_block(block.as_slice(), format)?
                .into_iter()
                .filter(|(slot, _)| *slot < in_block)
                .map(|(_, entry)| entry),
        );
    }
    Ok(entries)
}

/// Appends entries to an existing directory, moving to a freshly extended
/// zone each time the current block fills up.
///
/// The writer holds the current block in memory; nothing is persisted until
/// the block fills or [`DirWriter::finish`] is called.
#[derive(Debug)]
pub struct DirWriter {
    format: MinixFormat,
    zone: BlockNumber,
    block: Vec<u8>,
    slot: usize,
    total: u32,
}

impl DirWriter {
    /// Pick up after the entries already in the directory's first zone.
    ///
    /// The existing content must fit one block with room for at least one
    /// more slot.
    pub fn resume<D: BlockDevice + ?Sized>(
        dev: &D,
        format: MinixFormat,
        inode: &Inode,
    ) -> Result<Self> {
        let width = format.dir_entry_size();
        if inode.size as usize > BLOCK_SIZE - width {
            return Err(MfsError::Format(format!(
                "existing directory too large to append to ({} bytes)",
                inode.size
            )));
        }
        let zone = BlockNumber(inode.zones[0]);
        if zone.0 == 0 {
            return Err(MfsError::Format(
                "directory has no first zone".to_owned(),
            ));
        }
        let block = dev.read_block(zone)?.into_inner();
        let slot = live_slots(&block, format);
        Ok(Self {
            format,
            zone,
            block,
            slot,
            total: u32::try_from(slot).unwrap_or(u32::MAX),
        })
    }

    #[must_use]
    pub fn entries(&self) -> u32 {
        self.total
    }

    fn size_bytes(&self) -> Result<u32> {
        let width = u32::try_from(self.format.dir_entry_size()).unwrap_or(u32::MAX);
        self.total.checked_mul(width).ok_or(MfsError::FileTooLarge {
            index: u64::from(self.total),
            max: self.format.max_file_blocks(),
        })
    }

    /// Append `name -> ino`. Returns whether the name was truncated.
    pub fn push<D: BlockDevice + ?Sized>(
        &mut self,
        dev: &D,
        alloc: &mut Allocator,
        dir: &mut Inode,
        ino: InodeNumber,
        name: &[u8],
    ) -> Result<bool> {
        if self.slot >= self.format.dir_entries_per_block() {
            dev.write_block(self.zone, &self.block)?;
            dir.size = self.size_bytes()?;
            self.zone = extend(dev, alloc, dir)?;
            self.block.fill(0);
            self.slot = 0;
            trace!(target: "mfs::dir", event = "dir_block_rotated", zone = self.zone.0);
        }
        let truncated = add_entry(&mut self.block, self.slot, ino, name, self.format)?;
        if truncated {
            warn!(
                target: "mfs::dir",
                event = "name_truncated",
                name = %String::from_utf8_lossy(name),
                max = self.format.name_len.get()
            );
        }
        self.slot += 1;
        self.total += 1;
        Ok(truncated)
    }

    /// Flush the current block and set the directory size.
    pub fn finish<D: BlockDevice + ?Sized>(self, dev: &D, dir: &mut Inode) -> Result<()> {
        dev.write_block(self.zone, &self.block)?;
        dir.size = self.size_bytes()?;
        Ok(())
    }
}
