#![forbid(unsafe_code)]
//! Inode management.
//!
//! The whole inode table of a new image is held in memory ([`InodeTable`])
//! and written out once at the end. File content is attached one zone at a
//! time through [`extend`], which threads the zone into the direct,
//! indirect or double-indirect tier as the file grows.

pub mod chain;
pub mod tier;

pub use chain::{extend, map_block, place_zone, referenced_zones};
pub use tier::Tier;

use mfs_error::{MfsError, Result};
use mfs_ondisk::Inode;
use mfs_types::{BLOCK_SIZE, InodeNumber, MinixFormat, ParseError};

/// Surface an encode/decode failure as a runtime error.
pub(crate) fn parse_to_mfs_error(e: &ParseError) -> MfsError {
    MfsError::Parse(e.to_string())
}

/// 1-based table of every inode on the image.
#[derive(Debug, Clone)]
pub struct InodeTable {
    format: MinixFormat,
    // Slot 0 is unused so inode numbers index directly.
    inodes: Vec<Inode>,
}

impl InodeTable {
    #[must_use]
    pub fn new(format: MinixFormat, count: u32) -> Self {
        Self {
            format,
            inodes: vec![Inode::default(); count as usize + 1],
        }
    }

    /// Decode a table read back from an image.
    pub fn decode(bytes: &[u8], format: MinixFormat, count: u32) -> Result<Self> {
        let record = format.inode_size();
        let mut table = Self::new(format, count);
        for (slot, inode) in table.inodes.iter_mut().skip(1).enumerate() {
            let start = slot * record;
            let chunk = bytes.get(start..start + record).ok_or_else(|| {
                MfsError::Corruption {
                    block: 0,
                    detail: format!("inode table truncated at inode {}", slot + 1),
                }
            })?;
            *inode = Inode::parse_from_bytes(chunk, format).map_err(|e| parse_to_mfs_error(&e))?;
        }
        Ok(table)
    }

    #[must_use]
    pub fn format(&self) -> MinixFormat {
        self.format
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        u32::try_from(self.inodes.len() - 1).unwrap_or(u32::MAX)
    }

    fn slot(&self, ino: InodeNumber) -> Result<usize> {
        let idx = ino.0 as usize;
        if ino.0 == 0 || idx >= self.inodes.len() {
            return Err(MfsError::Corruption {
                block: 0,
                detail: format!("inode {ino} out of range 1..={}", self.count()),
            });
        }
        Ok(idx)
    }

    pub fn get(&self, ino: InodeNumber) -> Result<&Inode> {
        let idx = self.slot(ino)?;
        Ok(&self.inodes[idx])
    }

    pub fn get_mut(&mut self, ino: InodeNumber) -> Result<&mut Inode> {
        let idx = self.slot(ino)?;
        Ok(&mut self.inodes[idx])
    }

    /// Allocated inodes in number order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = (InodeNumber, &Inode)> + '_ {
        self.inodes
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, inode)| inode.is_allocated())
            .map(|(idx, inode)| (InodeNumber(idx as u32), inode))
    }

    /// Encode into `table_blocks` whole blocks, zero padded.
    pub fn encode(&self, table_blocks: u32) -> Result<Vec<u8>> {
        let record = self.format.inode_size();
        let mut out = vec![0_u8; table_blocks as usize * BLOCK_SIZE];
        if self.inodes.len() - 1 > out.len() / record {
            return Err(MfsError::InvalidGeometry(format!(
                "{} inodes do not fit {table_blocks} table blocks",
                self.count()
            )));
        }
        for (slot, inode) in self.inodes.iter().skip(1).enumerate() {
            let start = slot * record;
            inode
                .encode_into(&mut out[start..start + record], self.format)
                .map_err(|e| parse_to_mfs_error(&e))?;
        }
        Ok(out)
    }
}
