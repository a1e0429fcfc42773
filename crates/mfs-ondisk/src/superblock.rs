//! Minix superblock (block 1).
//!
//! | Offset | Width | Field |
//! |--------|-------|-------|
//! | 0x00 | u16 | `s_ninodes` |
//! | 0x02 | u16 | `s_nzones` (v1 only, 0 on v2) |
//! | 0x04 | u16 | `s_imap_blocks` |
//! | 0x06 | u16 | `s_zmap_blocks` |
//! | 0x08 | u16 | `s_firstdatazone` |
//! | 0x0A | u16 | `s_log_zone_size` |
//! | 0x0C | u32 | `s_max_size` |
//! | 0x10 | u16 | `s_magic` |
//! | 0x12 | u16 | `s_state` |
//! | 0x14 | u32 | `s_zones` (v2 only, 0 on v1) |

use mfs_types::{
    BLOCK_SIZE, FsVersion, MINIX_ERROR_FS, MINIX_VALID_FS, MinixFormat, ParseError, read_le_u16,
    read_le_u32, write_le_u16, write_le_u32,
};
use serde::{Deserialize, Serialize};

const SUPERBLOCK_ENCODED_LEN: usize = 0x18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superblock {
    pub ninodes: u16,
    /// Total zones on the device, whichever on-disk field holds it.
    pub zones: u32,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub first_data_zone: u16,
    pub log_zone_size: u16,
    pub max_size: u32,
    pub magic: u16,
    pub state: u16,
}

impl Superblock {
    pub fn format(&self) -> Result<MinixFormat, ParseError> {
        MinixFormat::from_magic(self.magic)
    }

    /// Set the clean flag and drop the error flag.
    pub fn mark_valid(&mut self) {
        self.state |= MINIX_VALID_FS;
        self.state &= !MINIX_ERROR_FS;
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state & MINIX_VALID_FS != 0 && self.state & MINIX_ERROR_FS == 0
    }

    /// Encode into a full zero-padded block.
    pub fn to_block(&self) -> Result<Vec<u8>, ParseError> {
        let format = self.format()?;
        let mut block = vec![0_u8; BLOCK_SIZE];
        write_le_u16(&mut block, 0x00, self.ninodes)?;
        match format.version {
            FsVersion::V1 => {
                let nzones = u16::try_from(self.zones)
                    .map_err(|_| ParseError::IntegerConversion { field: "s_nzones" })?;
                write_le_u16(&mut block, 0x02, nzones)?;
            }
            FsVersion::V2 => write_le_u32(&mut block, 0x14, self.zones)?,
        }
        write_le_u16(&mut block, 0x04, self.imap_blocks)?;
        write_le_u16(&mut block, 0x06, self.zmap_blocks)?;
        write_le_u16(&mut block, 0x08, self.first_data_zone)?;
        write_le_u16(&mut block, 0x0A, self.log_zone_size)?;
        write_le_u32(&mut block, 0x0C, self.max_size)?;
        write_le_u16(&mut block, 0x10, self.magic)?;
        write_le_u16(&mut block, 0x12, self.state)?;
        Ok(block)
    }

    pub fn parse_from_bytes(region: &[u8]) -> Result<Self, ParseError> {
        if region.len() < SUPERBLOCK_ENCODED_LEN {
            return Err(ParseError::InsufficientData {
                needed: SUPERBLOCK_ENCODED_LEN,
                offset: 0,
                actual: region.len(),
            });
        }

        let magic = read_le_u16(region, 0x10)?;
        let format = MinixFormat::from_magic(magic)?;
        let zones = match format.version {
            FsVersion::V1 => u32::from(read_le_u16(region, 0x02)?),
            FsVersion::V2 => read_le_u32(region, 0x14)?,
        };
        let log_zone_size = read_le_u16(region, 0x0A)?;
        if log_zone_size != 0 {
            return Err(ParseError::InvalidField {
                field: "s_log_zone_size",
                reason: "zones larger than one block are not supported",
            });
        }

        Ok(Self {
            ninodes: read_le_u16(region, 0x00)?,
            zones,
            imap_blocks: read_le_u16(region, 0x04)?,
            zmap_blocks: read_le_u16(region, 0x06)?,
            first_data_zone: read_le_u16(region, 0x08)?,
            log_zone_size,
            max_size: read_le_u32(region, 0x0C)?,
            magic,
            state: read_le_u16(region, 0x12)?,
        })
    }
}
