//! Indirect and double-indirect zone blocks: one block viewed as an array
//! of zone pointers, u16 on v1 and u32 on v2.

use mfs_types::{
    BLOCK_SIZE, FsVersion, MinixFormat, ParseError, read_le_u16, read_le_u32, write_le_u16,
    write_le_u32,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneBlock {
    bytes: Vec<u8>,
    format: MinixFormat,
}

impl ZoneBlock {
    #[must_use]
    pub fn zeroed(format: MinixFormat) -> Self {
        Self {
            bytes: vec![0; BLOCK_SIZE],
            format,
        }
    }

    pub fn from_bytes(bytes: Vec<u8>, format: MinixFormat) -> Result<Self, ParseError> {
        if bytes.len() != BLOCK_SIZE {
            return Err(ParseError::InsufficientData {
                needed: BLOCK_SIZE,
                offset: 0,
                actual: bytes.len(),
            });
        }
        Ok(Self { bytes, format })
    }

    /// Number of pointers the block holds.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.format.ptrs_per_block()
    }

    fn offset(&self, index: u32) -> Result<usize, ParseError> {
        if index >= self.capacity() {
            return Err(ParseError::InvalidField {
                field: "zone_index",
                reason: "beyond pointer block",
            });
        }
        Ok(index as usize * self.format.zone_ptr_size())
    }

    pub fn get(&self, index: u32) -> Result<u32, ParseError> {
        let offset = self.offset(index)?;
        match self.format.version {
            FsVersion::V1 => read_le_u16(&self.bytes, offset).map(u32::from),
            FsVersion::V2 => read_le_u32(&self.bytes, offset),
        }
    }

    pub fn set(&mut self, index: u32, zone: u32) -> Result<(), ParseError> {
        let offset = self.offset(index)?;
        match self.format.version {
            FsVersion::V1 => {
                let zone = u16::try_from(zone)
                    .map_err(|_| ParseError::IntegerConversion { field: "zone_ptr" })?;
                write_le_u16(&mut self.bytes, offset, zone)
            }
            FsVersion::V2 => write_le_u32(&mut self.bytes, offset, zone),
        }
    }

    /// Non-zero pointers in slot order.
    pub fn iter_nonzero(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.capacity()).filter_map(|i| self.get(i).ok().filter(|&z| z != 0))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
