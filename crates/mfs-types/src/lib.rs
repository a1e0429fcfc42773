#![forbid(unsafe_code)]
//! Shared vocabulary for Minix filesystem images.
//!
//! Unit-carrying newtypes, the fixed on-disk constants of the Minix v1/v2
//! layouts, the [`MinixFormat`] parameter set that selects between them, and
//! little-endian field helpers used by the encoders in `mfs-ondisk`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Block size in bytes. Minix zones are always exactly one block here.
pub const BLOCK_SIZE: usize = 1024;
pub const BLOCK_SIZE_BITS: u32 = 10;
/// Number of bitmap bits stored in one block.
pub const BITS_PER_BLOCK: u32 = (BLOCK_SIZE as u32) << 3;
/// Bytes cleared at the start of the device so other tools do not detect a
/// foreign filesystem signature.
pub const BOOT_SECTOR_SIZE: usize = 512;

pub const SUPERBLOCK_BLOCK: BlockNumber = BlockNumber(1);
pub const INODE_BITMAP_START: BlockNumber = BlockNumber(2);
/// Smallest image that can host a layout.
pub const MIN_BLOCKS: u32 = 10;
/// v1 zone numbers are 16-bit.
pub const V1_MAX_BLOCKS: u32 = 65_535;
pub const MAX_INODES: u32 = 65_535;

pub const MINIX_SUPER_MAGIC: u16 = 0x137F;
pub const MINIX_SUPER_MAGIC2: u16 = 0x138F;
pub const MINIX2_SUPER_MAGIC: u16 = 0x2468;
pub const MINIX2_SUPER_MAGIC2: u16 = 0x2478;

pub const MINIX_VALID_FS: u16 = 0x0001;
pub const MINIX_ERROR_FS: u16 = 0x0002;

pub const MINIX_LINK_MAX: u32 = 250;
pub const MINIX2_LINK_MAX: u32 = 65_530;

pub const ROOT_INO: InodeNumber = InodeNumber(1);
pub const BAD_INO: InodeNumber = InodeNumber(2);

/// Zone pointer slots held in memory for either inode layout.
pub const ZONE_SLOTS: usize = 10;
pub const DIRECT_ZONES: u32 = 7;
pub const INDIRECT_SLOT: usize = 7;
pub const DOUBLE_INDIRECT_SLOT: usize = 8;

/// File type mask.
pub const S_IFMT: u16 = 0o170_000;
pub const S_IFSOCK: u16 = 0o140_000;
pub const S_IFLNK: u16 = 0o120_000;
pub const S_IFREG: u16 = 0o100_000;
pub const S_IFBLK: u16 = 0o060_000;
pub const S_IFDIR: u16 = 0o040_000;
pub const S_IFCHR: u16 = 0o020_000;
pub const S_IFIFO: u16 = 0o010_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockNumber(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InodeNumber(pub u32);

impl BlockNumber {
    /// Byte offset of this block on the device.
    #[must_use]
    pub fn byte_offset(self) -> u64 {
        u64::from(self.0) << BLOCK_SIZE_BITS
    }

    #[must_use]
    pub fn checked_add(self, count: u32) -> Option<Self> {
        self.0.checked_add(count).map(Self)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for InodeNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// On-disk inode layout generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FsVersion {
    /// 32-byte inodes, 16-bit zone pointers.
    #[default]
    V1,
    /// 64-byte inodes, 32-bit zone pointers.
    V2,
}

/// Maximum file name length stored in a directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NameLen {
    Short14,
    #[default]
    Long30,
}

impl NameLen {
    #[must_use]
    pub fn get(self) -> usize {
        match self {
            Self::Short14 => 14,
            Self::Long30 => 30,
        }
    }
}

impl TryFrom<u8> for NameLen {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            14 => Ok(Self::Short14),
            30 => Ok(Self::Long30),
            _ => Err(ParseError::InvalidField {
                field: "name_len",
                reason: "must be 14 or 30",
            }),
        }
    }
}

impl From<NameLen> for u8 {
    fn from(value: NameLen) -> Self {
        match value {
            NameLen::Short14 => 14,
            NameLen::Long30 => 30,
        }
    }
}

/// The full parameter set selecting one of the four Minix variants.
///
/// Every size-dependent computation (inode record width, pointers per
/// indirect block, directory slot width) is derived from here so the v1 and
/// v2 paths share one implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MinixFormat {
    pub version: FsVersion,
    pub name_len: NameLen,
}

impl MinixFormat {
    #[must_use]
    pub fn new(version: FsVersion, name_len: NameLen) -> Self {
        Self { version, name_len }
    }

    /// Recover the variant from a superblock magic number.
    pub fn from_magic(magic: u16) -> Result<Self, ParseError> {
        let (version, name_len) = match magic {
            MINIX_SUPER_MAGIC => (FsVersion::V1, NameLen::Short14),
            MINIX_SUPER_MAGIC2 => (FsVersion::V1, NameLen::Long30),
            MINIX2_SUPER_MAGIC => (FsVersion::V2, NameLen::Short14),
            MINIX2_SUPER_MAGIC2 => (FsVersion::V2, NameLen::Long30),
            _ => {
                return Err(ParseError::InvalidMagic {
                    expected: u64::from(MINIX_SUPER_MAGIC),
                    actual: u64::from(magic),
                });
            }
        };
        Ok(Self { version, name_len })
    }

    #[must_use]
    pub fn magic(self) -> u16 {
        match (self.version, self.name_len) {
            (FsVersion::V1, NameLen::Short14) => MINIX_SUPER_MAGIC,
            (FsVersion::V1, NameLen::Long30) => MINIX_SUPER_MAGIC2,
            (FsVersion::V2, NameLen::Short14) => MINIX2_SUPER_MAGIC,
            (FsVersion::V2, NameLen::Long30) => MINIX2_SUPER_MAGIC2,
        }
    }

    /// On-disk inode record size in bytes.
    #[must_use]
    pub fn inode_size(self) -> usize {
        match self.version {
            FsVersion::V1 => 32,
            FsVersion::V2 => 64,
        }
    }

    #[must_use]
    pub fn inodes_per_block(self) -> u32 {
        (BLOCK_SIZE / self.inode_size()) as u32
    }

    /// Width of a zone pointer in bytes.
    #[must_use]
    pub fn zone_ptr_size(self) -> usize {
        match self.version {
            FsVersion::V1 => 2,
            FsVersion::V2 => 4,
        }
    }

    /// Zone pointers held by one indirect block (N).
    #[must_use]
    pub fn ptrs_per_block(self) -> u32 {
        (BLOCK_SIZE / self.zone_ptr_size()) as u32
    }

    /// Zone slots present in the on-disk inode record.
    #[must_use]
    pub fn zone_slots(self) -> usize {
        match self.version {
            FsVersion::V1 => 9,
            FsVersion::V2 => 10,
        }
    }

    /// Directory slot width: 2-byte inode number plus the name field.
    #[must_use]
    pub fn dir_entry_size(self) -> usize {
        self.name_len.get() + 2
    }

    #[must_use]
    pub fn dir_entries_per_block(self) -> usize {
        BLOCK_SIZE / self.dir_entry_size()
    }

    /// Value stored in the superblock `s_max_size` field.
    #[must_use]
    pub fn max_file_size(self) -> u32 {
        match self.version {
            FsVersion::V1 => (7 + 512 + 512 * 512) * BLOCK_SIZE as u32,
            FsVersion::V2 => 0x7fff_ffff,
        }
    }

    /// Largest number of data blocks reachable without a triple-indirect tier.
    #[must_use]
    pub fn max_file_blocks(self) -> u64 {
        let n = u64::from(self.ptrs_per_block());
        u64::from(DIRECT_ZONES) + n + n * n
    }

    #[must_use]
    pub fn link_max(self) -> u32 {
        match self.version {
            FsVersion::V1 => MINIX_LINK_MAX,
            FsVersion::V2 => MINIX2_LINK_MAX,
        }
    }
}

impl fmt::Display for MinixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = match self.version {
            FsVersion::V1 => 1,
            FsVersion::V2 => 2,
        };
        write!(f, "minix v{v} ({}-char names)", self.name_len.get())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid magic: expected {expected:#x}, got {actual:#x}")]
    InvalidMagic { expected: u64, actual: u64 },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
fn ensure_slice_mut(data: &mut [u8], offset: usize, len: usize) -> Result<&mut [u8], ParseError> {
    let actual = data.len().saturating_sub(offset);
    let end = offset.checked_add(len).ok_or(ParseError::InvalidField {
        field: "offset",
        reason: "overflow",
    })?;
    data.get_mut(offset..end)
        .ok_or(ParseError::InsufficientData {
            needed: len,
            offset,
            actual,
        })
}

#[inline]
pub fn read_le_u16(data: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = ensure_slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
pub fn read_le_u32(data: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn write_le_u16(data: &mut [u8], offset: usize, value: u16) -> Result<(), ParseError> {
    ensure_slice_mut(data, offset, 2)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

#[inline]
pub fn write_le_u32(data: &mut [u8], offset: usize, value: u32) -> Result<(), ParseError> {
    ensure_slice_mut(data, offset, 4)?.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Bytes of a NUL-padded name field up to the first NUL (or the whole field).
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

pub fn u64_to_u32(value: u64, field: &'static str) -> Result<u32, ParseError> {
    u32::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}

/// Encode a Linux `dev_t` as the legacy 16-bit `major << 8 | minor` value
/// Minix stores in zone slot 0 of device inodes.
#[must_use]
pub fn old_encode_dev(rdev: u64) -> u16 {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff);
    let minor = (rdev & 0xff) | ((rdev >> 12) & !0xff);
    (((major & 0xff) << 8) | (minor & 0xff)) as u16
}

/// Split a legacy 16-bit device number into `(major, minor)`.
#[must_use]
pub fn old_decode_dev(raw: u16) -> (u8, u8) {
    let [minor, major] = raw.to_le_bytes();
    (major, minor)
}
