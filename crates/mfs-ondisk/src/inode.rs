//! Minix inode records.
//!
//! v1 (32 bytes): `mode u16, uid u16, size u32, time u32, gid u8, nlinks u8,
//! zone[9] u16`.
//!
//! v2 (64 bytes): `mode u16, nlinks u16, uid u16, gid u16, size u32,
//! atime u32, mtime u32, ctime u32, zone[10] u32`.
//!
//! Both decode into the same [`Inode`]. Fields wider than the v1 record are
//! truncated on encode, as the on-disk format dictates.

use mfs_types::{
    FsVersion, MinixFormat, ParseError, S_IFBLK, S_IFCHR, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG,
    ZONE_SLOTS, ensure_slice, read_le_u16, read_le_u32, write_le_u16, write_le_u32,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub nlinks: u16,
    /// Exact byte length of the content.
    pub size: u32,
    pub atime: u32,
    /// The single v1 timestamp.
    pub mtime: u32,
    pub ctime: u32,
    /// 7 direct, 1 indirect, 1 double-indirect, 1 triple-indirect (v2 only,
    /// never populated here).
    pub zones: [u32; ZONE_SLOTS],
}

impl Inode {
    #[must_use]
    pub fn file_type(&self) -> u16 {
        self.mode & S_IFMT
    }

    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.file_type() == S_IFREG
    }

    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.file_type() == S_IFLNK
    }

    #[must_use]
    pub fn is_device(&self) -> bool {
        matches!(self.file_type(), S_IFCHR | S_IFBLK)
    }

    /// Whether the record is in use at all.
    #[must_use]
    pub fn is_allocated(&self) -> bool {
        self.nlinks != 0
    }

    /// Set all three timestamps (v1 keeps only `mtime`).
    pub fn set_times(&mut self, secs: u32) {
        self.atime = secs;
        self.mtime = secs;
        self.ctime = secs;
    }

    /// Encode into `out`, which must hold exactly one record.
    #[expect(clippy::cast_possible_truncation)]
    pub fn encode_into(&self, out: &mut [u8], format: MinixFormat) -> Result<(), ParseError> {
        let record = format.inode_size();
        if out.len() != record {
            return Err(ParseError::InsufficientData {
                needed: record,
                offset: 0,
                actual: out.len(),
            });
        }
        out.fill(0);
        match format.version {
            FsVersion::V1 => {
                write_le_u16(out, 0x00, self.mode)?;
                write_le_u16(out, 0x02, self.uid)?;
                write_le_u32(out, 0x04, self.size)?;
                write_le_u32(out, 0x08, self.mtime)?;
                out[0x0C] = self.gid as u8;
                out[0x0D] = self.nlinks as u8;
                for (slot, &zone) in self.zones.iter().take(format.zone_slots()).enumerate() {
                    let zone = u16::try_from(zone)
                        .map_err(|_| ParseError::IntegerConversion { field: "i_zone" })?;
                    write_le_u16(out, 0x0E + slot * 2, zone)?;
                }
            }
            FsVersion::V2 => {
                write_le_u16(out, 0x00, self.mode)?;
                write_le_u16(out, 0x02, self.nlinks)?;
                write_le_u16(out, 0x04, self.uid)?;
                write_le_u16(out, 0x06, self.gid)?;
                write_le_u32(out, 0x08, self.size)?;
                write_le_u32(out, 0x0C, self.atime)?;
                write_le_u32(out, 0x10, self.mtime)?;
                write_le_u32(out, 0x14, self.ctime)?;
                for (slot, &zone) in self.zones.iter().enumerate() {
                    write_le_u32(out, 0x18 + slot * 4, zone)?;
                }
            }
        }
        Ok(())
    }

    pub fn parse_from_bytes(bytes: &[u8], format: MinixFormat) -> Result<Self, ParseError> {
        let record = ensure_slice(bytes, 0, format.inode_size())?;
        let mut zones = [0_u32; ZONE_SLOTS];
        let inode = match format.version {
            FsVersion::V1 => {
                for (slot, zone) in zones.iter_mut().take(format.zone_slots()).enumerate() {
                    *zone = u32::from(read_le_u16(record, 0x0E + slot * 2)?);
                }
                let time = read_le_u32(record, 0x08)?;
                Self {
                    mode: read_le_u16(record, 0x00)?,
                    uid: read_le_u16(record, 0x02)?,
                    size: read_le_u32(record, 0x04)?,
                    atime: time,
                    mtime: time,
                    ctime: time,
                    gid: u16::from(record[0x0C]),
                    nlinks: u16::from(record[0x0D]),
                    zones,
                }
            }
            FsVersion::V2 => {
                for (slot, zone) in zones.iter_mut().enumerate() {
                    *zone = read_le_u32(record, 0x18 + slot * 4)?;
                }
                Self {
                    mode: read_le_u16(record, 0x00)?,
                    nlinks: read_le_u16(record, 0x02)?,
                    uid: read_le_u16(record, 0x04)?,
                    gid: read_le_u16(record, 0x06)?,
                    size: read_le_u32(record, 0x08)?,
                    atime: read_le_u32(record, 0x0C)?,
                    mtime: read_le_u32(record, 0x10)?,
                    ctime: read_le_u32(record, 0x14)?,
                    zones,
                }
            }
        };
        Ok(inode)
    }
}
