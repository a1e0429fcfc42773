//! Directory slot codec.
//!
//! A Minix directory block is an array of fixed-width slots: a u16 inode
//! number (0 = empty) followed by a NUL-padded name of `name_len` bytes.
//! Names that fill the field exactly carry no terminator.

use mfs_types::{MinixFormat, ParseError, read_le_u16, trim_nul_padded, write_le_u16};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub inode: u16,
    pub name: Vec<u8>,
}

impl DirEntry {
    #[must_use]
    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// Write one entry into `slot`, which must be exactly one slot wide.
///
/// Names longer than the format allows are cut to `name_len` bytes; the
/// return value reports whether that happened.
pub fn encode_dir_entry(
    slot: &mut [u8],
    inode: u16,
    name: &[u8],
    format: MinixFormat,
) -> Result<bool, ParseError> {
    let width = format.dir_entry_size();
    if slot.len() != width {
        return Err(ParseError::InsufficientData {
            needed: width,
            offset: 0,
            actual: slot.len(),
        });
    }
    if name.is_empty() {
        return Err(ParseError::InvalidField {
            field: "d_name",
            reason: "empty name",
        });
    }
    let max = format.name_len.get();
    let truncated = name.len() > max;
    let stored = &name[..name.len().min(max)];

    slot.fill(0);
    write_le_u16(slot, 0, inode)?;
    slot[2..2 + stored.len()].copy_from_slice(stored);
    Ok(truncated)
}

/// Decode one slot. Empty slots (inode 0) yield `None`.
pub fn parse_dir_entry(slot: &[u8], format: MinixFormat) -> Result<Option<DirEntry>, ParseError> {
    let width = format.dir_entry_size();
    if slot.len() < width {
        return Err(ParseError::InsufficientData {
            needed: width,
            offset: 0,
            actual: slot.len(),
        });
    }
    let inode = read_le_u16(slot, 0)?;
    if inode == 0 {
        return Ok(None);
    }
    Ok(Some(DirEntry {
        inode,
        name: trim_nul_padded(&slot[2..width]).to_vec(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs_types::{FsVersion, NameLen};

    fn fmt14() -> MinixFormat {
        MinixFormat::new(FsVersion::V1, NameLen::Short14)
    }

    #[test]
    fn dot_entry_layout() {
        let mut slot = [0xAA_u8; 16];
        let truncated = encode_dir_entry(&mut slot, 1, b".", fmt14()).expect("encode");
        assert!(!truncated);
        assert_eq!(&slot[..4], &[1, 0, b'.', 0]);
        assert!(slot[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn full_width_name_has_no_terminator() {
        let mut slot = [0_u8; 16];
        encode_dir_entry(&mut slot, 9, b"abcdefghijklmn", fmt14()).expect("encode");
        let entry = parse_dir_entry(&slot, fmt14()).expect("parse").expect("live");
        assert_eq!(entry.name, b"abcdefghijklmn");
        assert_eq!(entry.inode, 9);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut slot = [0_u8; 16];
        let truncated =
            encode_dir_entry(&mut slot, 3, b"a_really_long_file_name", fmt14()).expect("encode");
        assert!(truncated);
        let entry = parse_dir_entry(&slot, fmt14()).expect("parse").expect("live");
        assert_eq!(entry.name_str(), "a_really_long_");
    }

    #[test]
    fn empty_slot_and_bad_input() {
        let slot = [0_u8; 32];
        let fmt30 = MinixFormat::new(FsVersion::V2, NameLen::Long30);
        assert_eq!(parse_dir_entry(&slot, fmt30).expect("parse"), None);
        assert!(parse_dir_entry(&slot[..20], fmt30).is_err());

        let mut slot = [0_u8; 16];
        assert!(encode_dir_entry(&mut slot, 1, b"", fmt14()).is_err());
        assert!(encode_dir_entry(&mut slot[..15], 1, b"x", fmt14()).is_err());
    }
}
