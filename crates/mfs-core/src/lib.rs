#![forbid(unsafe_code)]
//! Minix image construction and inspection.
//!
//! [`build_image`] drives a complete build against any block device:
//!
//! 1. plan the layout from the block count and requested inode count;
//! 2. gather bad blocks, by probing the medium or from a list;
//! 3. create the root directory and the bad-block inode;
//! 4. optionally copy a host directory tree into the root;
//! 5. write the superblock, bitmaps and inode table.
//!
//! Everything up to step 5 lives in a [`BuildContext`]; the superblock only
//! carries the valid flag once the final tables are on disk, so a build that
//! fails part way leaves an image no tool will mistake for a clean one.
//!
//! [`Image`] reads a finished image back: superblock, inodes, directory
//! listings and file contents.

pub mod badinode;
pub mod build;
pub mod context;
pub mod import;
pub mod mount_check;
pub mod options;
pub mod reader;
pub mod root;
pub mod writer;

pub use build::{BuildReport, build_image};
pub use context::BuildContext;
pub use import::import_directory;
pub use mount_check::{check_not_mounted, check_not_mounted_in, check_refused_device};
pub use options::{BadBlockSource, MkfsOptions, RootOwner};
pub use reader::{Image, ImageSummary};

pub use mfs_alloc::Geometry;
pub use mfs_badblocks::BadBlocks;
pub use mfs_block::{BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice, MemByteDevice};
pub use mfs_error::{MfsError, Result};
pub use mfs_ondisk::{DirEntry, Inode, Superblock};
pub use mfs_types::{BlockNumber, FsVersion, InodeNumber, MinixFormat, NameLen};

use mfs_types::ParseError;

/// Map an on-disk encode/decode failure onto the runtime taxonomy.
pub(crate) fn parse_error_to_mfs(e: &ParseError) -> MfsError {
    match e {
        ParseError::InvalidField { field, reason } => {
            if field.contains("name_len") {
                MfsError::Format(format!("{field}: {reason}"))
            } else if field.starts_with("s_") {
                MfsError::InvalidGeometry(format!("{field}: {reason}"))
            } else {
                MfsError::Format(e.to_string())
            }
        }
        ParseError::InvalidMagic { .. } => MfsError::Format(e.to_string()),
        ParseError::InsufficientData { .. } | ParseError::IntegerConversion { .. } => {
            MfsError::Corruption {
                block: 0,
                detail: e.to_string(),
            }
        }
    }
}
