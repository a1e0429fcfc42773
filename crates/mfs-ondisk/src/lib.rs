#![forbid(unsafe_code)]
//! On-disk format encoding and parsing for Minix v1/v2 structures.
//!
//! Pure codec crate: no I/O, no side effects. Every structure is read and
//! written field by field at fixed little-endian offsets; nothing relies on
//! in-memory struct layout.

pub mod dir;
pub mod inode;
pub mod superblock;
pub mod zone_block;

pub use dir::{DirEntry, encode_dir_entry, parse_dir_entry};
pub use inode::Inode;
pub use superblock::Superblock;
pub use zone_block::ZoneBlock;
