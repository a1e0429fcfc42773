#![forbid(unsafe_code)]
//! Error types for the Minix image builder.
//!
//! # Error Taxonomy
//!
//! Two layers, as elsewhere in the workspace:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `mfs-types` | Field-level encode/decode violations |
//! | Runtime | `MfsError` | `mfs-error` (this crate) | Everything a build or inspection can fail with |
//!
//! `mfs-error` does not depend on `mfs-types`; `mfs-core` owns the
//! `ParseError → MfsError` conversion.
//!
//! Runtime failures fall into four groups:
//!
//! | Group | Variants | When |
//! |-------|----------|------|
//! | Configuration | `ImageTooSmall`, `InvalidGeometry`, `UnsupportedNameLength`, `BadBlockInMetadata`, `Format`, `Mounted`, `RefusedDevice` | Before any content is written |
//! | Resource exhaustion | `NoFreeInodes`, `NoFreeZones`, `TooManyBadBlocks`, `FileTooLarge`, `TooManyLinks` | Mid-build |
//! | I/O | `Io`, `ShortIo` | Any device access |
//! | Reader | `Parse`, `Corruption` | Inspecting an existing image |
//!
//! Every variant is fatal to the operation that raised it. Problems with
//! individual host entries during tree import are not errors at all; the
//! importer logs them and moves on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MfsError {
    /// Operating system I/O error (wraps `std::io::Error`).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block-sized transfer moved fewer bytes than requested.
    #[error("short {op} at block {block}")]
    ShortIo { op: &'static str, block: u64 },

    /// The device is below the minimum size for any layout.
    #[error("image too small: {blocks} blocks (need at least {min})")]
    ImageTooSmall { blocks: u64, min: u64 },

    /// The requested block/inode counts cannot be laid out.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported name length {0} (must be 14 or 30)")]
    UnsupportedNameLength(u32),

    /// An unreadable block sits inside the metadata area.
    #[error("bad block {block} lies before the data area (first data zone {first_data_zone}); cannot make filesystem")]
    BadBlockInMetadata { block: u64, first_data_zone: u64 },

    /// Structurally invalid input (bad-block list syntax, bad magic, ...).
    #[error("invalid format: {0}")]
    Format(String),

    #[error("{0} is mounted; will not make a filesystem here")]
    Mounted(String),

    #[error("will not try to make filesystem on '{0}'")]
    RefusedDevice(String),

    #[error("no free inodes")]
    NoFreeInodes,

    #[error("no free zones")]
    NoFreeZones,

    #[error("too many bad blocks")]
    TooManyBadBlocks,

    #[error("file too large for this layout: logical block {index} exceeds {max} blocks")]
    FileTooLarge { index: u64, max: u64 },

    #[error("too many links to inode {ino} (max {max})")]
    TooManyLinks { ino: u32, max: u32 },

    /// Parse-layer error surfaced to the user.
    #[error("parse error: {0}")]
    Parse(String),

    /// On-disk metadata of an existing image is inconsistent.
    #[error("corrupt metadata at block {block}: {detail}")]
    Corruption { block: u64, detail: String },
}

impl MfsError {
    /// Convert this error into a POSIX errno.
    ///
    /// The mapping is exhaustive so a new variant cannot be added without
    /// choosing its errno.
    #[must_use]
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::ShortIo { .. } | Self::Corruption { .. } => libc::EIO,
            Self::ImageTooSmall { .. }
            | Self::InvalidGeometry(_)
            | Self::UnsupportedNameLength(_)
            | Self::BadBlockInMetadata { .. }
            | Self::Format(_)
            | Self::Parse(_) => libc::EINVAL,
            Self::Mounted(_) => libc::EBUSY,
            Self::RefusedDevice(_) => libc::EPERM,
            Self::NoFreeInodes | Self::NoFreeZones | Self::TooManyBadBlocks => libc::ENOSPC,
            Self::FileTooLarge { .. } => libc::EFBIG,
            Self::TooManyLinks { .. } => libc::EMLINK,
        }
    }

    /// Whether the error was detected before any block was written.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ImageTooSmall { .. }
                | Self::InvalidGeometry(_)
                | Self::UnsupportedNameLength(_)
                | Self::BadBlockInMetadata { .. }
                | Self::Format(_)
                | Self::Mounted(_)
                | Self::RefusedDevice(_)
        )
    }
}

/// Result alias using `MfsError`.
pub type Result<T> = std::result::Result<T, MfsError>;
