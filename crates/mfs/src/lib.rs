#![forbid(unsafe_code)]
//! Public API for building and inspecting Minix v1/v2 images.
//!
//! Everything here comes from `mfs-core`; depend on this crate rather than
//! the internal ones.
//!
//! ```no_run
//! use mfs::{ByteBlockDevice, FileByteDevice, MkfsOptions, build_image};
//!
//! let dev = ByteBlockDevice::new(FileByteDevice::open("floppy.img")?)?;
//! let report = build_image(&dev, &MkfsOptions::default())?;
//! for line in report.summary_lines() {
//!     println!("{line}");
//! }
//! # Ok::<(), mfs::MfsError>(())
//! ```

pub use mfs_core::*;
