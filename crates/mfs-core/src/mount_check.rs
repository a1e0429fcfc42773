//! Refusing targets that must not be formatted.

use mfs_error::{MfsError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Mount tables consulted in order; the first readable one wins.
const MOUNT_TABLES: [&str; 2] = ["/proc/mounts", "/etc/mtab"];

/// Whole-disk IDE devices (`/dev/hda`, `/dev/hdb`).
const REFUSED_RDEVS: [u64; 2] = [0x0300, 0x0340];

/// Device names (first column) of a mount table.
fn mounted_sources(table: &str) -> impl Iterator<Item = &str> {
    table
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_whitespace().next())
}

/// Fail with [`MfsError::Mounted`] when `device` appears in `table`.
pub fn check_not_mounted_in(device: &Path, table: &str) -> Result<()> {
    let canonical = fs::canonicalize(device).ok();
    let hit = mounted_sources(table).any(|source| {
        Path::new(source) == device || canonical.as_deref() == Some(Path::new(source))
    });
    if hit {
        return Err(MfsError::Mounted(device.display().to_string()));
    }
    Ok(())
}

/// Check the system mount table. A missing table means nothing is known to
/// be mounted.
pub fn check_not_mounted(device: &Path) -> Result<()> {
    for table in MOUNT_TABLES {
        if let Ok(text) = fs::read_to_string(table) {
            debug!(target: "mfs::core", event = "mount_table", table);
            return check_not_mounted_in(device, &text);
        }
    }
    Ok(())
}

/// Refuse whole-disk devices that would take out a partition table.
pub fn check_refused_device(device: &Path, rdev: u64) -> Result<()> {
    if REFUSED_RDEVS.contains(&rdev) {
        return Err(MfsError::RefusedDevice(device.display().to_string()));
    }
    Ok(())
}
