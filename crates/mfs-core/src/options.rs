//! Build configuration.
//!
//! Options can come from a JSON file; the CLI applies its flags on top.
//! Every field has a default, so a file only needs to name what it changes:
//!
//! ```json
//! { "version": "v2", "name_len": 14, "bad_blocks": { "list": "bad.txt" } }
//! ```

use mfs_error::{MfsError, Result};
use mfs_types::{FsVersion, MinixFormat, NameLen};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where bad blocks come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadBlockSource {
    /// Assume the medium is clean.
    #[default]
    None,
    /// Read every block of the device before building.
    Scan,
    /// Block numbers listed in a file, one or more per line.
    List(PathBuf),
}

/// Owner recorded on the root directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootOwner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MkfsOptions {
    pub version: FsVersion,
    pub name_len: NameLen,
    /// Blocks to use; the whole device when unset.
    pub blocks: Option<u64>,
    /// Inode count; 0 picks one inode per three blocks.
    pub inodes: u32,
    pub bad_blocks: BadBlockSource,
    /// Host directory copied into the root.
    pub seed_dir: Option<PathBuf>,
    /// Fixed timestamp for the root and bad-block inodes; the current time
    /// when unset.
    pub timestamp: Option<u32>,
    pub root_owner: RootOwner,
    /// Seconds between progress reports while probing for bad blocks.
    pub progress_interval_secs: u64,
}

impl Default for MkfsOptions {
    fn default() -> Self {
        Self {
            version: FsVersion::V1,
            name_len: NameLen::Long30,
            blocks: None,
            inodes: 0,
            bad_blocks: BadBlockSource::None,
            seed_dir: None,
            timestamp: None,
            root_owner: RootOwner::default(),
            progress_interval_secs: 5,
        }
    }
}

impl MkfsOptions {
    #[must_use]
    pub fn format(&self) -> MinixFormat {
        MinixFormat::new(self.version, self.name_len)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MfsError::Format(format!("options: {e}")))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| MfsError::Format(format!("options file {}: {e}", path.display())))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MfsError::Format(e.to_string()))
    }

    /// The configured timestamp, or now (saturating at the 32-bit limit).
    #[must_use]
    pub fn timestamp_or_now(&self) -> u32 {
        self.timestamp.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        })
    }
}
