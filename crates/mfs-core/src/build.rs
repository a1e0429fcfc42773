//! The end-to-end build.

use mfs_alloc::{Geometry, plan_layout};
use mfs_badblocks::progress::log_progress;
use mfs_badblocks::{BadBlocks, ProgressReporter, Scanner, load_bad_block_list};
use mfs_block::{BlockDevice, ByteBlockDevice, ByteDevice};
use mfs_error::{MfsError, Result};
use mfs_types::ROOT_INO;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::time::Duration;
use tracing::{debug, info};

use crate::badinode::make_bad_inode;
use crate::context::BuildContext;
use crate::import::{ImportStats, import_directory};
use crate::options::{BadBlockSource, MkfsOptions};
use crate::root::make_root_inode;
use crate::writer::{write_tables, write_unfinished_superblock};

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub geometry: Geometry,
    pub bad_blocks: BadBlocks,
    pub used_inodes: u32,
    pub used_zones: u32,
    pub import: Option<ImportStats>,
}

impl BuildReport {
    /// The classic `mkfs.minix` summary, one line each.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let geo = &self.geometry;
        let mut lines = vec![
            format!("{} inodes", geo.inodes),
            format!("{} blocks", geo.blocks),
            format!(
                "Firstdatazone={} ({})",
                geo.first_data_zone, geo.first_data_zone
            ),
            format!("Zonesize={}", mfs_types::BLOCK_SIZE),
            format!("Maxsize={}", geo.format.max_file_size()),
        ];
        lines.extend(self.bad_blocks.summary());
        lines
    }
}

/// Probe or load bad blocks, marking each in the zone map as it is found.
fn gather_bad_blocks<B: ByteDevice>(
    ctx: &mut BuildContext<'_, ByteBlockDevice<B>>,
    options: &MkfsOptions,
) -> Result<BadBlocks> {
    let zones = ctx.geometry().zones();
    let first = ctx.geometry().first_data_zone;
    let dev = ctx.dev;
    let alloc = &mut ctx.alloc;
    match &options.bad_blocks {
        BadBlockSource::None => Ok(BadBlocks::new()),
        BadBlockSource::Scan => {
            let scanner = Scanner::new(dev.inner(), zones);
            let reporter = ProgressReporter::spawn(
                scanner.progress().clone(),
                Duration::from_secs(options.progress_interval_secs.max(1)),
                log_progress,
            )?;
            let result = scanner.scan(first, |block| alloc.mark_zone(block.0));
            reporter.stop();
            result
        }
        BadBlockSource::List(path) => {
            let reader = BufReader::new(File::open(path)?);
            load_bad_block_list(reader, zones, first, |block| alloc.mark_zone(block.0))
        }
    }
}

/// Build a complete image on `dev`.
///
/// Nothing is written until the layout is planned and bad blocks are known,
/// so configuration errors leave the device untouched.
pub fn build_image<B: ByteDevice>(
    dev: &ByteBlockDevice<B>,
    options: &MkfsOptions,
) -> Result<BuildReport> {
    let format = options.format();
    let available = dev.block_count();
    let blocks = options.blocks.unwrap_or(u64::from(available));
    if blocks > u64::from(available) {
        return Err(MfsError::InvalidGeometry(format!(
            "{blocks} blocks requested but the device holds {available}"
        )));
    }
    let geometry = plan_layout(blocks, options.inodes, format)?;
    info!(
        target: "mfs::core",
        event = "layout_planned",
        magic = format.magic(),
        inodes = geometry.inodes,
        blocks = geometry.blocks,
        first_data_zone = geometry.first_data_zone
    );

    let mut ctx = BuildContext::new(
        dev,
        geometry,
        options.timestamp_or_now(),
        options.root_owner,
    );
    ctx.bad = gather_bad_blocks(&mut ctx, options)?;
    write_unfinished_superblock(ctx.dev, &geometry)?;

    make_root_inode(&mut ctx)?;
    make_bad_inode(&mut ctx)?;
    ctx.good.mark_all(&mut ctx.alloc);

    let import = match &options.seed_dir {
        Some(dir) => Some(import_directory(&mut ctx, ROOT_INO, dir)?),
        None => None,
    };

    write_tables(ctx.dev, ctx.alloc.geometry(), &ctx.alloc, &ctx.inodes)?;
    debug!(target: "mfs::core", event = "build_complete", context = ?ctx);

    Ok(BuildReport {
        geometry,
        bad_blocks: ctx.bad,
        used_inodes: ctx.alloc.used_inodes(),
        used_zones: ctx.alloc.used_zones(),
        import,
    })
}
