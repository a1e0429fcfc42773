//! Copying a host directory tree into the image.
//!
//! Entries are visited in byte-wise name order so the same tree always
//! produces the same image. Problems with a single host entry (it vanished,
//! cannot be opened, has a type Minix cannot hold) are logged and the entry
//! is left out. Image-side failures abort the import, and so does a host
//! file that stops yielding data once its copy has started.

use mfs_block::BlockDevice;
use mfs_dir::{DirWriter, init_dir_block};
use mfs_error::{MfsError, Result};
use mfs_inode::extend;
use mfs_ondisk::Inode;
use mfs_types::{BLOCK_SIZE, InodeNumber, MinixFormat, old_encode_dev};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, File, Metadata};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::Path;
use tracing::{debug, warn};

use crate::context::BuildContext;

/// Entries imported and skipped, summed over the whole tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub imported: u32,
    pub skipped: u32,
}

impl std::ops::AddAssign for ImportStats {
    fn add_assign(&mut self, rhs: Self) {
        self.imported += rhs.imported;
        self.skipped += rhs.skipped;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostKind {
    Directory,
    Regular,
    Symlink,
    Device,
}

fn classify(meta: &Metadata) -> Option<HostKind> {
    let ft = meta.file_type();
    if ft.is_dir() {
        Some(HostKind::Directory)
    } else if ft.is_file() {
        Some(HostKind::Regular)
    } else if ft.is_symlink() {
        Some(HostKind::Symlink)
    } else if ft.is_char_device() || ft.is_block_device() {
        Some(HostKind::Device)
    } else {
        None
    }
}

fn clamp_time(secs: i64) -> u32 {
    u32::try_from(secs.max(0)).unwrap_or(u32::MAX)
}

#[expect(clippy::cast_possible_truncation)]
fn low_16(value: u32) -> u16 {
    value as u16
}

/// Inode fields carried over from the host. The v1 record keeps only what
/// fits when it is encoded.
fn inode_from_metadata(meta: &Metadata) -> Inode {
    let mut inode = Inode {
        mode: low_16(meta.mode()),
        uid: low_16(meta.uid()),
        gid: low_16(meta.gid()),
        nlinks: 1,
        atime: clamp_time(meta.atime()),
        mtime: clamp_time(meta.mtime()),
        ctime: clamp_time(meta.ctime()),
        ..Inode::default()
    };
    if inode.is_device() {
        inode.zones[0] = u32::from(old_encode_dev(meta.rdev()));
    }
    inode
}

fn sorted_names(host: &Path) -> Result<Vec<OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(host)? {
        match entry {
            Ok(entry) => names.push(entry.file_name()),
            Err(err) => warn!(
                target: "mfs::import",
                event = "readdir_failed",
                dir = %host.display(),
                error = %err
            ),
        }
    }
    names.sort();
    Ok(names)
}

fn allocate_from<D: BlockDevice + ?Sized>(
    ctx: &mut BuildContext<'_, D>,
    meta: &Metadata,
) -> Result<InodeNumber> {
    let ino = ctx.alloc.allocate_inode()?;
    *ctx.inodes.get_mut(ino)? = inode_from_metadata(meta);
    Ok(ino)
}

/// Copy `len` bytes of `file` into freshly extended zones.
///
/// A file that shrinks or fails to read after it was opened aborts the
/// build with `Io`. Its inode and some zones are already allocated by then,
/// so skipping it would leave a half-written file in the image.
fn copy_file<D: BlockDevice + ?Sized>(
    ctx: &mut BuildContext<'_, D>,
    ino: InodeNumber,
    mut file: File,
    len: u64,
) -> Result<()> {
    let format = ctx.format();
    let size = u32::try_from(len).map_err(|_| MfsError::FileTooLarge {
        index: len.div_ceil(BLOCK_SIZE as u64),
        max: format.max_file_blocks(),
    })?;
    let inode = ctx.inodes.get_mut(ino)?;
    let mut block = vec![0_u8; BLOCK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let chunk = usize::try_from(remaining.min(BLOCK_SIZE as u64)).unwrap_or(BLOCK_SIZE);
        let zone = extend(ctx.dev, &mut ctx.alloc, inode)?;
        block.fill(0);
        file.read_exact(&mut block[..chunk])?;
        ctx.dev.write_block(zone, &block)?;
        remaining -= chunk as u64;
    }
    inode.size = size;
    Ok(())
}

fn write_symlink<D: BlockDevice + ?Sized>(
    ctx: &mut BuildContext<'_, D>,
    ino: InodeNumber,
    target: &[u8],
) -> Result<()> {
    let inode = ctx.inodes.get_mut(ino)?;
    let zone = extend(ctx.dev, &mut ctx.alloc, inode)?;
    let mut block = vec![0_u8; BLOCK_SIZE];
    block[..target.len()].copy_from_slice(target);
    ctx.dev.write_block(zone, &block)?;
    inode.size = u32::try_from(target.len()).unwrap_or(u32::MAX);
    Ok(())
}

fn init_child_dir<D: BlockDevice + ?Sized>(
    ctx: &mut BuildContext<'_, D>,
    ino: InodeNumber,
    parent: InodeNumber,
    format: MinixFormat,
) -> Result<()> {
    let mut block = vec![0_u8; BLOCK_SIZE];
    init_dir_block(&mut block, ino, parent, format)?;
    let inode = ctx.inodes.get_mut(ino)?;
    let zone = extend(ctx.dev, &mut ctx.alloc, inode)?;
    ctx.dev.write_block(zone, &block)?;
    inode.size = 2 * format.dir_entry_size() as u32;
    inode.nlinks = 2;
    Ok(())
}

/// Copy the contents of `host` into directory `dir_ino`, recursively.
///
/// New entries are appended after whatever the directory already holds,
/// which must fit in its first zone with a slot to spare.
pub fn import_directory<D: BlockDevice + ?Sized>(
    ctx: &mut BuildContext<'_, D>,
    dir_ino: InodeNumber,
    host: &Path,
) -> Result<ImportStats> {
    let format = ctx.format();
    let mut dir = ctx.inodes.get(dir_ino)?.clone();
    let mut writer = DirWriter::resume(ctx.dev, format, &dir)?;
    let mut stats = ImportStats::default();

    for name in sorted_names(host)? {
        let path = host.join(&name);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(target: "mfs::import", event = "stat_failed", path = %path.display(), error = %err);
                stats.skipped += 1;
                continue;
            }
        };
        let Some(kind) = classify(&meta) else {
            warn!(
                target: "mfs::import",
                event = "unsupported_type",
                path = %path.display(),
                mode = format_args!("{:o}", meta.mode())
            );
            stats.skipped += 1;
            continue;
        };

        let ino = match kind {
            HostKind::Regular => {
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(err) => {
                        warn!(target: "mfs::import", event = "open_failed", path = %path.display(), error = %err);
                        stats.skipped += 1;
                        continue;
                    }
                };
                let ino = allocate_from(ctx, &meta)?;
                copy_file(ctx, ino, file, meta.len())?;
                ino
            }
            HostKind::Symlink => {
                let target = match fs::read_link(&path) {
                    Ok(target) => target,
                    Err(err) => {
                        warn!(target: "mfs::import", event = "readlink_failed", path = %path.display(), error = %err);
                        stats.skipped += 1;
                        continue;
                    }
                };
                let target = target.as_os_str().as_bytes();
                if target.len() > BLOCK_SIZE {
                    warn!(
                        target: "mfs::import",
                        event = "symlink_too_long",
                        path = %path.display(),
                        len = target.len()
                    );
                    stats.skipped += 1;
                    continue;
                }
                let ino = allocate_from(ctx, &meta)?;
                write_symlink(ctx, ino, target)?;
                ino
            }
            HostKind::Device => allocate_from(ctx, &meta)?,
            HostKind::Directory => {
                let max = format.link_max();
                if u32::from(dir.nlinks) >= max {
                    return Err(MfsError::TooManyLinks { ino: dir_ino.0, max });
                }
                let ino = allocate_from(ctx, &meta)?;
                init_child_dir(ctx, ino, dir_ino, format)?;
                dir.nlinks += 1;
                stats += import_directory(ctx, ino, &path)?;
                ino
            }
        };

        debug!(
            target: "mfs::import",
            event = "entry_imported",
            name = %name.to_string_lossy(),
            size = meta.len(),
            host_ino = meta.ino(),
            ino = ino.0
        );
        writer.push(ctx.dev, &mut ctx.alloc, &mut dir, ino, name.as_bytes())?;
        stats.imported += 1;
    }

    writer.finish(ctx.dev, &mut dir)?;
    *ctx.inodes.get_mut(dir_ino)? = dir;
    Ok(stats)
}
