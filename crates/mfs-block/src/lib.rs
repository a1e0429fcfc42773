#![forbid(unsafe_code)]
//! Block I/O layer.
//!
//! Provides the `ByteDevice` trait (pread/pwrite semantics over a file, block
//! device or memory buffer) and the block-addressed `BlockDevice` trait every
//! builder component writes through. Block-sized transfers are all-or-nothing:
//! a short transfer is an error, never a partial success. The one exception is
//! [`ByteDevice::read_at`], which reports how much was readable so the
//! bad-block scanner can locate failing sectors.

use mfs_error::{MfsError, Result};
use mfs_types::{BLOCK_SIZE, BlockNumber};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom};
use std::os::unix::fs::{FileExt, FileTypeExt, MetadataExt};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Owned block buffer.
///
/// Invariant: length == `BLOCK_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBuf {
    bytes: Vec<u8>,
}

impl BlockBuf {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            bytes: vec![0_u8; BLOCK_SIZE],
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }
}

/// Byte-addressed device for fixed-offset I/O (pread/pwrite semantics).
pub trait ByteDevice: Send + Sync {
    /// Total length in bytes.
    fn len_bytes(&self) -> u64;

    /// Read as many bytes as the device yields at `offset`, stopping at end
    /// of device or at the first failing sector. Returns the count read;
    /// `Err` only when nothing at all could be read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` to `offset`.
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

fn check_range(offset: u64, len: usize, dev_len: u64, op: &str) -> Result<()> {
    let end = offset
        .checked_add(
            u64::try_from(len)
                .map_err(|_| MfsError::Format(format!("{op} length overflows u64")))?,
        )
        .ok_or_else(|| MfsError::Format(format!("{op} range overflows u64")))?;
    if end > dev_len {
        return Err(MfsError::Format(format!(
            "{op} out of bounds: offset={offset} len={len} device_len={dev_len}"
        )));
    }
    Ok(())
}

/// File-backed byte device (regular image file or block special file).
///
/// Uses `std::os::unix::fs::FileExt`, so no shared seek position is needed.
#[derive(Debug, Clone)]
pub struct FileByteDevice {
    file: Arc<File>,
    len: u64,
    writable: bool,
    block_device: bool,
    rdev: u64,
}

impl FileByteDevice {
    /// Open read-write, falling back to read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path.as_ref())
                    .map(|file| (file, false))
            })?;
        Self::from_file(file, writable)
    }

    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path.as_ref())?;
        Self::from_file(file, false)
    }

    fn from_file(file: File, writable: bool) -> Result<Self> {
        let meta = file.metadata()?;
        let block_device = meta.file_type().is_block_device();
        let len = if block_device {
            // Block special files report zero length through metadata.
            let mut handle = &file;
            let end = handle.seek(SeekFrom::End(0))?;
            handle.seek(SeekFrom::Start(0))?;
            if end == 0 {
                count_readable_bytes(&file)
            } else {
                end
            }
        } else {
            meta.len()
        };
        debug!(
            target: "mfs::block",
            event = "device_open",
            len,
            writable,
            block_device
        );
        Ok(Self {
            file: Arc::new(file),
            len,
            writable,
            block_device,
            rdev: meta.rdev(),
        })
    }

    #[must_use]
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    #[must_use]
    pub fn is_block_device(&self) -> bool {
        self.block_device
    }

    /// Raw device number of a block special file (0 for regular files).
    #[must_use]
    pub fn rdev(&self) -> u64 {
        if self.block_device { self.rdev } else { 0 }
    }

    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Grow a regular image file to at least `len` bytes.
    ///
    /// Block devices cannot grow; asking for more than they hold is an error.
    pub fn ensure_len(&mut self, len: u64) -> Result<()> {
        if len <= self.len {
            return Ok(());
        }
        if self.block_device {
            return Err(MfsError::Format(format!(
                "device holds {} bytes, {len} requested",
                self.len
            )));
        }
        if !self.writable {
            return Err(std::io::Error::from(ErrorKind::PermissionDenied).into());
        }
        self.file.set_len(len)?;
        debug!(target: "mfs::block", event = "image_grow", from = self.len, to = len);
        self.len = len;
        Ok(())
    }
}

fn readable_at(file: &File, offset: u64) -> bool {
    let mut byte = [0_u8; 1];
    matches!(file.read_at(&mut byte, offset), Ok(1))
}

/// Size of a device that does not report its length: double the probe
/// offset until a read fails, then binary-search the boundary.
fn count_readable_bytes(file: &File) -> u64 {
    let mut low = 0_u64;
    let mut high = 1_u64;
    while readable_at(file, high) {
        low = high;
        match high.checked_mul(2) {
            Some(next) => high = next,
            None => return high,
        }
    }
    while low < high - 1 {
        let mid = low + (high - low) / 2;
        if readable_at(file, mid) {
            low = mid;
        } else {
            high = mid;
        }
    }
    if low == 0 && !readable_at(file, 0) {
        return 0;
    }
    low + 1
}

impl ByteDevice for FileByteDevice {
    fn len_bytes(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut got = 0_usize;
        while got < buf.len() {
            match self.file.read_at(&mut buf[got..], offset + got as u64) {
                Ok(0) => break,
                Ok(n) => got += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    if got == 0 {
                        return Err(err.into());
                    }
                    break;
                }
            }
        }
        Ok(got)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len(), self.len, "read")?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(std::io::Error::from(ErrorKind::PermissionDenied).into());
        }
        check_range(offset, buf.len(), self.len, "write")?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory byte device, used for tests and for building images in RAM.
#[derive(Debug)]
pub struct MemByteDevice {
    bytes: Mutex<Vec<u8>>,
}

impl MemByteDevice {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0_u8; len]),
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes.into_inner()
    }
}

impl ByteDevice for MemByteDevice {
    fn len_bytes(&self) -> u64 {
        self.bytes.lock().len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.bytes.lock();
        let start = usize::try_from(offset)
            .map_err(|_| MfsError::Format("offset overflow".into()))?
            .min(bytes.len());
        let n = buf.len().min(bytes.len() - start);
        buf[..n].copy_from_slice(&bytes[start..start + n]);
        drop(bytes);
        Ok(n)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let bytes = self.bytes.lock();
        check_range(offset, buf.len(), bytes.len() as u64, "read")?;
        let start = usize::try_from(offset).map_err(|_| MfsError::Format("offset overflow".into()))?;
        buf.copy_from_slice(&bytes[start..start + buf.len()]);
        drop(bytes);
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock();
        check_range(offset, buf.len(), bytes.len() as u64, "write")?;
        let start = usize::try_from(offset).map_err(|_| MfsError::Format("offset overflow".into()))?;
        bytes[start..start + buf.len()].copy_from_slice(buf);
        drop(bytes);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// Block-addressed I/O interface.
pub trait BlockDevice: Send + Sync {
    /// Read a block by number.
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf>;

    /// Write a block by number. `data.len()` MUST equal `BLOCK_SIZE`.
    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()>;

    /// Write `data` (a whole number of blocks) starting at `start`.
    fn write_blocks(&self, start: BlockNumber, data: &[u8]) -> Result<()>;

    /// Total number of blocks.
    fn block_count(&self) -> u32;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()>;
}

/// Fixed 1 KiB block view over a [`ByteDevice`].
#[derive(Debug)]
pub struct ByteBlockDevice<D: ByteDevice> {
    inner: D,
    block_count: u32,
}

impl<D: ByteDevice> ByteBlockDevice<D> {
    /// View the whole device; a trailing partial block is ignored.
    pub fn new(inner: D) -> Result<Self> {
        let len = inner.len_bytes();
        let blocks = len / BLOCK_SIZE as u64;
        let remainder = len % BLOCK_SIZE as u64;
        if remainder != 0 {
            debug!(
                target: "mfs::block",
                event = "trailing_partial_block",
                len_bytes = len,
                remainder
            );
        }
        let block_count = u32::try_from(blocks).unwrap_or(u32::MAX);
        Ok(Self { inner, block_count })
    }

    /// View only the first `blocks` blocks of the device.
    pub fn with_block_count(inner: D, blocks: u32) -> Result<Self> {
        let available = inner.len_bytes() / BLOCK_SIZE as u64;
        if u64::from(blocks) > available {
            return Err(MfsError::Format(format!(
                "device holds {available} blocks, {blocks} requested"
            )));
        }
        Ok(Self {
            inner,
            block_count: blocks,
        })
    }

    #[must_use]
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn into_inner(self) -> D {
        self.inner
    }

    fn check_block(&self, block: BlockNumber, op: &str) -> Result<()> {
        if block.0 >= self.block_count {
            return Err(MfsError::Format(format!(
                "{op} block out of range: block={} block_count={}",
                block.0, self.block_count
            )));
        }
        Ok(())
    }
}

impl<D: ByteDevice> BlockDevice for ByteBlockDevice<D> {
    fn read_block(&self, block: BlockNumber) -> Result<BlockBuf> {
        self.check_block(block, "read")?;
        let mut buf = vec![0_u8; BLOCK_SIZE];
        self.inner
            .read_exact_at(block.byte_offset(), &mut buf)
            .map_err(|err| match err {
                MfsError::Io(io) if io.kind() == ErrorKind::UnexpectedEof => MfsError::ShortIo {
                    op: "read",
                    block: u64::from(block.0),
                },
                other => other,
            })?;
        Ok(BlockBuf::new(buf))
    }

    fn write_block(&self, block: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(MfsError::Format(format!(
                "write_block data size mismatch: got={} expected={BLOCK_SIZE}",
                data.len()
            )));
        }
        self.check_block(block, "write")?;
        self.inner.write_all_at(block.byte_offset(), data)
    }

    fn write_blocks(&self, start: BlockNumber, data: &[u8]) -> Result<()> {
        if data.len() % BLOCK_SIZE != 0 {
            return Err(MfsError::Format(format!(
                "write_blocks length {} is not a multiple of {BLOCK_SIZE}",
                data.len()
            )));
        }
        let count = u32::try_from(data.len() / BLOCK_SIZE)
            .map_err(|_| MfsError::Format("write_blocks span overflows u32".to_owned()))?;
        if count == 0 {
            return Ok(());
        }
        let last = start
            .checked_add(count - 1)
            .ok_or_else(|| MfsError::Format("write_blocks span overflows u32".to_owned()))?;
        self.check_block(last, "write")?;
        self.inner.write_all_at(start.byte_offset(), data)
    }

    fn block_count(&self) -> u32 {
        self.block_count
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }
}
