//! State of one image build.

use mfs_alloc::{Allocator, Geometry, GoodBlocks};
use mfs_badblocks::BadBlocks;
use mfs_block::BlockDevice;
use mfs_inode::InodeTable;
use mfs_types::MinixFormat;

use crate::options::RootOwner;

/// Everything a build mutates, owned in one place and threaded through each
/// stage.
pub struct BuildContext<'a, D: BlockDevice + ?Sized> {
    pub dev: &'a D,
    pub alloc: Allocator,
    pub inodes: InodeTable,
    pub good: GoodBlocks,
    pub bad: BadBlocks,
    /// Stamped on inodes the builder creates itself.
    pub timestamp: u32,
    pub root_owner: RootOwner,
}

impl<'a, D: BlockDevice + ?Sized> BuildContext<'a, D> {
    #[must_use]
    pub fn new(dev: &'a D, geometry: Geometry, timestamp: u32, root_owner: RootOwner) -> Self {
        Self {
            dev,
            inodes: InodeTable::new(geometry.format, geometry.inodes),
            alloc: Allocator::new(geometry),
            good: GoodBlocks::new(),
            bad: BadBlocks::new(),
            timestamp,
            root_owner,
        }
    }

    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        self.alloc.geometry()
    }

    #[must_use]
    pub fn format(&self) -> MinixFormat {
        self.alloc.geometry().format
    }
}

impl<D: BlockDevice + ?Sized> std::fmt::Debug for BuildContext<'_, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("geometry", self.geometry())
            .field("bad_blocks", &self.bad.len())
            .field("good_blocks", &self.good.zones().len())
            .field("used_inodes", &self.alloc.used_inodes())
            .field("used_zones", &self.alloc.used_zones())
            .finish_non_exhaustive()
    }
}
