//! End-to-end builds read back through `Image`.

use mfs_core::{
    BadBlockSource, BlockDevice, ByteBlockDevice, ByteDevice, FileByteDevice, FsVersion, Image, InodeNumber,
    MemByteDevice, MfsError, MkfsOptions, NameLen, build_image,
};
use mfs_ondisk::ZoneBlock;
use mfs_types::{BLOCK_SIZE, BlockNumber, DOUBLE_INDIRECT_SLOT, INDIRECT_SLOT, ROOT_INO};
use proptest::prelude::*;
use std::fs;
use std::path::Path;

fn image_file(dir: &Path, blocks: u64) -> std::path::PathBuf {
    let path = dir.join("minix.img");
    let file = fs::File::create(&path).expect("create");
    file.set_len(blocks * BLOCK_SIZE as u64).expect("size");
    path
}

fn build_file(path: &Path, options: &MkfsOptions) -> Result<mfs_core::BuildReport, MfsError> {
    let dev = ByteBlockDevice::new(FileByteDevice::open(path).expect("open")).expect("dev");
    build_image(&dev, options)
}

fn build_mem(blocks: usize, options: &MkfsOptions) -> Image<ByteBlockDevice<MemByteDevice>> {
    let dev = ByteBlockDevice::new(MemByteDevice::new(blocks * BLOCK_SIZE)).expect("dev");
    build_image(&dev, options).expect("build");
    Image::from_device(dev).expect("open image")
}

fn options(version: FsVersion, name_len: NameLen) -> MkfsOptions {
    MkfsOptions {
        version,
        name_len,
        timestamp: Some(1_700_000_000),
        ..MkfsOptions::default()
    }
}

fn ino_of<D: BlockDevice>(image: &Image<D>, path: &str) -> InodeNumber {
    image.lookup(path).expect("lookup").expect("present")
}

#[test]
fn floppy_v1_14_on_image_file() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = image_file(dir.path(), 1440);
    let report = build_file(&path, &options(FsVersion::V1, NameLen::Short14)).expect("build");
    assert!(report.bad_blocks.is_empty());

    let image = Image::open(&path).expect("open");
    let summary = image.summary().expect("summary");
    assert_eq!(summary.inodes, 480);
    assert_eq!(summary.magic, 0x137F);
    assert_eq!(summary.first_data_zone, 19);
    assert_eq!(summary.zones, 1440);
    assert!(summary.clean);
    assert_eq!(summary.bad_blocks, 0);
    assert_eq!(summary.root_entries, vec![".", ".."]);

    let root = image.inode(ROOT_INO).expect("root");
    assert_eq!(root.size, 32);
    let raw = fs::read(&path).expect("read");
    let root_block = root.zones[0] as usize * BLOCK_SIZE;
    assert!(raw[root_block + 32..root_block + 48].iter().all(|&b| b == 0));
    image.verify_zone_map().expect("zone map");
}

#[test]
fn bad_block_in_metadata_fails_before_any_write() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = image_file(dir.path(), 1440);
    let list = dir.path().join("bad.txt");
    fs::write(&list, "200\n5\n").expect("list");
    let opts = MkfsOptions {
        bad_blocks: BadBlockSource::List(list),
        ..options(FsVersion::V1, NameLen::Short14)
    };
    let err = build_file(&path, &opts).expect_err("metadata bad block");
    assert!(matches!(err, MfsError::BadBlockInMetadata { block: 5, first_data_zone: 19 }));
    assert!(err.is_configuration());
    assert!(fs::read(&path).expect("read").iter().all(|&b| b == 0));
}

#[test]
fn listed_bad_blocks_become_inode_two() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = image_file(dir.path(), 1440);
    let list = dir.path().join("bad.txt");
    fs::write(&list, "300 100\n200 100\n").expect("list");
    let opts = MkfsOptions {
        bad_blocks: BadBlockSource::List(list),
        ..options(FsVersion::V2, NameLen::Long30)
    };
    let report = build_file(&path, &opts).expect("build");
    assert_eq!(report.summary_lines().last().map(String::as_str), Some("3 bad blocks"));

    let image = Image::open(&path).expect("open");
    let summary = image.summary().expect("summary");
    assert_eq!(summary.root_entries, vec![".", "..", ".badblocks"]);
    assert_eq!(summary.bad_blocks, 3);
    let bad = image.inode(InodeNumber(2)).expect("bad inode");
    assert_eq!(&bad.zones[..4], &[100, 200, 300, 0]);
    assert_eq!(image.lookup(".badblocks").expect("lookup"), Some(InodeNumber(2)));
    image.verify_zone_map().expect("zone map");
}

#[test]
fn scan_of_clean_image_finds_nothing() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = image_file(dir.path(), 2000);
    let opts = MkfsOptions {
        bad_blocks: BadBlockSource::Scan,
        progress_interval_secs: 1,
        ..options(FsVersion::V2, NameLen::Short14)
    };
    let report = build_file(&path, &opts).expect("build");
    assert!(report.bad_blocks.is_empty());
    assert!(Image::open(&path).expect("open").superblock().is_valid());
}

#[test]
fn three_kilobyte_file_uses_three_direct_zones() {
    let seed = tempfile::tempdir().expect("seed");
    let content: Vec<u8> = (0..3000_u32).map(|i| (i % 251) as u8).collect();
    fs::write(seed.path().join("data"), &content).expect("write");
    let opts = MkfsOptions {
        seed_dir: Some(seed.path().to_path_buf()),
        ..options(FsVersion::V1, NameLen::Long30)
    };
    let image = build_mem(1440, &opts);
    let ino = ino_of(&image, "data");
    let inode = image.inode(ino).expect("inode");
    assert_eq!(inode.size, 3000);
    assert!(inode.zones[..3].iter().all(|&z| z != 0));
    assert!(inode.zones[3..].iter().all(|&z| z == 0));
    assert_eq!(image.read_file(ino).expect("read"), content);
    image.verify_zone_map().expect("zone map");
}

fn check_tier_boundaries(version: FsVersion, ptrs: usize, blocks: usize) {
    let sizes = [
        7 * BLOCK_SIZE,
        7 * BLOCK_SIZE + 1,
        (7 + ptrs) * BLOCK_SIZE,
        (7 + ptrs) * BLOCK_SIZE + 1,
    ];
    let seed = tempfile::tempdir().expect("seed");
    for (i, size) in sizes.iter().enumerate() {
        let content: Vec<u8> = (0..*size).map(|b| (b * 7 + i) as u8).collect();
        fs::write(seed.path().join(format!("f{i}")), content).expect("write");
    }
    let opts = MkfsOptions {
        seed_dir: Some(seed.path().to_path_buf()),
        ..options(version, NameLen::Long30)
    };
    let image = build_mem(blocks, &opts);
    assert_eq!(image.format().ptrs_per_block() as usize, ptrs);

    let tiers: Vec<(bool, bool)> = (0..sizes.len())
        .map(|i| {
            let inode = image.inode(ino_of(&image, &format!("f{i}"))).expect("inode");
            (
                inode.zones[INDIRECT_SLOT] != 0,
                inode.zones[DOUBLE_INDIRECT_SLOT] != 0,
            )
        })
        .collect();
    assert_eq!(
        tiers,
        vec![(false, false), (true, false), (true, false), (true, true)]
    );
    for (i, size) in sizes.iter().enumerate() {
        let expected: Vec<u8> = (0..*size).map(|b| (b * 7 + i) as u8).collect();
        let ino = ino_of(&image, &format!("f{i}"));
        assert_eq!(image.read_file(ino).expect("read"), expected, "file f{i}");
    }
    image.verify_zone_map().expect("zone map");
}

#[test]
fn tier_boundaries_round_trip_v2() {
    check_tier_boundaries(FsVersion::V2, 256, 2048);
}

#[test]
fn tier_boundaries_round_trip_v1() {
    check_tier_boundaries(FsVersion::V1, 512, 2048);
}

#[test]
fn double_indirect_chains_several_leaves() {
    let seed = tempfile::tempdir().expect("seed");
    // v1: 512 pointers per block; 600 blocks past the indirect tier need
    // two leaves
    let blocks = 7 + 512 + 600;
    let content: Vec<u8> = (0..blocks * BLOCK_SIZE).map(|b| (b / BLOCK_SIZE) as u8).collect();
    fs::write(seed.path().join("big"), &content).expect("write");
    let opts = MkfsOptions {
        seed_dir: Some(seed.path().to_path_buf()),
        ..options(FsVersion::V1, NameLen::Short14)
    };
    let image = build_mem(4096, &opts);
    let format = image.format();
    let inode = image.inode(ino_of(&image, "big")).expect("inode");

    let outer_zone = inode.zones[DOUBLE_INDIRECT_SLOT];
    assert_ne!(outer_zone, 0);
    let outer = ZoneBlock::from_bytes(
        image
            .device()
            .read_block(BlockNumber(outer_zone))
            .expect("outer")
            .into_inner(),
        format,
    )
    .expect("pointers");
    let leaves: Vec<u32> = outer.iter_nonzero().collect();
    assert_eq!(leaves.len(), 2);
    for leaf in &leaves {
        assert!(image.zone_in_use(*leaf));
    }
    assert!(image.zone_in_use(inode.zones[INDIRECT_SLOT]));
    assert!(image.zone_in_use(outer_zone));

    assert_eq!(image.read_file(ino_of(&image, "big")).expect("read"), content);
    image.verify_zone_map().expect("zone map");
    // data + indirect + outer + two leaves, the root zone
    assert_eq!(image.summary().expect("summary").used_zones as usize, blocks + 4 + 1);
}

#[test]
fn every_directory_starts_with_dot_and_dotdot() {
    let seed = tempfile::tempdir().expect("seed");
    fs::create_dir_all(seed.path().join("a/b/c")).expect("mkdir");
    fs::create_dir(seed.path().join("d")).expect("mkdir");
    fs::write(seed.path().join("a/b/file"), b"x").expect("write");
    let opts = MkfsOptions {
        seed_dir: Some(seed.path().to_path_buf()),
        ..options(FsVersion::V2, NameLen::Short14)
    };
    let image = build_mem(1440, &opts);

    let mut stack = vec![(ROOT_INO, ROOT_INO)];
    let mut seen = 0;
    while let Some((ino, parent)) = stack.pop() {
        let entries = image.list_dir(ino).expect("list");
        assert_eq!(entries[0].name, b".");
        assert_eq!(u32::from(entries[0].inode), ino.0);
        assert_eq!(entries[1].name, b"..");
        assert_eq!(u32::from(entries[1].inode), parent.0);
        let subdirs = entries[2..]
            .iter()
            .map(|e| InodeNumber(u32::from(e.inode)))
            .filter(|child| image.inode(*child).expect("child").is_dir())
            .collect::<Vec<_>>();
        assert_eq!(
            u32::from(image.inode(ino).expect("dir").nlinks),
            2 + u32::try_from(subdirs.len()).expect("count")
        );
        stack.extend(subdirs.into_iter().map(|child| (child, ino)));
        seen += 1;
    }
    assert_eq!(seen, 5);
    assert_eq!(image.read_file(ino_of(&image, "a/b/file")).expect("read"), b"x");
}

#[test]
fn zone_map_is_rejected_when_a_zone_leaks() {
    let dev = ByteBlockDevice::new(MemByteDevice::new(1440 * BLOCK_SIZE)).expect("dev");
    let report = build_image(&dev, &options(FsVersion::V1, NameLen::Long30)).expect("build");
    // mark one extra data zone by hand
    let zone_map = report.geometry.zone_bitmap_start();
    let mut block = dev.read_block(zone_map).expect("read");
    block.as_mut_slice()[10] |= 0x01;
    dev.write_block(zone_map, block.as_slice()).expect("write");
    let image = Image::from_device(dev).expect("open");
    assert!(matches!(
        image.verify_zone_map(),
        Err(MfsError::Corruption { .. })
    ));
}

#[test]
fn aborted_rebuild_leaves_superblock_unclean() {
    let dev = ByteBlockDevice::new(MemByteDevice::new(200 * BLOCK_SIZE)).expect("dev");
    let opts = options(FsVersion::V1, NameLen::Long30);
    build_image(&dev, &opts).expect("first build");

    let seed = tempfile::tempdir().expect("seed");
    fs::write(seed.path().join("huge"), vec![0x5A_u8; 400 * BLOCK_SIZE]).expect("write");
    let rebuild = MkfsOptions {
        seed_dir: Some(seed.path().to_path_buf()),
        ..opts
    };
    let err = build_image(&dev, &rebuild).expect_err("image too small for the seed");
    assert!(matches!(err, MfsError::NoFreeZones));

    let image = Image::from_device(dev).expect("open");
    assert!(!image.superblock().is_valid());
}

#[test]
fn listed_bad_blocks_reach_double_indirect_tier() {
    let dir = tempfile::tempdir().expect("tmp");
    let list = dir.path().join("bad.txt");
    let bad: Vec<u32> = (1000..1300).collect();
    let text: Vec<String> = bad.iter().map(u32::to_string).collect();
    fs::write(&list, text.join("\n")).expect("list");
    let opts = MkfsOptions {
        bad_blocks: BadBlockSource::List(list),
        ..options(FsVersion::V2, NameLen::Long30)
    };
    let image = build_mem(4096, &opts);

    let summary = image.summary().expect("summary");
    assert_eq!(summary.bad_blocks, 300);
    assert_eq!(summary.root_entries, vec![".", "..", ".badblocks"]);
    let inode = image.inode(InodeNumber(2)).expect("bad inode");
    // 7 direct + 256 single-indirect leaves 37 for the double-indirect tier
    assert_ne!(inode.zones[INDIRECT_SLOT], 0);
    assert_ne!(inode.zones[DOUBLE_INDIRECT_SLOT], 0);
    let referenced = image.referenced_zones().expect("zones");
    assert!(bad.iter().all(|zone| referenced.contains(zone)));
    // bad zones, root zone, indirect, outer and one leaf
    assert_eq!(summary.used_zones, 300 + 4);
    image.verify_zone_map().expect("zone map");
}

/// Memory device whose listed blocks fail to read.
struct FaultyDevice {
    inner: MemByteDevice,
    bad: Vec<u32>,
}

impl ByteDevice for FaultyDevice {
    fn len_bytes(&self) -> u64 {
        self.inner.len_bytes()
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> mfs_core::Result<usize> {
        let first = offset / BLOCK_SIZE as u64;
        let blocks = (buf.len() / BLOCK_SIZE) as u64;
        let failing = self
            .bad
            .iter()
            .map(|&b| u64::from(b))
            .find(|&b| b >= first && b < first + blocks);
        match failing {
            Some(b) if b == first => Err(std::io::Error::other("injected read failure").into()),
            Some(b) => {
                let good = ((b - first) as usize) * BLOCK_SIZE;
                self.inner.read_at(offset, &mut buf[..good])
            }
            None => self.inner.read_at(offset, buf),
        }
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> mfs_core::Result<()> {
        self.inner.read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> mfs_core::Result<()> {
        self.inner.write_all_at(offset, buf)
    }

    fn sync(&self) -> mfs_core::Result<()> {
        Ok(())
    }
}

#[test]
fn scan_of_faulty_medium_builds_bad_inode() {
    let faulty = FaultyDevice {
        inner: MemByteDevice::new(1440 * BLOCK_SIZE),
        bad: vec![300, 301, 777],
    };
    let dev = ByteBlockDevice::new(faulty).expect("dev");
    let opts = MkfsOptions {
        bad_blocks: BadBlockSource::Scan,
        progress_interval_secs: 1,
        ..options(FsVersion::V1, NameLen::Long30)
    };
    let report = build_image(&dev, &opts).expect("build");
    assert_eq!(
        report.bad_blocks.iter().map(|b| b.0).collect::<Vec<_>>(),
        vec![300, 301, 777]
    );
    assert_eq!(report.summary_lines().last().map(String::as_str), Some("3 bad blocks"));

    let image = Image::from_device(dev).expect("open");
    assert!(image.superblock().is_valid());
    let inode = image.inode(InodeNumber(2)).expect("bad inode");
    assert_eq!(&inode.zones[..4], &[300, 301, 777, 0]);
    assert_eq!(image.summary().expect("summary").bad_blocks, 3);
    image.verify_zone_map().expect("zone map");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn files_of_any_size_round_trip(size in 0_usize..(7 + 256 + 40) * BLOCK_SIZE, seed_byte in any::<u8>()) {
        let seed = tempfile::tempdir().expect("seed");
        let content: Vec<u8> = (0..size).map(|b| (b as u8) ^ seed_byte).collect();
        fs::write(seed.path().join("blob"), &content).expect("write");
        let opts = MkfsOptions {
            seed_dir: Some(seed.path().to_path_buf()),
            ..options(FsVersion::V2, NameLen::Long30)
        };
        let image = build_mem(1024, &opts);
        let ino = ino_of(&image, "blob");
        prop_assert_eq!(image.inode(ino).expect("inode").size as usize, size);
        prop_assert_eq!(image.read_file(ino).expect("read"), content);
        prop_assert!(image.verify_zone_map().is_ok());
    }
}
