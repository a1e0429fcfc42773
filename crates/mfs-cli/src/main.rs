#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use mfs::{
    BadBlockSource, ByteBlockDevice, FileByteDevice, FsVersion, Image, ImageSummary, MkfsOptions,
    NameLen, RootOwner, build_image, check_not_mounted, check_refused_device,
};
use serde::Serialize;
use std::env;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_subscriber::EnvFilter;

const BLOCK_SIZE: u64 = 1024;

fn main() {
    init_tracing();
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "mkfs" => mkfs(parse_mkfs_args(args)?),
        "inspect" => {
            let Some(path) = args.next() else {
                bail!("inspect requires an image path");
            };
            let rest: Vec<String> = args.collect();
            let json = rest.iter().any(|a| a == "--json");
            let verify = rest.iter().any(|a| a == "--verify");
            inspect(Path::new(&path), json, verify)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("mfs-cli\n");
    println!("USAGE:");
    println!("  mfs-cli mkfs [-c | -l badblocks-file] [-n 14|30] [-i inodes] [-1 | -2 | -v]");
    println!("               [-d seed-dir] [--config options.json] [--json] device [blocks]");
    println!("  mfs-cli inspect <image-path> [--json] [--verify]");
}

#[derive(Debug, Default)]
struct MkfsArgs {
    config: Option<PathBuf>,
    check: bool,
    list: Option<PathBuf>,
    name_len: Option<NameLen>,
    inodes: Option<u32>,
    version: Option<FsVersion>,
    seed_dir: Option<PathBuf>,
    json: bool,
    device: Option<PathBuf>,
    blocks: Option<u64>,
}

/// Value of an option given either attached (`-n14`) or as the next
/// argument (`-n 14`).
fn option_value(
    flag: &str,
    attached: &str,
    args: &mut impl Iterator<Item = String>,
) -> Result<String> {
    if attached.is_empty() {
        args.next()
            .with_context(|| format!("{flag} requires a value"))
    } else {
        Ok(attached.to_owned())
    }
}

fn parse_number<T: std::str::FromStr>(flag: &str, text: &str) -> Result<T> {
    text.parse()
        .ok()
        .with_context(|| format!("{flag}: '{text}' is not a number"))
}

fn parse_mkfs_args(mut args: impl Iterator<Item = String>) -> Result<MkfsArgs> {
    let mut parsed = MkfsArgs::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => parsed.config = Some(option_value("--config", "", &mut args)?.into()),
            "--json" => parsed.json = true,
            "-c" => parsed.check = true,
            "-1" => parsed.version = Some(FsVersion::V1),
            "-2" | "-v" => parsed.version = Some(FsVersion::V2),
            "-l" => parsed.list = Some(option_value("-l", "", &mut args)?.into()),
            "-d" => parsed.seed_dir = Some(option_value("-d", "", &mut args)?.into()),
            flag if flag.starts_with("-n") => {
                let value = option_value("-n", &flag[2..], &mut args)?;
                parsed.name_len = Some(match parse_number::<u8>("-n", &value)? {
                    14 => NameLen::Short14,
                    30 => NameLen::Long30,
                    other => bail!("-n: unsupported name length {other} (must be 14 or 30)"),
                });
            }
            flag if flag.starts_with("-i") => {
                let value = option_value("-i", &flag[2..], &mut args)?;
                parsed.inodes = Some(parse_number("-i", &value)?);
            }
            flag if flag.starts_with('-') => bail!("unknown option: {flag}"),
            positional => {
                if parsed.device.is_none() {
                    parsed.device = Some(positional.into());
                } else if parsed.blocks.is_none() {
                    parsed.blocks = Some(parse_number("blocks", positional)?);
                } else {
                    bail!("unexpected argument: {positional}");
                }
            }
        }
    }
    if parsed.check && parsed.list.is_some() {
        bail!("-c and -l cannot be used together");
    }
    Ok(parsed)
}

/// The invoking user, as the kernel reports it for this process.
fn process_owner() -> RootOwner {
    std::fs::metadata("/proc/self").map_or_else(
        |_| RootOwner::default(),
        |meta| RootOwner {
            uid: meta.uid(),
            gid: meta.gid(),
        },
    )
}

fn resolve_options(args: &MkfsArgs) -> Result<MkfsOptions> {
    let mut options = match &args.config {
        Some(path) => MkfsOptions::from_json_file(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => MkfsOptions {
            root_owner: process_owner(),
            ..MkfsOptions::default()
        },
    };
    if let Some(version) = args.version {
        options.version = version;
    }
    if let Some(name_len) = args.name_len {
        options.name_len = name_len;
    }
    if let Some(inodes) = args.inodes {
        options.inodes = inodes;
    }
    if let Some(dir) = &args.seed_dir {
        options.seed_dir = Some(dir.clone());
    }
    if args.blocks.is_some() {
        options.blocks = args.blocks;
    }
    if args.check {
        options.bad_blocks = BadBlockSource::Scan;
    } else if let Some(list) = &args.list {
        options.bad_blocks = BadBlockSource::List(list.clone());
    }
    Ok(options)
}

#[derive(Debug, Serialize)]
struct MkfsOutput<'a> {
    device: &'a Path,
    report: &'a mfs::BuildReport,
}

fn mkfs(args: MkfsArgs) -> Result<()> {
    let Some(device) = args.device.clone() else {
        print_usage();
        bail!("mkfs requires a device");
    };
    let mut options = resolve_options(&args)?;

    check_not_mounted(&device)?;
    let mut file = FileByteDevice::open(&device)
        .with_context(|| format!("unable to open {}", device.display()))?;
    if !file.is_writable() {
        bail!("unable to open {} for writing", device.display());
    }
    check_refused_device(&device, file.rdev())?;

    if options.bad_blocks == BadBlockSource::Scan && !file.is_block_device() {
        warn!(
            event = "scan_disabled",
            device = %device.display(),
            "bad-block scan needs a block device; skipping"
        );
        options.bad_blocks = BadBlockSource::None;
    }
    if let Some(blocks) = options.blocks {
        if !file.is_block_device() {
            file.ensure_len(blocks.saturating_mul(BLOCK_SIZE))
                .with_context(|| format!("unable to size {}", device.display()))?;
        }
    }

    let dev = ByteBlockDevice::new(file)?;
    let report = build_image(&dev, &options)
        .with_context(|| format!("failed to make filesystem on {}", device.display()))?;

    if args.json {
        let output = MkfsOutput {
            device: &device,
            report: &report,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize report")?
        );
    } else {
        for line in report.summary_lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn print_summary(summary: &ImageSummary) {
    println!("Minix Inspector");
    println!("version: {:?}", summary.version);
    println!("name_len: {}", summary.name_len);
    println!("magic: {:#06x}", summary.magic);
    println!("inodes: {} ({} used)", summary.inodes, summary.used_inodes);
    println!("zones: {} ({} data zones used)", summary.zones, summary.used_zones);
    println!("imap_blocks: {}", summary.imap_blocks);
    println!("zmap_blocks: {}", summary.zmap_blocks);
    println!("first_data_zone: {}", summary.first_data_zone);
    println!("max_size: {}", summary.max_size);
    println!("clean: {}", summary.clean);
    println!("bad_blocks: {}", summary.bad_blocks);
    println!("root: {}", summary.root_entries.join(" "));
}

fn inspect(path: &Path, json: bool, verify: bool) -> Result<()> {
    let image = Image::open(path)
        .with_context(|| format!("failed to read minix metadata in {}", path.display()))?;
    let summary = image.summary().context("summarize image")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize output")?
        );
    } else {
        print_summary(&summary);
    }

    if verify {
        image
            .verify_zone_map()
            .context("zone bitmap does not match the inode chains")?;
        if !json {
            println!("zone bitmap: consistent");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| (*s).to_owned()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_classic_flags() {
        let parsed =
            parse_mkfs_args(args(&["-n14", "-i", "64", "-v", "-l", "bad.txt", "disk.img", "2880"]))
                .expect("parse");
        assert_eq!(parsed.name_len, Some(NameLen::Short14));
        assert_eq!(parsed.inodes, Some(64));
        assert_eq!(parsed.version, Some(FsVersion::V2));
        assert_eq!(parsed.list, Some(PathBuf::from("bad.txt")));
        assert_eq!(parsed.device, Some(PathBuf::from("disk.img")));
        assert_eq!(parsed.blocks, Some(2880));
    }

    #[test]
    fn rejects_bad_name_length_and_extra_args() {
        assert!(parse_mkfs_args(args(&["-n", "20", "disk.img"])).is_err());
        assert!(parse_mkfs_args(args(&["disk.img", "10", "extra"])).is_err());
        assert!(parse_mkfs_args(args(&["-c", "-l", "x", "disk.img"])).is_err());
        assert!(parse_mkfs_args(args(&["-q", "disk.img"])).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().expect("tmp");
        let config = dir.path().join("mkfs.json");
        std::fs::write(&config, r#"{ "version": "v2", "inodes": 96, "timestamp": 5 }"#)
            .expect("write");
        let parsed = parse_mkfs_args(args(&[
            "--config",
            config.to_str().expect("utf8"),
            "-1",
            "-c",
            "disk.img",
        ]))
        .expect("parse");
        let options = resolve_options(&parsed).expect("resolve");
        assert_eq!(options.version, FsVersion::V1);
        assert_eq!(options.inodes, 96);
        assert_eq!(options.timestamp, Some(5));
        assert_eq!(options.bad_blocks, BadBlockSource::Scan);
    }
}
