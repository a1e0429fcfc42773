//! Bad-block lists: decimal block numbers separated by whitespace or
//! newlines, as written by `badblocks(8)`.

use mfs_error::{MfsError, Result};
use mfs_types::BlockNumber;
use std::io::BufRead;
use tracing::debug;

use crate::BadBlocks;

/// Read every block number from `reader`. Blank lines are ignored.
pub fn parse_bad_block_list<R: BufRead>(reader: R) -> Result<Vec<u32>> {
    let mut blocks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        for token in line.split_whitespace() {
            let block = token.parse::<u32>().map_err(|_| {
                MfsError::Format(format!(
                    "bad-block list line {}: '{token}' is not a block number",
                    lineno + 1
                ))
            })?;
            blocks.push(block);
        }
    }
    Ok(blocks)
}

/// Parse and validate a list against the layout, then mark every entry.
///
/// Nothing is marked unless the whole list is acceptable.
pub fn load_bad_block_list<R, F>(
    reader: R,
    zones: u32,
    first_data_zone: u32,
    mut marker: F,
) -> Result<BadBlocks>
where
    R: BufRead,
    F: FnMut(BlockNumber),
{
    let listed = parse_bad_block_list(reader)?;
    let mut bad = BadBlocks::new();
    for &block in &listed {
        if block < first_data_zone {
            return Err(MfsError::BadBlockInMetadata {
                block: u64::from(block),
                first_data_zone: u64::from(first_data_zone),
            });
        }
        if block >= zones {
            return Err(MfsError::InvalidGeometry(format!(
                "bad block {block} is beyond the end of the filesystem ({zones} zones)"
            )));
        }
        bad.insert(BlockNumber(block));
    }
    for block in bad.iter() {
        marker(block);
    }
    debug!(
        target: "mfs::badblocks",
        event = "list_loaded",
        listed = listed.len(),
        unique = bad.len()
    );
    Ok(bad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor, Write};

    #[test]
    fn parses_mixed_separators() {
        let input = "20\n\n 31 32\n\t40\n";
        assert_eq!(
            parse_bad_block_list(Cursor::new(input)).expect("parse"),
            vec![20, 31, 32, 40]
        );
        assert!(parse_bad_block_list(Cursor::new("")).expect("empty").is_empty());
    }

    #[test]
    fn rejects_malformed_tokens() {
        let err = parse_bad_block_list(Cursor::new("20\nforty\n")).expect_err("malformed");
        assert!(matches!(err, MfsError::Format(ref msg) if msg.contains("line 2")));
        assert!(parse_bad_block_list(Cursor::new("-3")).is_err());
    }

    #[test]
    fn load_marks_sorted_unique_blocks() {
        let mut marked = Vec::new();
        let bad = load_bad_block_list(Cursor::new("50 20 50\n"), 1440, 19, |b| {
            marked.push(b.0);
        })
        .expect("load");
        assert_eq!(marked, vec![20, 50]);
        assert_eq!(bad.len(), 2);
    }

    #[test]
    fn metadata_entry_is_rejected_before_marking() {
        let mut marked = Vec::new();
        let err = load_bad_block_list(Cursor::new("30\n5\n"), 1440, 19, |b| marked.push(b.0))
            .expect_err("metadata");
        assert!(matches!(err, MfsError::BadBlockInMetadata { block: 5, .. }));
        assert!(err.is_configuration());
        assert!(marked.is_empty());
    }

    #[test]
    fn entry_beyond_device_is_rejected() {
        let err = load_bad_block_list(Cursor::new("1440"), 1440, 19, |_| {}).expect_err("range");
        assert!(matches!(err, MfsError::InvalidGeometry(_)));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tmp");
        writeln!(file, "100\n200").expect("write");
        let reader = BufReader::new(std::fs::File::open(file.path()).expect("open"));
        let bad = load_bad_block_list(reader, 1440, 19, |_| {}).expect("load");
        assert_eq!(bad.summary().as_deref(), Some("2 bad blocks"));
    }
}
