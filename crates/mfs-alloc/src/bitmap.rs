//! Allocation bitmaps.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (LSB first). Bit 0 of
//! both Minix bitmaps is reserved and stays set.

use mfs_types::{BITS_PER_BLOCK, BLOCK_SIZE};
use std::ops::Range;

/// Get bit `idx` from a bitmap byte slice.
#[must_use]
pub fn bitmap_get(bitmap: &[u8], idx: u32) -> bool {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx >= bitmap.len() {
        return false;
    }
    (bitmap[byte_idx] >> bit_idx) & 1 == 1
}

/// Set bit `idx` in a bitmap byte slice.
pub fn bitmap_set(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] |= 1 << bit_idx;
    }
}

/// Clear bit `idx` in a bitmap byte slice.
pub fn bitmap_clear(bitmap: &mut [u8], idx: u32) {
    let byte_idx = (idx / 8) as usize;
    let bit_idx = idx % 8;
    if byte_idx < bitmap.len() {
        bitmap[byte_idx] &= !(1 << bit_idx);
    }
}

/// A whole number of bitmap blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// `blocks` bitmap blocks with every bit set.
    #[must_use]
    pub fn all_set(blocks: u32) -> Self {
        Self {
            bytes: vec![0xFF; blocks as usize * BLOCK_SIZE],
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Number of addressable bits.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        u32::try_from(self.bytes.len())
            .map_or(u32::MAX, |len| len.saturating_mul(8))
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.capacity() / BITS_PER_BLOCK
    }

    /// Out-of-range bits read as set so nothing beyond the map is handed out.
    #[must_use]
    pub fn get(&self, idx: u32) -> bool {
        idx >= self.capacity() || bitmap_get(&self.bytes, idx)
    }

    pub fn set(&mut self, idx: u32) {
        bitmap_set(&mut self.bytes, idx);
    }

    pub fn clear(&mut self, idx: u32) {
        bitmap_clear(&mut self.bytes, idx);
    }

    pub fn clear_range(&mut self, range: Range<u32>) {
        for idx in range {
            self.clear(idx);
        }
    }

    /// First clear bit in `range`.
    #[must_use]
    pub fn find_clear(&self, range: Range<u32>) -> Option<u32> {
        range.into_iter().find(|&idx| !self.get(idx))
    }

    /// Set bits among the first `limit` bits.
    #[must_use]
    pub fn count_set(&self, limit: u32) -> u32 {
        let limit = limit.min(self.capacity());
        let full_bytes = (limit / 8) as usize;
        let mut set: u32 = self.bytes[..full_bytes].iter().map(|b| b.count_ones()).sum();
        for idx in (limit - limit % 8)..limit {
            if bitmap_get(&self.bytes, idx) {
                set += 1;
            }
        }
        set
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bitmap_get_set_clear() {
        let mut bm = vec![0_u8; 4];
        assert!(!bitmap_get(&bm, 0));
        bitmap_set(&mut bm, 0);
        assert!(bitmap_get(&bm, 0));
        bitmap_clear(&mut bm, 0);
        assert!(!bitmap_get(&bm, 0));

        bitmap_set(&mut bm, 7);
        assert_eq!(bm[0], 0x80);
        bitmap_set(&mut bm, 8);
        assert_eq!(bm[1], 0x01);

        // Out of range writes are ignored.
        bitmap_set(&mut bm, 100);
        assert!(!bitmap_get(&bm, 100));
    }

    #[test]
    fn all_set_then_clear_range() {
        let mut map = Bitmap::all_set(1);
        assert_eq!(map.capacity(), 8192);
        assert_eq!(map.block_count(), 1);
        map.clear_range(1..481);
        assert!(map.get(0));
        assert!(!map.get(1));
        assert!(!map.get(480));
        assert!(map.get(481));
        assert_eq!(map.count_set(481), 1);
        assert_eq!(map.find_clear(0..10), Some(1));
    }

    #[test]
    fn out_of_range_reads_as_used() {
        let mut map = Bitmap::all_set(1);
        map.clear(9000);
        assert!(map.get(9000));
        assert_eq!(map.find_clear(8190..9000), None);
    }

    proptest! {
        #[test]
        fn count_matches_naive(bits in proptest::collection::vec(0_u32..8192, 0..64), limit in 0_u32..8192) {
            let mut map = Bitmap::all_set(1);
            map.clear_range(0..8192);
            for &b in &bits {
                map.set(b);
            }
            let naive = (0..limit).filter(|&i| map.get(i)).count();
            prop_assert_eq!(map.count_set(limit) as usize, naive);
        }
    }
}
