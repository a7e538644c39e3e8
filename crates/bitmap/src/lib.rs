#![no_std]

#[macro_use]
extern crate alloc;

use alloc::boxed::Box;

macro_rules! div_round_up {
    ($n:expr, $d:expr) => {
        ($n + ($d - 1)) / $d
    };
}

/// A bit table stored exactly as it lives on disk:
/// bit `n` is bit `n % 8` (least significant first) of byte `n / 8`.
pub struct Bitmap(Box<[u8]>);

impl Bitmap {
    pub fn new(nbits: u32) -> Self {
        let size = div_round_up!(nbits, u8::BITS);
        Self(vec![0; size as usize].into())
    }

    /// Wraps a copy of an on-disk bitmap block.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn capacity(&self) -> u32 {
        self.0.len() as u32 * u8::BITS
    }

    /// Returns the bit of the `offset` position.
    /// true - 1
    /// false - 0
    pub fn test(&self, offset: u32) -> bool {
        let bit_mask = Self::bit_mask(offset);
        (self.0[Self::idx(offset)] & bit_mask) == bit_mask
    }

    /// Set the bit at the `offset` position to `val`,
    /// and return the value before it was set.
    pub fn test_and_set(&mut self, offset: u32, val: bool) -> bool {
        let bit_mask = Self::bit_mask(offset);
        let idx = Self::idx(offset);
        let byte = self.0[idx];
        self.0[idx] = if val { byte | bit_mask } else { byte & !bit_mask };
        (byte & bit_mask) == bit_mask
    }

    /// Returns the position of the next 0,
    /// after `offset` (including `offset`) and before `end` (excluding `end`).
    /// None means not existing
    pub fn find_next_zero(&self, offset: u32, end: Option<u32>) -> Option<u32> {
        let end = end.map_or(self.capacity(), |end| end.min(self.capacity()));
        let mut pos = offset;
        while pos < end {
            let row = pos / u8::BITS;
            let col = pos % u8::BITS;
            // Bits below `col` count as set so they are skipped.
            let byte = self.0[row as usize] | ((1_u8 << col) - 1);
            if byte != u8::MAX {
                let next_zero = row * u8::BITS + byte.trailing_ones();
                return if next_zero < end { Some(next_zero) } else { None };
            }
            pos = (row + 1) * u8::BITS;
        }
        None
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|byte| byte.count_ones()).sum()
    }

    #[inline(always)]
    fn idx(offset: u32) -> usize {
        (offset / u8::BITS) as usize
    }

    #[inline(always)]
    fn bit_mask(offset: u32) -> u8 {
        1 << (offset & (u8::BITS - 1))
    }
}
