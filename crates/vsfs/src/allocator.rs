use bitmap::Bitmap;

use crate::{
    blk_device::{BlkBuf, ToBytes},
    maybe_dirty::MaybeDirty,
    Addr, BlkId,
};

/// Hands out ids from an in-memory copy of an on-disk bitmap block.
///
/// Id 0 is reserved and never handed out.
pub(crate) struct Allocator {
    bitmap: MaybeDirty<Bitmap>,
    capacity: u32,
}

impl Allocator {
    /// `capacity` bounds the ids that may be handed out.
    pub(crate) fn new(bitmap_blk_id: BlkId, blk: &BlkBuf, capacity: u32) -> Self {
        Self {
            bitmap: MaybeDirty::new(
                Addr::new(bitmap_blk_id, 0),
                Bitmap::from_bytes(blk.as_slice()),
            ),
            capacity,
        }
    }

    /// Allocate the lowest free id. return None means no ids are available
    pub fn alloc(&mut self) -> Option<u32> {
        let id = self.bitmap.find_next_zero(1, Some(self.capacity))?;
        self.bitmap.test_and_set(id, true);
        Some(id)
    }

    pub fn bitmap(&mut self) -> &mut MaybeDirty<Bitmap> {
        &mut self.bitmap
    }
}

impl ToBytes for Bitmap {
    fn bytes_len(&self) -> usize {
        self.as_bytes().len()
    }

    fn to_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(self.as_bytes())
    }
}

#[cfg(test)]
mod test {
    use super::Allocator;
    use crate::{blk_device::BlkBuf, BlkSize};

    #[test]
    fn skips_reserved_and_used_ids() {
        let mut blk = BlkBuf::zeroed(BlkSize::new(64));
        blk.as_mut_slice()[0] = 0b0000_0101;
        let mut allocator = Allocator::new(17, &blk, 8);

        assert!(!allocator.bitmap().is_dirty());
        assert_eq!(allocator.alloc(), Some(1));
        assert!(allocator.bitmap().is_dirty());
        assert_eq!(allocator.alloc(), Some(3));
        assert!(allocator.bitmap().test(3));
        assert_eq!(allocator.bitmap().as_bytes()[0], 0b0000_1111);
    }

    #[test]
    fn exhausted_within_capacity() {
        let mut blk = BlkBuf::zeroed(BlkSize::new(64));
        blk.as_mut_slice()[0] = 0b0111_1111;
        let mut allocator = Allocator::new(17, &blk, 7);
        assert_eq!(allocator.alloc(), None);
        assert!(!allocator.bitmap().is_dirty());

        let mut allocator = Allocator::new(17, &blk, 8);
        assert_eq!(allocator.alloc(), Some(7));
    }
}
