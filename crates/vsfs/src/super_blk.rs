use byte_struct::*;

use crate::{
    blk_device::{BlkDevice, Disk},
    consts,
    inode::RawInode,
    Addr, BlkId, BlkSize, Error, InodeId, Result,
};

/// RawSuperBlock, stored at the start of block 0.
#[derive(ByteStruct, Debug, Clone, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawSuperBlk {
    pub magic: u32,
    pub blk_size: u32,
    pub blks_count: u32,
    pub inodes_count: u32,
    /// First block of the journal region
    pub journal_blk: BlkId,
    pub inode_bitmap: BlkId,
    pub data_bitmap: BlkId,
    /// First block of the inode table
    pub inode_table: BlkId,
    /// First data block
    pub data_start: BlkId,
}

byte_struct_bytes!(RawSuperBlk);

impl RawSuperBlk {
    /// Superblock of a freshly formatted image spanning `blks_count` blocks.
    pub fn new(blks_count: u32) -> Self {
        let inode_table_blks = consts::DATA_START_BLK_ID - consts::INODE_TABLE_BLK_ID;
        Self {
            magic: consts::VSFS_MAGIC,
            blk_size: consts::BLOCK_SIZE,
            blks_count,
            inodes_count: inode_table_blks * (consts::BLOCK_SIZE / consts::INODE_SIZE),
            journal_blk: consts::JOURNAL_BLK_ID,
            inode_bitmap: consts::INODE_BITMAP_BLK_ID,
            data_bitmap: consts::DATA_BITMAP_BLK_ID,
            inode_table: consts::INODE_TABLE_BLK_ID,
            data_start: consts::DATA_START_BLK_ID,
        }
    }

    /// Reads and validates the superblock.
    pub fn load<DK: Disk>(blk_device: &BlkDevice<DK>) -> Result<Self> {
        let raw_super_blk: Self =
            blk_device.read_val_at(Addr::new(consts::SUPER_BLK_ID, 0))?;
        if !raw_super_blk.valid(blk_device.blks_count()) {
            return Err(Error::NotVsfs);
        }
        Ok(raw_super_blk)
    }

    pub fn valid(&self, device_blks: u32) -> bool {
        self.magic == consts::VSFS_MAGIC
            && self.blk_size == consts::BLOCK_SIZE
            && self.blks_count <= device_blks
            && self.data_start < self.blks_count
            && self.inode_table < self.data_start
    }

    pub fn blk_size(&self) -> BlkSize {
        BlkSize::new(self.blk_size)
    }

    pub fn inodes_per_blk(&self) -> u32 {
        self.blk_size / RawInode::SLOT_LEN
    }

    /// Where inode `inode_id` lives in the inode table.
    pub fn raw_inode_addr(&self, inode_id: InodeId) -> Addr {
        Addr::new(self.inode_table, 0)
            .add_offset(inode_id * RawInode::SLOT_LEN, self.blk_size())
    }
}
