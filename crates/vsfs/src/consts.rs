use crate::{BlkId, InodeId};

pub const VSFS_MAGIC: u32 = 0x5653_4653;

pub const BLOCK_SIZE: u32 = 4096;
pub const INODE_SIZE: u32 = 128;
/// Size of the image `mkfs` lays out unless told otherwise
pub const DEFAULT_BLKS_COUNT: u32 = 85;

pub const SUPER_BLK_ID: BlkId = 0;
pub const JOURNAL_BLK_ID: BlkId = SUPER_BLK_ID + 1;
pub const JOURNAL_BLKS: u32 = 16;
pub const INODE_BITMAP_BLK_ID: BlkId = JOURNAL_BLK_ID + JOURNAL_BLKS;
pub const DATA_BITMAP_BLK_ID: BlkId = INODE_BITMAP_BLK_ID + 1;
pub const INODE_TABLE_BLK_ID: BlkId = DATA_BITMAP_BLK_ID + 1;
pub const DATA_START_BLK_ID: BlkId = INODE_TABLE_BLK_ID + 2;

/// The inode id of the root directory
pub const ROOT_INO: InodeId = 0;

/// Number of direct blocks in inode
pub const INODE_DIRECT_BLK_COUNT: usize = 8;

/// Bytes reserved for a directory entry name, NUL terminator included
pub const DIR_NAME_LEN: usize = 28;

/// Data records one transaction may carry before install gives up on it
pub const DEFAULT_REPLAY_LIMIT: usize = 32;
