use byte_struct::*;
use num_enum::num_enum;

use crate::{consts, BlkId};

num_enum! {
    /// Inode type, as stored in `RawInode::ty`
    pub InodeType: u16 {
        Free = 0,
        File = 1,
        Dir = 2,
    }
}

/// RawInode. Each inode occupies a `RawInode::SLOT_LEN` byte slot of the
/// inode table; bytes past the encoded fields are zero.
#[derive(ByteStruct, Debug, Clone, Default, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawInode {
    pub ty: u16,
    /// how many directory entries refer to this inode.
    pub links: u16,
    pub size: u32,
    /// Direct block that points to the data Block id of this inode.
    pub direct: [BlkId; consts::INODE_DIRECT_BLK_COUNT],
    /// the number of seconds since january 1st 1970, of when the inode was created.
    pub ctime: u32,
    /// the number of seconds since january 1st 1970, of the last time this inode was modified.
    pub mtime: u32,
}

byte_struct_bytes!(RawInode);

impl RawInode {
    pub const SLOT_LEN: u32 = consts::INODE_SIZE;

    /// An empty regular file.
    pub fn new_file(create_unix_timestamp: u32) -> Self {
        Self {
            ty: InodeType::File.into(),
            links: 1,
            ctime: create_unix_timestamp,
            mtime: create_unix_timestamp,
            ..Default::default()
        }
    }

    /// A directory whose entries start in `data_blk`.
    pub fn new_dir(data_blk: BlkId, size: u32, create_unix_timestamp: u32) -> Self {
        let mut direct = [0; consts::INODE_DIRECT_BLK_COUNT];
        direct[0] = data_blk;
        Self {
            ty: InodeType::Dir.into(),
            links: 2,
            size,
            direct,
            ctime: create_unix_timestamp,
            mtime: create_unix_timestamp,
        }
    }

    pub fn ty(&self) -> Option<InodeType> {
        InodeType::from_primitive(self.ty)
    }

    pub fn is_dir(&self) -> bool {
        self.ty() == Some(InodeType::Dir)
    }

    pub fn is_file(&self) -> bool {
        self.ty() == Some(InodeType::File)
    }
}
