//! VSFS: a very small block filesystem whose metadata updates go through a
//! write-ahead journal.
//!
//! Image layout, in 4096-byte blocks:
//!
//! | block  | content        |
//! |--------|----------------|
//! | 0      | superblock     |
//! | 1..17  | journal        |
//! | 17     | inode bitmap   |
//! | 18     | data bitmap    |
//! | 19..21 | inode table    |
//! | 21..   | data blocks    |
//!
//! [`Vsfs::create_entry`] only appends a transaction to the journal; the
//! new file becomes visible at its home blocks once [`Vsfs::install`] runs.
#![no_std]

#[allow(unused_imports)]
#[macro_use]
extern crate alloc;

#[macro_use]
mod blk_device;
mod allocator;
pub mod consts;
pub mod dir;
pub mod inode;
pub mod journal;
mod maybe_dirty;
pub mod ram_disk;
mod super_blk;

use alloc::vec::Vec;
use core::{convert::TryFrom, fmt};
use log::info;

use allocator::Allocator;
use dir::{DirEntryName, RawDirEntry};
use inode::RawInode;

pub type Result<T> = core::result::Result<T, Error>;

pub use blk_device::{BlkBuf, BlkDevice, Disk, DiskError, DiskResult, FromBytes, ToBytes};
pub use journal::{InstallOutcome, Journal, JournalStat};
pub use maybe_dirty::MaybeDirty;
pub use super_blk::RawSuperBlk;
pub type BlkId = u32;
pub type InodeId = u32;

#[derive(Debug)]
pub enum Error {
    /// The disk is too small for the filesystem layout
    NoSpace,
    /// Block 0 does not hold a VSFS superblock
    NotVsfs,
    NotDir,
    InvalidDirEntryName(Vec<u8>),
    NoFreeInode,
    DirFull,
    /// The journal header magic is missing
    NoJournal,
    /// The journal header cursor lies outside the journal region
    CorruptJournal { bytes_used: u32 },
    JournalFull {
        bytes_used: u32,
        needed: u32,
        capacity: u32,
    },
    /// More data records without a commit than install may buffer
    ReplayOverflow { limit: usize },
    /// A transaction install could never apply
    TxnTooWide { blks: usize, limit: usize },
    /// A journal record targets a block outside the image or inside the journal
    BadRecordTarget(BlkId),
    BlkOutOfRange(BlkId),
    InodeOutOfRange(InodeId),
    /// An inode holds a value no valid image produces
    CorruptInode(InodeId),
    ShortIo { offset: u32 },
    ReadOnly,
    DiskError(blk_device::DiskError),
}

impl Error {
    /// Errors that mean an install was skipped or the journal is malformed;
    /// the current invocation cannot go on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::JournalFull { .. } | Error::ReplayOverflow { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoSpace => write!(f, "disk too small for a vsfs image"),
            Error::NotVsfs => write!(f, "not a vsfs image"),
            Error::NotDir => write!(f, "root inode is not a directory"),
            Error::InvalidDirEntryName(name) => write!(
                f,
                "invalid directory entry name {:?}",
                core::str::from_utf8(name).unwrap_or("<non-utf8>")
            ),
            Error::NoFreeInode => write!(f, "no free inodes"),
            Error::DirFull => write!(f, "directory full"),
            Error::NoJournal => write!(f, "no journal present"),
            Error::CorruptJournal { bytes_used } => {
                write!(f, "corrupt journal header, bytes_used = {}", bytes_used)
            }
            Error::JournalFull {
                bytes_used,
                needed,
                capacity,
            } => write!(
                f,
                "journal full: {} of {} bytes used, {} more needed; run install first",
                bytes_used, capacity, needed
            ),
            Error::ReplayOverflow { limit } => write!(
                f,
                "install buffer overflow: more than {} data records without a commit",
                limit
            ),
            Error::TxnTooWide { blks, limit } => write!(
                f,
                "transaction of {} blocks exceeds the replay limit of {}",
                blks, limit
            ),
            Error::BadRecordTarget(blk_id) => {
                write!(f, "journal record targets invalid block {}", blk_id)
            }
            Error::BlkOutOfRange(blk_id) => write!(f, "block {} is out of range", blk_id),
            Error::InodeOutOfRange(inode_id) => write!(f, "inode {} is out of range", inode_id),
            Error::CorruptInode(inode_id) => write!(f, "inode {} is corrupt", inode_id),
            Error::ShortIo { offset } => write!(f, "short transfer at byte {}", offset),
            Error::ReadOnly => write!(f, "image is opened read-only"),
            Error::DiskError(_) => write!(f, "disk error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub blk_id: BlkId,
    pub offset_of_blk: u32,
}

impl Addr {
    pub fn new(blk_id: BlkId, offset_of_blk: u32) -> Self {
        Self {
            blk_id,
            offset_of_blk,
        }
    }

    /// Calculating absolute offset
    pub fn abs_offset(&self, blk_size: BlkSize) -> u32 {
        blk_size.mul(self.blk_id) + self.offset_of_blk
    }

    pub fn add_offset(mut self, offset: u32, blk_size: BlkSize) -> Self {
        let offset = self.offset_of_blk + offset;
        self.blk_id += blk_size.div_by(offset);
        self.offset_of_blk = blk_size.mod_by(offset);
        self
    }
}

/// The block size type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlkSize {
    /// log2(blk_size)
    pub blk_size_log2: u8,
}

impl BlkSize {
    /// Create BlkSize
    pub fn new(blk_size: u32) -> Self {
        assert!(
            blk_size.is_power_of_two(),
            "block_size = {}, that must be power of 2.",
            blk_size
        );

        Self {
            blk_size_log2: blk_size.trailing_zeros() as u8,
        }
    }

    /// Returns block size.
    pub fn size(&self) -> u32 {
        1 << self.blk_size_log2
    }

    /// Performs `dividend` / `blk_size`.
    pub fn div_by(&self, dividend: u32) -> u32 {
        dividend >> self.blk_size_log2
    }

    /// Performs `m` * `blk_size`.
    pub fn mul(&self, m: u32) -> u32 {
        m << self.blk_size_log2
    }

    /// Performs `dividend` % `blk_size`.
    pub fn mod_by(&self, dividend: u32) -> u32 {
        dividend & (self.size() - 1)
    }
}

/// Returns root inode id.
pub fn root_inode_id() -> InodeId {
    consts::ROOT_INO
}

/// An opened image.
///
/// The image must not be used by anyone else while a `Vsfs` is alive:
/// the journal cursor is read and rewritten without any locking.
pub struct Vsfs<DK> {
    super_blk: RawSuperBlk,
    blk_device: BlkDevice<DK>,
    journal: Journal,
}

impl<DK: Disk> Vsfs<DK> {
    pub fn open(disk: DK, read_only: bool) -> Result<Self> {
        let blk_device = BlkDevice::new(disk, BlkSize::new(consts::BLOCK_SIZE), read_only);
        let super_blk = RawSuperBlk::load(&blk_device)?;
        let journal = Journal::new(super_blk.journal_blk, consts::JOURNAL_BLKS);
        Ok(Self {
            super_blk,
            blk_device,
            journal,
        })
    }

    /// Lays out an empty filesystem over the whole disk.
    ///
    /// The journal region is zeroed; its header is written by the first
    /// operation that needs it.
    pub fn format(disk: DK, create_unix_timestamp: u32) -> Result<Self> {
        let blk_device = BlkDevice::new(disk, BlkSize::new(consts::BLOCK_SIZE), false);
        let blks_count = blk_device.blks_count();
        if blks_count <= consts::DATA_START_BLK_ID {
            return Err(Error::NoSpace);
        }
        let super_blk = RawSuperBlk::new(blks_count);
        let blk_size = blk_device.blk_size;

        let zeroed = BlkBuf::zeroed(blk_size);
        for blk_id in 0..=super_blk.data_start {
            blk_device.write_blk(blk_id, zeroed.as_slice())?;
        }

        let mut blk = zeroed.clone();
        blk.write_val(0, &super_blk);
        blk_device.write_blk(consts::SUPER_BLK_ID, blk.as_slice())?;

        // Root inode and its directory block are taken.
        let mut blk = zeroed.clone();
        blk.as_mut_slice()[0] = 1;
        blk_device.write_blk(super_blk.inode_bitmap, blk.as_slice())?;
        blk_device.write_blk(super_blk.data_bitmap, blk.as_slice())?;

        let root_addr = super_blk.raw_inode_addr(root_inode_id());
        let mut blk = zeroed.clone();
        blk.write_val(
            root_addr.offset_of_blk,
            &RawInode::new_dir(
                super_blk.data_start,
                2 * RawDirEntry::LEN,
                create_unix_timestamp,
            ),
        );
        blk_device.write_blk(root_addr.blk_id, blk.as_slice())?;

        let mut blk = zeroed;
        for (slot, name) in [&b"."[..], &b".."[..]].iter().enumerate() {
            dir::put_entry(
                &mut blk,
                slot as u32,
                &RawDirEntry::new(root_inode_id(), &DirEntryName::truncated(name)),
            );
        }
        blk_device.write_blk(super_blk.data_start, blk.as_slice())?;
        blk_device.sync()?;

        info!(
            "formatted {} blocks, {} inodes",
            super_blk.blks_count, super_blk.inodes_count
        );
        let journal = Journal::new(super_blk.journal_blk, consts::JOURNAL_BLKS);
        Ok(Self {
            super_blk,
            blk_device,
            journal,
        })
    }

    /// Bounds the width of a transaction install accepts.
    pub fn with_replay_limit(mut self, replay_limit: usize) -> Self {
        self.journal = self.journal.with_replay_limit(replay_limit);
        self
    }

    pub fn super_blk(&self) -> &RawSuperBlk {
        &self.super_blk
    }

    pub fn blk_device(&self) -> &BlkDevice<DK> {
        &self.blk_device
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Writes the journal header if the image has none yet.
    pub fn ensure_journal(&self) -> Result<bool> {
        self.journal.ensure_initialized(&self.blk_device)
    }

    /// Allocates a file inode and links it into the root directory as `name`,
    /// staging the bitmap, inode table and directory blocks as one journal
    /// transaction. Home blocks stay untouched until [`Vsfs::install`].
    ///
    /// Names longer than 27 bytes are truncated.
    pub fn create_entry(&self, name: &[u8], create_unix_timestamp: u32) -> Result<InodeId> {
        let name = DirEntryName::try_from(name)?;
        self.ensure_journal()?;

        // Blocks already staged by earlier, not yet installed, transactions
        // are newer than their home copies.
        let staged = self.journal.committed_blks(&self.blk_device)?;
        let read = |blk_id: BlkId| -> Result<MaybeDirty<BlkBuf>> {
            let blk = match staged.get(&blk_id) {
                Some(payload) => BlkBuf::from(payload.clone()),
                None => self.blk_device.read_blk(blk_id)?,
            };
            Ok(MaybeDirty::new(Addr::new(blk_id, 0), blk))
        };

        let sb = &self.super_blk;
        let bitmap_blk = read(sb.inode_bitmap)?;
        let mut allocator = Allocator::new(sb.inode_bitmap, &bitmap_blk, sb.inodes_count);
        let inode_id = allocator.alloc().ok_or(Error::NoFreeInode)?;

        let inode_addr = sb.raw_inode_addr(inode_id);
        let mut inode_blk = read(inode_addr.blk_id)?;
        inode_blk.zero_range(inode_addr.offset_of_blk, RawInode::SLOT_LEN);
        inode_blk.write_val(
            inode_addr.offset_of_blk,
            &RawInode::new_file(create_unix_timestamp),
        );

        // The root inode is looked up on its own; it only shares the block
        // with the new inode while both sit in the first table block.
        let root_addr = sb.raw_inode_addr(root_inode_id());
        let mut root_blk = if root_addr.blk_id == inode_addr.blk_id {
            None
        } else {
            Some(read(root_addr.blk_id)?)
        };
        let root_blk_ref = root_blk.as_mut().unwrap_or(&mut inode_blk);
        let mut root: RawInode = root_blk_ref
            .read_val(root_addr.offset_of_blk)
            .ok_or(Error::NotDir)?;
        if !root.is_dir() || root.direct[0] == 0 {
            return Err(Error::NotDir);
        }
        root.size = root
            .size
            .checked_add(RawDirEntry::LEN)
            .ok_or(Error::CorruptInode(root_inode_id()))?;
        root_blk_ref.write_val(root_addr.offset_of_blk, &root);

        let mut dir_blk = read(root.direct[0])?;
        let slot = dir::find_free_slot(&dir_blk).ok_or(Error::DirFull)?;
        dir::put_entry(&mut dir_blk, slot, &RawDirEntry::new(inode_id, &name));

        let mut txn = self.journal.begin();
        txn.stage_dirty(allocator.bitmap());
        txn.stage_dirty(&mut inode_blk);
        if let Some(root_blk) = root_blk.as_mut() {
            txn.stage_dirty(root_blk);
        }
        txn.stage_dirty(&mut dir_blk);
        txn.commit(&self.blk_device)?;

        info!("created {:?} as inode {} (pending install)", name, inode_id);
        Ok(inode_id)
    }

    /// Applies every committed journal transaction to its home blocks and
    /// empties the journal.
    pub fn install(&self) -> Result<InstallOutcome> {
        self.journal.install(&self.blk_device)
    }

    /// Reads an inode from its home block.
    pub fn read_inode(&self, inode_id: InodeId) -> Result<RawInode> {
        if inode_id >= self.super_blk.inodes_count {
            return Err(Error::InodeOutOfRange(inode_id));
        }
        self.blk_device
            .read_val_at(self.super_blk.raw_inode_addr(inode_id))
    }

    /// Entries of the root directory as found at its home block.
    pub fn entries(&self) -> Result<Vec<RawDirEntry>> {
        let root = self.read_inode(root_inode_id())?;
        if !root.is_dir() || root.direct[0] == 0 {
            return Err(Error::NotDir);
        }
        Ok(dir::entries(&self.blk_device.read_blk(root.direct[0])?))
    }
}
