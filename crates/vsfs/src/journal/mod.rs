//! Write-ahead journal.
//!
//! Filesystem operations never write metadata to its home block directly.
//! They stage whole block images as data records, close them with a commit
//! record, and leave it to a later [`Journal::install`] to copy committed
//! blocks home and empty the log.

pub mod codec;
mod replay;
mod txn;

use log::debug;

use self::codec::{RawJournalHeader, Record, HEADER_LEN};
use crate::{
    blk_device::{BlkDevice, Disk},
    consts,
    maybe_dirty::MaybeDirty,
    Addr, BlkId, Error, Result,
};

pub use self::replay::{InstallOutcome, JournalStat};
pub use self::txn::Transaction;

/// Location and limits of the journal region.
///
/// Holds no cursor: `bytes_used` is read from and written back to the
/// on-disk header by every operation.
#[derive(Debug, Clone)]
pub struct Journal {
    start_blk: BlkId,
    blks: u32,
    replay_limit: usize,
}

impl Journal {
    pub fn new(start_blk: BlkId, blks: u32) -> Self {
        Self {
            start_blk,
            blks,
            replay_limit: consts::DEFAULT_REPLAY_LIMIT,
        }
    }

    /// Bounds the number of data records install buffers for one transaction.
    pub fn with_replay_limit(mut self, replay_limit: usize) -> Self {
        self.replay_limit = replay_limit;
        self
    }

    pub fn replay_limit(&self) -> usize {
        self.replay_limit
    }

    /// Total bytes of the journal region, header included.
    pub fn capacity(&self) -> u32 {
        self.blks * consts::BLOCK_SIZE
    }

    /// Whether `blk_id` lies inside the journal region.
    pub fn contains(&self, blk_id: BlkId) -> bool {
        (self.start_blk..self.start_blk + self.blks).contains(&blk_id)
    }

    /// Fails with `Error::BadRecordTarget` unless `blk_id` is a block of the
    /// image outside the journal region.
    fn check_target<DK: Disk>(&self, blk_device: &BlkDevice<DK>, blk_id: BlkId) -> Result<()> {
        if blk_id >= blk_device.blks_count() || self.contains(blk_id) {
            return Err(Error::BadRecordTarget(blk_id));
        }
        Ok(())
    }

    fn base(&self) -> Addr {
        Addr::new(self.start_blk, 0)
    }

    /// Reads the header as stored, valid or not.
    pub fn header<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<RawJournalHeader> {
        blk_device.read_val_at(self.base())
    }

    /// Reads the header, failing unless it belongs to an initialized
    /// journal with a cursor inside the region.
    fn load_header<DK: Disk>(
        &self,
        blk_device: &BlkDevice<DK>,
    ) -> Result<MaybeDirty<RawJournalHeader>> {
        let header = self.header(blk_device)?;
        if !header.valid() {
            return Err(Error::NoJournal);
        }
        if header.bytes_used < HEADER_LEN || header.bytes_used > self.capacity() {
            return Err(Error::CorruptJournal {
                bytes_used: header.bytes_used,
            });
        }
        Ok(MaybeDirty::new(self.base(), header))
    }

    /// Writes an empty header unless one is already present.
    /// Returns true if the journal had to be initialized.
    pub fn ensure_initialized<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<bool> {
        if self.header(blk_device)?.valid() {
            return Ok(false);
        }
        let mut header = MaybeDirty::new(self.base(), RawJournalHeader::empty());
        header.set_dirty(true);
        header.sync(blk_device)?;
        debug!("journal initialized at block {}", self.start_blk);
        Ok(true)
    }

    /// Appends one record at the write cursor and advances it.
    ///
    /// Fails with `Error::JournalFull` if the record does not fit, or with
    /// `Error::BadRecordTarget` if a data record targets the journal or a
    /// block past the image. Either way the journal is left as it was.
    pub fn append<DK: Disk>(&self, blk_device: &BlkDevice<DK>, record: &Record) -> Result<()> {
        if let Record::Data { blk_id, .. } = record {
            self.check_target(blk_device, *blk_id)?;
        }
        let mut header = self.load_header(blk_device)?;
        let offset = header.bytes_used;
        let bytes_used = self.reserve(offset, record.encoded_len())?;

        // The record must be in place before the cursor covers it.
        blk_device.write_all(
            self.base().add_offset(offset, blk_device.blk_size),
            &record.encode(),
        )?;
        blk_device.sync()?;
        header.bytes_used = bytes_used;
        header.sync(blk_device)?;

        debug!("journal append {:?} at {}, bytes_used = {}", record, offset, bytes_used);
        Ok(())
    }

    /// New cursor after `len` more bytes land at `bytes_used`.
    fn reserve(&self, bytes_used: u32, len: u32) -> Result<u32> {
        bytes_used
            .checked_add(len)
            .filter(|end| *end <= self.capacity())
            .ok_or(Error::JournalFull {
                bytes_used,
                needed: len,
                capacity: self.capacity(),
            })
    }

    /// Starts collecting the blocks of one transaction.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::new(self)
    }
}
