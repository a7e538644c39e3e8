use alloc::vec::Vec;
use log::debug;

use super::{
    codec::{Record, COMMIT_REC_LEN, DATA_REC_LEN},
    Journal,
};
use crate::{
    blk_device::{BlkDevice, Disk, ToBytes},
    consts,
    maybe_dirty::MaybeDirty,
    BlkId, Error, Result,
};

/// Block images staged for one atomic journal commit.
///
/// Nothing reaches the disk until [`Transaction::commit`], which appends
/// every data record followed by the commit record, or nothing at all.
pub struct Transaction<'j> {
    journal: &'j Journal,
    writes: Vec<(BlkId, Vec<u8>)>,
}

impl<'j> Transaction<'j> {
    pub(super) fn new(journal: &'j Journal) -> Self {
        Self {
            journal,
            writes: Vec::new(),
        }
    }

    /// Stages `payload` as the new content of block `blk_id`.
    /// Staging a block again replaces the earlier image in place.
    pub fn stage(&mut self, blk_id: BlkId, payload: Vec<u8>) {
        debug_assert_eq!(payload.len(), consts::BLOCK_SIZE as usize);
        match self.writes.iter_mut().find(|(id, _)| *id == blk_id) {
            Some((_, staged)) => *staged = payload,
            None => self.writes.push((blk_id, payload)),
        }
    }

    /// Stages the block behind `blk` if it was modified, and marks it clean.
    pub fn stage_dirty<T: ToBytes>(&mut self, blk: &mut MaybeDirty<T>) {
        if !blk.is_dirty() {
            return;
        }
        let mut payload = vec![0; consts::BLOCK_SIZE as usize];
        blk.to_bytes(&mut payload[..blk.bytes_len()]);
        self.stage(blk.addr.blk_id, payload);
        blk.set_dirty(false);
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Appends the staged blocks and a commit record.
    ///
    /// Space for the whole transaction is checked before the first append,
    /// so a full journal never ends up holding a partial transaction.
    pub fn commit<DK: Disk>(self, blk_device: &BlkDevice<DK>) -> Result<()> {
        let Self { journal, writes } = self;
        if writes.is_empty() {
            return Ok(());
        }
        if writes.len() > journal.replay_limit {
            return Err(Error::TxnTooWide {
                blks: writes.len(),
                limit: journal.replay_limit,
            });
        }

        for (blk_id, _) in &writes {
            journal.check_target(blk_device, *blk_id)?;
        }

        let header = journal.load_header(blk_device)?;
        let len = writes.len() as u32 * DATA_REC_LEN + COMMIT_REC_LEN;
        journal.reserve(header.bytes_used, len)?;

        let blks = writes.len();
        for (blk_id, payload) in writes {
            journal.append(blk_device, &Record::Data { blk_id, payload })?;
        }
        journal.append(blk_device, &Record::Commit)?;
        blk_device.sync()?;

        debug!("journal commit of {} blocks", blks);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::super::{
        codec::{RawJournalHeader, COMMIT_REC_LEN, DATA_REC_LEN, HEADER_LEN},
        test::{blk_device, data, journal},
    };
    use crate::{maybe_dirty::MaybeDirty, Addr, Error};

    #[test]
    fn restaging_keeps_one_record() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();

        let mut txn = journal.begin();
        txn.stage(20, vec![1; 4096]);
        txn.stage(21, vec![2; 4096]);
        txn.stage(20, vec![3; 4096]);
        assert_eq!(txn.len(), 2);
        txn.commit(&dev).unwrap();

        assert_eq!(
            journal.header(&dev).unwrap().bytes_used,
            HEADER_LEN + 2 * DATA_REC_LEN + COMMIT_REC_LEN
        );
        let stat = journal.stat(&dev).unwrap();
        assert_eq!(stat.committed_txns, 1);
        assert_eq!(stat.staged_blks, 2);
    }

    #[test]
    fn stage_dirty_pads_to_a_block() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();

        let mut clean = MaybeDirty::new(Addr::new(22, 0), RawJournalHeader::empty());
        let mut dirty = MaybeDirty::new(Addr::new(23, 0), RawJournalHeader::empty());
        dirty.bytes_used = 99;

        let mut txn = journal.begin();
        txn.stage_dirty(&mut clean);
        txn.stage_dirty(&mut dirty);
        assert_eq!(txn.len(), 1);
        assert!(!dirty.is_dirty());
        txn.commit(&dev).unwrap();
        journal.install(&dev).unwrap();

        let blk = dev.read_blk(23).unwrap();
        assert_eq!(blk.read_val::<RawJournalHeader>(0).unwrap().bytes_used, 99);
        assert!(blk.as_slice()[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn commit_that_does_not_fit_writes_nothing() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        for i in 0..14 {
            journal.append(&dev, &data(30 + i, 1)).unwrap();
        }
        let before = journal.header(&dev).unwrap();

        let mut txn = journal.begin();
        txn.stage(40, vec![0; 4096]);
        txn.stage(41, vec![0; 4096]);
        assert!(matches!(txn.commit(&dev), Err(Error::JournalFull { .. })));
        assert_eq!(journal.header(&dev).unwrap(), before);
    }

    #[test]
    fn wider_than_replay_limit_is_refused() {
        let dev = blk_device();
        let journal = journal().with_replay_limit(2);
        journal.ensure_initialized(&dev).unwrap();
        assert_eq!(journal.replay_limit(), 2);

        let mut txn = journal.begin();
        for blk_id in 30..33 {
            txn.stage(blk_id, vec![0; 4096]);
        }
        assert!(matches!(
            txn.commit(&dev),
            Err(Error::TxnTooWide { blks: 3, limit: 2 })
        ));
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn bad_target_fails_the_whole_commit() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();

        let mut txn = journal.begin();
        txn.stage(30, vec![1; 4096]);
        txn.stage(5, vec![2; 4096]);
        assert!(matches!(txn.commit(&dev), Err(Error::BadRecordTarget(5))));
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn empty_commit_is_a_noop() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        journal.begin().commit(&dev).unwrap();
        assert!(journal.header(&dev).unwrap().is_empty());
    }
}
