use alloc::{collections::BTreeMap, vec::Vec};
use core::mem;
use log::{info, warn};

use super::{
    codec::{RawJournalHeader, Record, HEADER_LEN},
    Journal,
};
use crate::{
    blk_device::{BlkDevice, Disk},
    BlkId, Error, Result,
};

/// What [`Journal::install`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The journal held nothing; nothing was written.
    Empty,
    Installed {
        /// Committed transactions applied
        txns: usize,
        /// Block writes applied
        blks: usize,
        /// Trailing data records without a commit, dropped
        discarded: usize,
    },
}

/// Summary of the journal content, see [`Journal::stat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalStat {
    pub bytes_used: u32,
    pub capacity: u32,
    /// Committed transactions waiting for install
    pub committed_txns: usize,
    /// Block writes in those transactions
    pub staged_blks: usize,
    /// Trailing data records without a commit
    pub uncommitted: usize,
}

type BlkWrite = (BlkId, Vec<u8>);

/// The committed content of the log, in log order.
struct Scan {
    txns: Vec<Vec<BlkWrite>>,
    uncommitted: usize,
}

impl Scan {
    fn blks(&self) -> usize {
        self.txns.iter().map(Vec::len).sum()
    }
}

impl Journal {
    /// Reads every record below the cursor and groups data records into
    /// committed transactions. Writes nothing.
    fn scan<DK: Disk>(
        &self,
        blk_device: &BlkDevice<DK>,
        header: &RawJournalHeader,
    ) -> Result<Scan> {
        let mut log = vec![0; (header.bytes_used - HEADER_LEN) as usize];
        blk_device.read_exact(
            self.base().add_offset(HEADER_LEN, blk_device.blk_size),
            &mut log,
        )?;

        let mut txns = Vec::new();
        let mut pending: Vec<BlkWrite> = Vec::with_capacity(self.replay_limit);
        let mut pos = 0;
        while pos < log.len() {
            let (record, len) = match Record::decode(&log[pos..]) {
                Some(decoded) => decoded,
                None => {
                    warn!(
                        "journal: unreadable record at offset {}, ignoring the rest of the log",
                        HEADER_LEN as usize + pos
                    );
                    break;
                }
            };
            match record {
                Record::Data { blk_id, payload } => {
                    if pending.len() == self.replay_limit {
                        return Err(Error::ReplayOverflow {
                            limit: self.replay_limit,
                        });
                    }
                    pending.push((blk_id, payload));
                }
                Record::Commit => {
                    // Targets only matter once a transaction is going to be applied.
                    for (blk_id, _) in &pending {
                        self.check_target(blk_device, *blk_id)?;
                    }
                    txns.push(mem::take(&mut pending));
                }
            }
            pos += len as usize;
        }

        if !pending.is_empty() {
            warn!(
                "journal: {} data records without commit are discarded",
                pending.len()
            );
        }
        Ok(Scan {
            txns,
            uncommitted: pending.len(),
        })
    }

    /// Copies every committed transaction to its home blocks and empties
    /// the journal.
    ///
    /// The whole log is decoded before the first write, so a failure leaves
    /// both the image and the journal as they were. Calling it again right
    /// after a success returns `InstallOutcome::Empty`.
    pub fn install<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<InstallOutcome> {
        let mut header = self.load_header(blk_device)?;
        if header.is_empty() {
            info!("journal: nothing to install");
            return Ok(InstallOutcome::Empty);
        }

        let scan = self.scan(blk_device, &header)?;
        for txn in &scan.txns {
            for (blk_id, payload) in txn {
                blk_device.write_blk(*blk_id, payload)?;
            }
        }
        // Home blocks reach the disk before the log that describes them is dropped.
        blk_device.sync()?;

        header.bytes_used = HEADER_LEN;
        header.sync(blk_device)?;
        blk_device.sync()?;

        let outcome = InstallOutcome::Installed {
            txns: scan.txns.len(),
            blks: scan.blks(),
            discarded: scan.uncommitted,
        };
        info!("journal: installed {:?}", outcome);
        Ok(outcome)
    }

    /// Describes what an install would do now.
    pub fn stat<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<JournalStat> {
        let header = self.load_header(blk_device)?;
        let scan = self.scan(blk_device, &header)?;
        Ok(JournalStat {
            bytes_used: header.bytes_used,
            capacity: self.capacity(),
            committed_txns: scan.txns.len(),
            staged_blks: scan.blks(),
            uncommitted: scan.uncommitted,
        })
    }

    /// The newest committed image of every block the journal holds.
    pub fn committed_blks<DK: Disk>(
        &self,
        blk_device: &BlkDevice<DK>,
    ) -> Result<BTreeMap<BlkId, Vec<u8>>> {
        let header = self.load_header(blk_device)?;
        let scan = self.scan(blk_device, &header)?;
        Ok(scan.txns.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod test {
    use super::super::{
        codec::{RawJournalHeader, Record, HEADER_LEN, JOURNAL_MAGIC},
        test::{blk_device, data, journal, TestDisk},
    };
    use super::InstallOutcome;
    use crate::{
        blk_device::{BlkDevice, ToBytes},
        consts, Addr, Error,
    };

    fn commit_txn(dev: &BlkDevice<TestDisk>, writes: &[(u32, u8)]) {
        let journal = journal();
        let mut txn = journal.begin();
        for (blk_id, fill) in writes {
            txn.stage(*blk_id, vec![*fill; 4096]);
        }
        txn.commit(dev).unwrap();
    }

    fn write_header(dev: &BlkDevice<TestDisk>, header: RawJournalHeader) {
        let mut bytes = [0; 8];
        header.to_bytes(&mut bytes);
        dev.write_all(Addr::new(consts::JOURNAL_BLK_ID, 0), &bytes)
            .unwrap();
    }

    fn filled(dev: &BlkDevice<TestDisk>, blk_id: u32, fill: u8) -> bool {
        dev.read_blk(blk_id)
            .unwrap()
            .as_slice()
            .iter()
            .all(|b| *b == fill)
    }

    #[test]
    fn install_applies_committed_transactions() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1), (31, 2), (32, 3)]);
        commit_txn(&dev, &[(31, 4)]);

        assert_eq!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed {
                txns: 2,
                blks: 4,
                discarded: 0
            }
        );
        assert!(filled(&dev, 30, 1));
        assert!(filled(&dev, 31, 4));
        assert!(filled(&dev, 32, 3));
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn install_twice_is_a_noop() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(40, 9)]);

        assert!(matches!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed { txns: 1, .. }
        ));
        let image = dev.disk().snapshot();
        assert_eq!(journal.install(&dev).unwrap(), InstallOutcome::Empty);
        assert_eq!(dev.disk().snapshot(), image);
    }

    #[test]
    fn install_without_journal() {
        let (dev, journal) = (blk_device(), journal());
        assert!(matches!(journal.install(&dev), Err(Error::NoJournal)));

        write_header(
            &dev,
            RawJournalHeader {
                magic: 0xDEAD_BEEF,
                bytes_used: 12,
            },
        );
        let image = dev.disk().snapshot();
        assert!(matches!(journal.install(&dev), Err(Error::NoJournal)));
        assert_eq!(dev.disk().snapshot(), image);
    }

    #[test]
    fn uncommitted_tail_is_never_applied() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1)]);
        for blk_id in 31..34 {
            journal.append(&dev, &data(blk_id, 7)).unwrap();
        }

        let stat = journal.stat(&dev).unwrap();
        assert_eq!((stat.committed_txns, stat.uncommitted), (1, 3));
        assert_eq!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed {
                txns: 1,
                blks: 1,
                discarded: 3
            }
        );
        assert!(filled(&dev, 30, 1));
        for blk_id in 31..34 {
            assert!(filled(&dev, blk_id, 0));
        }
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn transaction_cut_before_commit_changes_nothing() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1), (31, 2), (32, 3)]);

        // Pull the cursor back so the commit record falls outside the log.
        let mut header = journal.header(&dev).unwrap();
        header.bytes_used -= 4;
        write_header(&dev, header);
        let image = dev.disk().snapshot();

        assert_eq!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed {
                txns: 0,
                blks: 0,
                discarded: 3
            }
        );
        let after = dev.disk().snapshot();
        let journal_end = ((consts::JOURNAL_BLK_ID + consts::JOURNAL_BLKS) * 4096) as usize;
        assert_eq!(&after[journal_end..], &image[journal_end..]);
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn replay_overflow_leaves_everything_untouched() {
        let dev = blk_device();
        let journal = journal().with_replay_limit(4);
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1)]);
        for blk_id in 40..45 {
            journal.append(&dev, &data(blk_id, 5)).unwrap();
        }
        journal.append(&dev, &Record::Commit).unwrap();

        let image = dev.disk().snapshot();
        assert!(matches!(
            journal.install(&dev),
            Err(Error::ReplayOverflow { limit: 4 })
        ));
        assert_eq!(dev.disk().snapshot(), image);
    }

    #[test]
    fn unknown_tag_ends_the_log() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1)]);

        // A record with tag 7, followed by a well formed transaction.
        let garbage_at = journal.header(&dev).unwrap().bytes_used;
        dev.write_all(
            Addr::new(consts::JOURNAL_BLK_ID, garbage_at),
            &[7, 0, 4, 0],
        )
        .unwrap();
        write_header(
            &dev,
            RawJournalHeader {
                magic: JOURNAL_MAGIC,
                bytes_used: garbage_at + 4,
            },
        );
        commit_txn(&dev, &[(31, 2)]);

        assert_eq!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed {
                txns: 1,
                blks: 1,
                discarded: 0
            }
        );
        assert!(filled(&dev, 30, 1));
        assert!(filled(&dev, 31, 0));
        assert_eq!(journal.header(&dev).unwrap().bytes_used, HEADER_LEN);
    }

    /// Writes `record` past the cursor the way a foreign writer would,
    /// without any of the checks `Journal::append` makes.
    fn append_raw(dev: &BlkDevice<TestDisk>, record: &Record) {
        let journal = journal();
        let bytes_used = journal.header(dev).unwrap().bytes_used;
        dev.write_all(
            Addr::new(consts::JOURNAL_BLK_ID, 0).add_offset(bytes_used, dev.blk_size),
            &record.encode(),
        )
        .unwrap();
        write_header(
            dev,
            RawJournalHeader {
                magic: JOURNAL_MAGIC,
                bytes_used: bytes_used + record.encoded_len(),
            },
        );
    }

    #[test]
    fn committed_record_targeting_the_journal_is_refused() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1)]);
        append_raw(&dev, &data(3, 1));
        append_raw(&dev, &Record::Commit);

        let image = dev.disk().snapshot();
        assert!(matches!(
            journal.install(&dev),
            Err(Error::BadRecordTarget(3))
        ));
        assert_eq!(dev.disk().snapshot(), image);
    }

    #[test]
    fn uncommitted_bad_target_is_discarded() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1)]);
        append_raw(&dev, &data(3, 9));
        append_raw(&dev, &data(85, 9));

        let stat = journal.stat(&dev).unwrap();
        assert_eq!((stat.committed_txns, stat.uncommitted), (1, 2));
        assert_eq!(journal.committed_blks(&dev).unwrap().len(), 1);
        assert_eq!(
            journal.install(&dev).unwrap(),
            InstallOutcome::Installed {
                txns: 1,
                blks: 1,
                discarded: 2
            }
        );
        assert!(filled(&dev, 30, 1));
        assert!(journal.header(&dev).unwrap().is_empty());
    }

    #[test]
    fn committed_blks_keeps_newest_image() {
        let (dev, journal) = (blk_device(), journal());
        journal.ensure_initialized(&dev).unwrap();
        commit_txn(&dev, &[(30, 1), (31, 2)]);
        commit_txn(&dev, &[(30, 3)]);
        journal.append(&dev, &data(32, 4)).unwrap();

        let blks = journal.committed_blks(&dev).unwrap();
        assert_eq!(blks.len(), 2);
        assert!(blks[&30].iter().all(|b| *b == 3));
        assert!(blks[&31].iter().all(|b| *b == 2));
        assert!(!blks.contains_key(&32));
    }
}
