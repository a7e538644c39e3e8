//! On-disk layout of the journal.
//!
//! ```text
//! journal base
//! +----------------+----------------------------------+--------+-----
//! | magic | used   | type=1 | size | blk_no | payload | type=2 | ...
//! +----------------+----------------------------------+--------+-----
//!   header (8)       data record (8 + block size)       commit (4)
//! ```
//!
//! All integers are little-endian.

use alloc::vec::Vec;
use byte_struct::*;
use num_enum::num_enum;

use crate::{
    blk_device::{FromBytes, ToBytes},
    consts, BlkId,
};

pub const JOURNAL_MAGIC: u32 = 0x4A52_4E4C;

/// Size of the journal header, also the `bytes_used` of an empty journal.
pub const HEADER_LEN: u32 = RawJournalHeader::BYTE_LEN as u32;
pub const REC_HEADER_LEN: u32 = RawRecHeader::BYTE_LEN as u32;
pub const DATA_REC_LEN: u32 = REC_HEADER_LEN + 4 + consts::BLOCK_SIZE;
pub const COMMIT_REC_LEN: u32 = REC_HEADER_LEN;

#[derive(ByteStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawJournalHeader {
    pub magic: u32,
    /// Header plus every stored record, i.e. the write cursor
    /// relative to the journal base.
    pub bytes_used: u32,
}

byte_struct_bytes!(RawJournalHeader);

impl RawJournalHeader {
    pub fn empty() -> Self {
        Self {
            magic: JOURNAL_MAGIC,
            bytes_used: HEADER_LEN,
        }
    }

    pub fn valid(&self) -> bool {
        self.magic == JOURNAL_MAGIC
    }

    pub fn is_empty(&self) -> bool {
        self.bytes_used == HEADER_LEN
    }
}

num_enum! {
    pub RecordType: u16 {
        Data = 1,
        Commit = 2,
    }
}

impl RecordType {
    /// The only valid encoded size of a record of this type.
    pub fn encoded_len(self) -> u32 {
        match self {
            RecordType::Data => DATA_REC_LEN,
            RecordType::Commit => COMMIT_REC_LEN,
        }
    }
}

#[derive(ByteStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawRecHeader {
    pub ty: u16,
    /// Total bytes of the record, this header included
    pub size: u16,
}

byte_struct_bytes!(RawRecHeader);

#[derive(Clone, PartialEq, Eq)]
pub enum Record {
    /// Once committed, `payload` must be written to block `blk_id`.
    Data { blk_id: BlkId, payload: Vec<u8> },
    /// Ends the transaction made of every data record since the previous commit.
    Commit,
}

impl Record {
    pub fn ty(&self) -> RecordType {
        match self {
            Record::Data { .. } => RecordType::Data,
            Record::Commit => RecordType::Commit,
        }
    }

    pub fn encoded_len(&self) -> u32 {
        self.ty().encoded_len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = self.encoded_len();
        let mut out = vec![0; len as usize];
        RawRecHeader {
            ty: self.ty().into(),
            size: len as u16,
        }
        .to_bytes(&mut out[..REC_HEADER_LEN as usize]);

        if let Record::Data { blk_id, payload } = self {
            debug_assert_eq!(payload.len(), consts::BLOCK_SIZE as usize);
            let body = &mut out[REC_HEADER_LEN as usize..];
            body[..4].copy_from_slice(&blk_id.to_le_bytes());
            body[4..].copy_from_slice(payload);
        }
        out
    }

    /// Decodes the record at the start of `bytes`, returning it with its
    /// encoded length.
    ///
    /// `None` marks the end of the log: too few bytes, an unknown tag, or
    /// a size that does not belong to the tag.
    pub fn decode(bytes: &[u8]) -> Option<(Record, u32)> {
        let header = RawRecHeader::from_bytes(bytes)?;
        let ty = RecordType::from_primitive(header.ty)?;
        let len = ty.encoded_len();
        if header.size as u32 != len || bytes.len() < len as usize {
            return None;
        }

        let record = match ty {
            RecordType::Data => {
                let body = &bytes[REC_HEADER_LEN as usize..len as usize];
                let mut blk_no = [0; 4];
                blk_no.copy_from_slice(&body[..4]);
                Record::Data {
                    blk_id: BlkId::from_le_bytes(blk_no),
                    payload: body[4..].to_vec(),
                }
            }
            RecordType::Commit => Record::Commit,
        };
        Some((record, len))
    }
}

impl core::fmt::Debug for Record {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Record::Data { blk_id, payload } => f
                .debug_struct("Data")
                .field("blk_id", blk_id)
                .field("payload_len", &payload.len())
                .finish(),
            Record::Commit => f.write_str("Commit"),
        }
    }
}
