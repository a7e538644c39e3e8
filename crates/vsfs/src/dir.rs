use crate::{blk_device::BlkBuf, consts::DIR_NAME_LEN, Error, InodeId, Result};
use alloc::vec::Vec;
use byte_struct::*;
use core::{convert::TryFrom, fmt, str};

/// RawDirEntry
#[derive(ByteStruct, Clone, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawDirEntry {
    /// inode number of the directory entry.
    pub inode_id: InodeId,
    /// NUL padded name, an all-zero name marks a free slot
    name: [u8; DIR_NAME_LEN],
}

byte_struct_bytes!(RawDirEntry);

impl RawDirEntry {
    pub const LEN: u32 = (4 + DIR_NAME_LEN) as u32;

    pub fn new(inode_id: InodeId, name: &DirEntryName) -> Self {
        Self {
            inode_id,
            name: name.bytes,
        }
    }

    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(DIR_NAME_LEN);
        &self.name[..len]
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }
}

impl fmt::Debug for RawDirEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RawDirEntry")
            .field("inode_id", &self.inode_id)
            .field("name", &str::from_utf8(self.name()).unwrap_or("<non-utf8>"))
            .finish()
    }
}

/// Number of entry slots in one directory block.
pub fn slots_per_blk(blk: &BlkBuf) -> u32 {
    blk.as_slice().len() as u32 / RawDirEntry::LEN
}

/// Index of the first free slot in `blk`.
pub fn find_free_slot(blk: &BlkBuf) -> Option<u32> {
    (0..slots_per_blk(blk)).find(|slot| {
        blk.read_val::<RawDirEntry>(slot * RawDirEntry::LEN)
            .map_or(false, |entry| entry.is_free())
    })
}

/// Stores `entry` in slot `slot` of `blk`.
pub fn put_entry(blk: &mut BlkBuf, slot: u32, entry: &RawDirEntry) {
    blk.write_val(slot * RawDirEntry::LEN, entry);
}

/// The used entries of `blk`, in slot order.
pub fn entries(blk: &BlkBuf) -> Vec<RawDirEntry> {
    (0..slots_per_blk(blk))
        .filter_map(|slot| blk.read_val::<RawDirEntry>(slot * RawDirEntry::LEN))
        .filter(|entry| !entry.is_free())
        .collect()
}

/// A directory entry name, truncated to `DIR_NAME_LEN - 1` bytes so that
/// it is always NUL terminated on disk.
#[derive(Clone, PartialEq, Eq)]
pub struct DirEntryName {
    bytes: [u8; DIR_NAME_LEN],
    len: u8,
}

impl DirEntryName {
    /// Builds a name without checking it, used for `.` and `..`.
    pub(crate) fn truncated(s: &[u8]) -> Self {
        let len = s.len().min(DIR_NAME_LEN - 1);
        let mut bytes = [0; DIR_NAME_LEN];
        bytes[..len].copy_from_slice(&s[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl TryFrom<&[u8]> for DirEntryName {
    type Error = Error;

    fn try_from(s: &[u8]) -> Result<Self> {
        check_dir_entry_name(s)?;
        Ok(Self::truncated(s))
    }
}

impl fmt::Debug for DirEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", str::from_utf8(self.as_slice()).unwrap_or("<non-utf8>"))
    }
}

fn check_dir_entry_name(name: &[u8]) -> Result<()> {
    // A leading NUL would read back as a free slot.
    if name.is_empty() || name[0] == 0 || name == b"." || name == b".." {
        Err(Error::InvalidDirEntryName(name.into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use alloc::vec::Vec;
    use core::convert::TryFrom;

    use super::{entries, find_free_slot, put_entry, DirEntryName, RawDirEntry};
    use crate::{blk_device::BlkBuf, BlkSize, Error};

    #[test]
    fn long_names_are_truncated() {
        let name = DirEntryName::try_from(&b"a-very-long-file-name-that-overflows.txt"[..]).unwrap();
        assert_eq!(name.as_slice().len(), 27);
        assert_eq!(name.as_slice(), &b"a-very-long-file-name-that-"[..]);

        let entry = RawDirEntry::new(3, &name);
        assert_eq!(entry.name(), name.as_slice());
    }

    #[test]
    fn rejects_reserved_names() {
        for bad in [&b""[..], &b"."[..], &b".."[..], &b"\0x"[..]] {
            assert!(matches!(
                DirEntryName::try_from(bad),
                Err(Error::InvalidDirEntryName(_))
            ));
        }
    }

    #[test]
    fn free_slots() {
        let mut blk = BlkBuf::zeroed(BlkSize::new(128));
        assert_eq!(find_free_slot(&blk), Some(0));

        for (slot, name) in [&b"a"[..], &b"b"[..], &b"c"[..], &b"d"[..]].iter().enumerate() {
            let name = DirEntryName::try_from(*name).unwrap();
            put_entry(&mut blk, slot as u32, &RawDirEntry::new(slot as u32, &name));
        }
        assert_eq!(find_free_slot(&blk), None);
        assert_eq!(entries(&blk).len(), 4);

        put_entry(
            &mut blk,
            2,
            &RawDirEntry {
                inode_id: 0,
                name: [0; 28],
            },
        );
        assert_eq!(find_free_slot(&blk), Some(2));
        let names: Vec<_> = entries(&blk).iter().map(|e| e.name().to_vec()).collect();
        assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec()]);
    }
}
