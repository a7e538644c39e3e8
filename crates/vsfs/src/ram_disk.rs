use alloc::{boxed::Box, vec::Vec};
use lock_api::RwLock;

use crate::blk_device::{Disk, DiskResult};

#[derive(Debug)]
pub enum Error {
    InvalidParam,
}

/// A disk based on RAM.
pub struct RamDisk<RwLockType> {
    data: RwLock<RwLockType, Vec<u8>>,
    capacity: u32,
}

impl<RwLockType> RamDisk<RwLockType>
where
    RwLockType: lock_api::RawRwLock,
{
    /// Constructs a new, zero filled `RamDisk`.
    pub fn new(capacity: u32) -> Self {
        let data = vec![0; capacity as usize];
        Self {
            data: RwLock::new(data),
            capacity,
        }
    }

    /// Copies out the whole disk content.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    fn check_offset(&self, offset: u32) -> DiskResult<()> {
        if offset >= self.capacity {
            return Err(Box::new(Error::InvalidParam));
        }
        Ok(())
    }
}

impl<RwLockType> Disk for RamDisk<RwLockType>
where
    RwLockType: lock_api::RawRwLock,
{
    fn read_at(&self, offset: u32, buf: &mut [u8]) -> DiskResult<u32> {
        self.check_offset(offset)?;
        let data = self.data.read();
        let end_pos = (offset + buf.len() as u32).min(self.capacity);
        let len = (end_pos - offset) as usize;
        buf[..len].copy_from_slice(&data[offset as usize..end_pos as usize]);
        Ok(end_pos - offset)
    }

    fn write_at(&self, offset: u32, src: &[u8]) -> DiskResult<u32> {
        self.check_offset(offset)?;
        let mut data = self.data.write();
        let end_pos = (offset + src.len() as u32).min(self.capacity);
        let len = (end_pos - offset) as usize;
        data[offset as usize..end_pos as usize].copy_from_slice(&src[..len]);
        Ok(end_pos - offset)
    }

    fn sync(&self) -> DiskResult<()> {
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod test {
    use super::RamDisk;
    use crate::blk_device::Disk;

    #[test]
    fn clips_at_capacity() {
        let disk = RamDisk::<spin::RwLock<()>>::new(16);
        assert_eq!(disk.write_at(12, &[1, 2, 3, 4, 5, 6]).unwrap(), 4);

        let mut buf = [0; 8];
        assert_eq!(disk.read_at(10, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], &[0, 0, 1, 2, 3, 4]);
        assert!(disk.read_at(16, &mut buf).is_err());
    }
}
