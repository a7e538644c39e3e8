use crate::{Addr, BlkId, BlkSize, Error, Result};
use alloc::{boxed::Box, vec::Vec};
use core::any::Any;

pub type DiskError = Box<dyn Any + Send>;

pub type DiskResult<T> = core::result::Result<T, DiskError>;

pub trait FromBytes {
    const BYTES_LEN: usize;

    fn from_bytes(bytes: &[u8]) -> Option<Self>
    where
        Self: Sized;
}

pub trait ToBytes {
    fn bytes_len(&self) -> usize;

    fn to_bytes(&self, out: &mut [u8]);
}

/// Implements `FromBytes`/`ToBytes` for a `#[derive(ByteStruct)]` type.
macro_rules! byte_struct_bytes {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::blk_device::FromBytes for $ty {
            const BYTES_LEN: usize = <$ty as byte_struct::ByteStructLen>::BYTE_LEN;

            fn from_bytes(bytes: &[u8]) -> Option<Self>
            where
                Self: Sized,
            {
                if bytes.len() < Self::BYTES_LEN {
                    return None;
                }
                Some(<$ty as byte_struct::ByteStruct>::read_bytes(bytes))
            }
        }

        impl $crate::blk_device::ToBytes for $ty {
            fn bytes_len(&self) -> usize {
                <$ty as byte_struct::ByteStructLen>::BYTE_LEN
            }

            fn to_bytes(&self, out: &mut [u8]) {
                byte_struct::ByteStruct::write_bytes(self, out);
            }
        }
    )+};
}

/// A byte addressed backing store.
///
/// Callers own the store exclusively: nothing here guards against a second
/// process writing the same image.
pub trait Disk {
    /// Reads into `buf` starting at `offset`,
    /// returns the number of bytes read.
    fn read_at(&self, offset: u32, buf: &mut [u8]) -> DiskResult<u32>;

    /// Writes `buf` starting at `offset`,
    /// returns the number of bytes written.
    fn write_at(&self, offset: u32, buf: &[u8]) -> DiskResult<u32>;

    fn sync(&self) -> DiskResult<()>;

    fn capacity(&self) -> u32;
}

/// Logic block devices
pub struct BlkDevice<DK> {
    disk: DK,
    pub blk_size: BlkSize,
    blks_count: u32,
    read_only: bool,
}

impl<DK: Disk> BlkDevice<DK> {
    pub fn new(disk: DK, blk_size: BlkSize, read_only: bool) -> Self {
        let blks_count = blk_size.div_by(disk.capacity());
        Self {
            disk,
            blk_size,
            blks_count,
            read_only,
        }
    }

    pub fn blks_count(&self) -> u32 {
        self.blks_count
    }

    /// Reads block device data by byte
    /// and returns the number of bytes of data read
    pub fn read_at(&self, addr: Addr, buf: &mut [u8]) -> Result<u32> {
        self.disk
            .read_at(addr.abs_offset(self.blk_size), buf)
            .map_err(Error::DiskError)
    }

    /// Fills `buf` completely or fails with `Error::ShortIo`.
    pub fn read_exact(&self, addr: Addr, buf: &mut [u8]) -> Result<()> {
        let read_len = self.read_at(addr, buf)?;
        if read_len as usize != buf.len() {
            return Err(Error::ShortIo {
                offset: addr.abs_offset(self.blk_size),
            });
        }
        Ok(())
    }

    pub fn write_at(&self, addr: Addr, buf: &[u8]) -> Result<u32> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        self.disk
            .write_at(addr.abs_offset(self.blk_size), buf)
            .map_err(Error::DiskError)
    }

    pub fn write_all(&self, addr: Addr, buf: &[u8]) -> Result<()> {
        let written = self.write_at(addr, buf)?;
        if written as usize != buf.len() {
            return Err(Error::ShortIo {
                offset: addr.abs_offset(self.blk_size),
            });
        }
        Ok(())
    }

    /// Reads the whole block `blk_id`.
    pub fn read_blk(&self, blk_id: BlkId) -> Result<BlkBuf> {
        self.check_blk_id(blk_id)?;
        let mut blk = BlkBuf::zeroed(self.blk_size);
        self.read_exact(Addr::new(blk_id, 0), blk.as_mut_slice())?;
        Ok(blk)
    }

    /// Overwrites the whole block `blk_id` with `data`.
    pub fn write_blk(&self, blk_id: BlkId, data: &[u8]) -> Result<()> {
        self.check_blk_id(blk_id)?;
        debug_assert_eq!(data.len(), self.blk_size.size() as usize);
        self.write_all(Addr::new(blk_id, 0), data)
    }

    pub fn read_val_at<T: FromBytes>(&self, addr: Addr) -> Result<T> {
        let mut bytes = vec![0; T::BYTES_LEN];
        self.read_exact(addr, &mut bytes)?;
        T::from_bytes(&bytes).ok_or(Error::ShortIo {
            offset: addr.abs_offset(self.blk_size),
        })
    }

    pub fn write_value_at<T: ToBytes>(&self, addr: Addr, val: &T) -> Result<()> {
        let mut bytes = vec![0; val.bytes_len()];
        val.to_bytes(&mut bytes);
        self.write_all(addr, &bytes)
    }

    pub fn disk(&self) -> &DK {
        &self.disk
    }

    pub fn sync(&self) -> Result<()> {
        self.disk.sync().map_err(Error::DiskError)
    }

    fn check_blk_id(&self, blk_id: BlkId) -> Result<()> {
        if blk_id >= self.blks_count {
            return Err(Error::BlkOutOfRange(blk_id));
        }
        Ok(())
    }
}

/// In-memory copy of one block.
#[derive(Clone, PartialEq, Eq)]
pub struct BlkBuf(Box<[u8]>);

impl BlkBuf {
    pub fn zeroed(blk_size: BlkSize) -> Self {
        Self(vec![0; blk_size.size() as usize].into())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }

    /// Decodes a `T` stored at `offset` within the block.
    pub fn read_val<T: FromBytes>(&self, offset: u32) -> Option<T> {
        let offset = offset as usize;
        T::from_bytes(self.0.get(offset..offset.checked_add(T::BYTES_LEN)?)?)
    }

    /// Encodes `val` at `offset` within the block.
    pub fn write_val<T: ToBytes>(&mut self, offset: u32, val: &T) {
        let offset = offset as usize;
        val.to_bytes(&mut self.0[offset..offset + val.bytes_len()]);
    }

    pub fn zero_range(&mut self, offset: u32, len: u32) {
        self.0[offset as usize..(offset + len) as usize]
            .iter_mut()
            .for_each(|b| *b = 0);
    }
}

impl From<Vec<u8>> for BlkBuf {
    fn from(data: Vec<u8>) -> Self {
        Self(data.into_boxed_slice())
    }
}

impl ToBytes for BlkBuf {
    fn bytes_len(&self) -> usize {
        self.0.len()
    }

    fn to_bytes(&self, out: &mut [u8]) {
        out.copy_from_slice(&self.0);
    }
}

impl core::fmt::Debug for BlkBuf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "BlkBuf({} bytes)", self.0.len())
    }
}
