use crate::{
    blk_device::{BlkDevice, Disk, ToBytes},
    Addr, Result,
};

/// A value read from `addr`, remembering whether it was modified since.
///
/// Dirty values are either written back in place with [`MaybeDirty::sync`]
/// or handed to a journal transaction, which clears the flag once the
/// value is staged.
pub struct MaybeDirty<T> {
    inner: T,
    is_dirty: bool,
    pub addr: Addr,
}

impl<T> MaybeDirty<T> {
    pub fn new(addr: Addr, inner: T) -> Self {
        Self {
            inner,
            is_dirty: false,
            addr,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    /// Writes the value back to `addr` if it was modified.
    pub fn sync<DK: Disk>(&mut self, blk_device: &BlkDevice<DK>) -> Result<()>
    where
        T: ToBytes,
    {
        if self.is_dirty {
            blk_device.write_value_at(self.addr, &self.inner)?;
            self.is_dirty = false;
        }

        Ok(())
    }
}

impl<T> core::ops::Deref for MaybeDirty<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for MaybeDirty<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.is_dirty = true;
        &mut self.inner
    }
}
