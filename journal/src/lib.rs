use std::{
    convert::TryFrom,
    fs::{File, OpenOptions},
    io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write},
    path::Path,
};

use vsfs::{consts, DiskError, DiskResult};

pub type SpinMutex<T> = spin::Mutex<T>;

/// Forces written data down to stable storage.
pub trait Persist {
    fn persist(&mut self) -> io::Result<()>;
}

impl Persist for File {
    fn persist(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl<T> Persist for Cursor<T> {
    fn persist(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Byte length of an image of `blocks` blocks, or `None` if the layout
/// does not fit or the image would not be addressable.
pub fn image_len(blocks: u32) -> Option<u32> {
    if blocks <= consts::DATA_START_BLK_ID {
        return None;
    }
    blocks.checked_mul(consts::BLOCK_SIZE)
}

/// A `vsfs::Disk` over anything seekable, typically the image file.
pub struct IODisk<IO> {
    io: SpinMutex<IO>,
    capacity: u32,
}

impl<IO> IODisk<IO> {
    pub fn new(io: IO, capacity: u32) -> Self {
        Self {
            io: SpinMutex::new(io),
            capacity,
        }
    }
}

impl IODisk<File> {
    /// Opens an existing image, its capacity is the file length.
    pub fn open(path: &Path, read_only: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let len = file.metadata()?.len();
        let capacity = u32::try_from(len)
            .map_err(|_| io::Error::new(ErrorKind::InvalidData, "image larger than 4 GiB"))?;
        Ok(Self::new(file, capacity))
    }

    /// Creates (or truncates) an image of `capacity` zero bytes.
    pub fn create(path: &Path, capacity: u32) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(capacity as u64)?;
        Ok(Self::new(file, capacity))
    }
}

impl<IO: Read + Write + Seek + Persist> vsfs::Disk for IODisk<IO> {
    fn read_at(&self, offset: u32, buf: &mut [u8]) -> DiskResult<u32> {
        let mut io = self.io.lock();
        io.seek(SeekFrom::Start(offset as u64)).map_err(disk_err)?;
        let mut read_len = 0;
        while read_len < buf.len() {
            match io.read(&mut buf[read_len..]) {
                Ok(0) => break,
                Ok(n) => read_len += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(disk_err(e)),
            }
        }
        Ok(read_len as u32)
    }

    fn write_at(&self, offset: u32, buf: &[u8]) -> DiskResult<u32> {
        let mut io = self.io.lock();
        io.seek(SeekFrom::Start(offset as u64)).map_err(disk_err)?;
        io.write_all(buf).map_err(disk_err)?;
        Ok(buf.len() as u32)
    }

    fn sync(&self) -> DiskResult<()> {
        let mut io = self.io.lock();
        io.flush().map_err(disk_err)?;
        io.persist().map_err(disk_err)
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }
}

fn disk_err(e: io::Error) -> DiskError {
    Box::new(e)
}

/// Renders a `vsfs::Error`, looking through disk errors raised by `IODisk`.
pub fn describe(err: &vsfs::Error) -> String {
    match err {
        vsfs::Error::DiskError(e) => match e.downcast_ref::<io::Error>() {
            Some(io_err) => format!("disk error: {}", io_err),
            None => err.to_string(),
        },
        _ => err.to_string(),
    }
}
