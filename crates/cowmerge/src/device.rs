//! Byte-addressable block devices.
//!
//! A session reads the exception store and writes the backing volume through
//! [`BlockDevice`]. Every operation either transfers the full buffer or
//! fails; a short read or write is never reported as success.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use cowmerge_format::SECTOR_SIZE;
use tracing::debug;

use crate::{Result, StoreError};

/// Exact-length positional I/O on a storage extent.
pub trait BlockDevice {
    /// Fill `buf` from `offset`, or fail.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write all of `buf` at `offset`, or fail.
    fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Flush written data to stable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for &mut D {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        (**self).write_exact_at(offset, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

impl<D: BlockDevice + ?Sized> BlockDevice for Box<D> {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        (**self).write_exact_at(offset, buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// How a [`FileDevice`] is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Reads only (inspect, dump, verify).
    ReadOnly,
    /// Writes only (merge target).
    WriteOnly,
    /// Reads and writes (scrub).
    ReadWrite,
}

impl AccessMode {
    /// Check if this mode allows reads.
    pub const fn can_read(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Check if this mode allows writes.
    pub const fn can_write(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }

    fn options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(self.can_read()).write(self.can_write());
        options
    }
}

/// Block device backed by a file or device node.
///
/// Offsets and lengths must be whole 512-byte sectors.
#[derive(Debug)]
pub struct FileDevice {
    file: File,
    path: PathBuf,
}

impl FileDevice {
    /// Open an existing file or device node.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = mode.options().open(&path).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;

        debug!("Opened {} ({:?})", path.display(), mode);
        Ok(Self { file, path })
    }

    /// Wrap an already open file.
    pub fn from_file(file: File, path: impl AsRef<Path>) -> Self {
        Self {
            file,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give back the underlying file.
    pub fn into_inner(self) -> File {
        self.file
    }
}

fn check_aligned(offset: u64, len: usize) -> io::Result<()> {
    if offset % SECTOR_SIZE != 0 || len as u64 % SECTOR_SIZE != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "unaligned I/O: offset {offset} and length {len} must be multiples of {SECTOR_SIZE}"
            ),
        ));
    }
    Ok(())
}

impl BlockDevice for FileDevice {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        check_aligned(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        check_aligned(offset, buf.len())?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Fixed-size in-memory block device.
///
/// Reads and writes outside the buffer fail instead of growing it, the
/// way a real block device would.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryDevice {
    data: Vec<u8>,
}

impl MemoryDevice {
    /// Wrap existing contents.
    pub const fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Device of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0u8; len])
    }

    /// Current contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the contents.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the device has zero size.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Give back the contents.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn range(&self, offset: u64, len: usize) -> Option<std::ops::Range<usize>> {
        let start = usize::try_from(offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.data.len()).then_some(start..end)
    }
}

impl BlockDevice for MemoryDevice {
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let range = self.range(offset, buf.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "read past end of device")
        })?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let range = self
            .range(offset, buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::WriteZero, "write past end of device"))?;
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_memory_device_round_trip() {
        let mut dev = MemoryDevice::zeroed(1024);
        dev.write_exact_at(512, &[0xAB; 512]).unwrap();

        let mut buf = [0u8; 512];
        dev.read_exact_at(512, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 512]);
        assert!(dev.as_bytes()[..512].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_memory_device_short_read_fails() {
        let mut dev = MemoryDevice::zeroed(1000);
        let mut buf = [0u8; 512];
        let err = dev.read_exact_at(512, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_memory_device_does_not_grow() {
        let mut dev = MemoryDevice::zeroed(512);
        let err = dev.write_exact_at(512, &[1u8; 16]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(dev.len(), 512);
    }

    #[test]
    fn test_memory_device_offset_overflow() {
        let mut dev = MemoryDevice::zeroed(512);
        let mut buf = [0u8; 16];
        assert!(dev.read_exact_at(u64::MAX, &mut buf).is_err());
    }

    #[test]
    fn test_alignment_check() {
        assert!(check_aligned(0, 512).is_ok());
        assert!(check_aligned(4096, 8192).is_ok());
        assert!(check_aligned(16, 512).is_err());
        assert!(check_aligned(512, 16).is_err());
    }

    #[test]
    fn test_access_mode_flags() {
        assert!(AccessMode::ReadOnly.can_read());
        assert!(!AccessMode::ReadOnly.can_write());
        assert!(!AccessMode::WriteOnly.can_read());
        assert!(AccessMode::ReadWrite.can_read() && AccessMode::ReadWrite.can_write());
    }

    #[test]
    fn test_device_through_mutable_reference() {
        fn fill<D: BlockDevice>(mut dev: D) {
            dev.write_exact_at(0, &[7u8; 4]).unwrap();
        }

        let mut dev = MemoryDevice::zeroed(8);
        fill(&mut dev);
        assert_eq!(&dev.as_bytes()[..4], &[7u8; 4]);
    }
}
