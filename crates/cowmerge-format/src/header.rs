//! Exception store header (16 bytes at offset 0 of the store device)
//!
//! Layout, all fields little-endian:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Magic (`0x70416e53`) |
//! | 0x04   | 4    | Valid flag (must be 1) |
//! | 0x08   | 4    | Metadata format version (must be 1) |
//! | 0x0C   | 4    | Chunk size in 512-byte sectors |

use std::io::Cursor;

use binrw::{BinRead, BinWrite};

use crate::error::{FormatError, FormatResult};

/// Magic number identifying a snapshot exception store
pub const SNAPSHOT_DISK_MAGIC: u32 = 0x7041_6e53;

/// The only metadata format version this crate understands
pub const SNAPSHOT_DISK_VERSION: u32 = 1;

/// Value of the valid flag on a usable store
pub const SNAPSHOT_VALID_FLAG: u32 = 1;

/// Size of the encoded header in bytes
pub const HEADER_SIZE: usize = 16;

/// Exception store header
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little)]
pub struct StoreHeader {
    /// Format magic
    pub magic: u32,
    /// Valid flag
    pub valid: u32,
    /// Metadata format version
    pub version: u32,
    /// Chunk size in 512-byte sectors
    pub chunk_size: u32,
}

impl StoreHeader {
    /// Create a valid header for the given chunk size (in sectors)
    pub const fn new(chunk_size: u32) -> Self {
        Self {
            magic: SNAPSHOT_DISK_MAGIC,
            valid: SNAPSHOT_VALID_FLAG,
            version: SNAPSHOT_DISK_VERSION,
            chunk_size,
        }
    }

    /// Decode and validate a header from the start of `data`.
    ///
    /// Bytes past the first 16 are ignored, so the whole header chunk or
    /// its first sector can be passed directly.
    pub fn parse(data: &[u8]) -> FormatResult<Self> {
        if data.len() < HEADER_SIZE {
            return Err(FormatError::Truncated {
                len: data.len(),
                needed: HEADER_SIZE,
            });
        }

        let mut cursor = Cursor::new(&data[..HEADER_SIZE]);
        let header = Self::read_le(&mut cursor)?;
        header.validate()?;
        Ok(header)
    }

    /// Validate header fields.
    ///
    /// Checks run in a fixed order: magic, version, valid flag, chunk size.
    pub fn validate(&self) -> FormatResult<()> {
        if self.magic != SNAPSHOT_DISK_MAGIC {
            return Err(FormatError::BadMagic {
                found: self.magic,
                expected: SNAPSHOT_DISK_MAGIC,
            });
        }

        if self.version != SNAPSHOT_DISK_VERSION {
            return Err(FormatError::UnsupportedVersion {
                found: self.version,
                expected: SNAPSHOT_DISK_VERSION,
            });
        }

        if self.valid != SNAPSHOT_VALID_FLAG {
            return Err(FormatError::NotValid { found: self.valid });
        }

        if self.chunk_size == 0 {
            return Err(FormatError::ZeroChunkSize);
        }

        Ok(())
    }

    /// Encode the header to its 16-byte on-disk form
    pub fn build(&self) -> FormatResult<Vec<u8>> {
        let mut data = Vec::with_capacity(HEADER_SIZE);
        self.write_le(&mut Cursor::new(&mut data))?;
        Ok(data)
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new(8)
    }
}
