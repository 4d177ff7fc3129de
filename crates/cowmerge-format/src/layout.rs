//! Chunk and metadata area arithmetic
//!
//! The store is an array of fixed-size chunks. Chunk 0 holds the header.
//! Metadata areas are found purely by position: area `a` is chunk
//! `1 + a * (exceptions_per_area + 1)` and is followed by one data chunk per
//! slot.
//!
//! ```text
//! chunk:  0        1        2 .. E+1          E+2      E+3 ..
//!         [header] [area 0] [data for area 0] [area 1] [data for area 1] ...
//! ```
//!
//! Every function here is pure and uses checked arithmetic. `None` means the
//! requested position cannot be expressed as a `u64` byte offset.

use crate::error::{FormatError, FormatResult};
use crate::exception::EXCEPTION_SIZE;
use crate::header::StoreHeader;

/// log2 of the sector size
pub const SECTOR_SHIFT: u32 = 9;

/// Sector size in bytes; chunk sizes are expressed in sectors
pub const SECTOR_SIZE: u64 = 1 << SECTOR_SHIFT;

/// Geometry of an exception store, derived once from its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLayout {
    chunk_size: u32,
    chunk_bytes: u64,
    exceptions_per_area: u64,
}

impl StoreLayout {
    /// Layout for a chunk size given in sectors
    pub fn new(chunk_size: u32) -> FormatResult<Self> {
        if chunk_size == 0 {
            return Err(FormatError::ZeroChunkSize);
        }

        let chunk_bytes = u64::from(chunk_size) << SECTOR_SHIFT;
        Ok(Self {
            chunk_size,
            chunk_bytes,
            exceptions_per_area: chunk_bytes / EXCEPTION_SIZE as u64,
        })
    }

    /// Layout described by a header; the header is validated first
    pub fn from_header(header: &StoreHeader) -> FormatResult<Self> {
        header.validate()?;
        Self::new(header.chunk_size)
    }

    /// Chunk size in sectors
    pub const fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Chunk size in bytes
    pub const fn chunk_bytes(&self) -> u64 {
        self.chunk_bytes
    }

    /// Number of exception slots in one metadata area
    pub const fn exceptions_per_area(&self) -> u64 {
        self.exceptions_per_area
    }

    /// Number of chunks one area spans, metadata chunk included
    pub const fn area_stride(&self) -> u64 {
        self.exceptions_per_area + 1
    }

    /// Byte offset of chunk `chunk`
    pub const fn chunk_offset(&self, chunk: u64) -> Option<u64> {
        chunk.checked_mul(self.chunk_bytes)
    }

    /// Chunk index of metadata area `area`
    pub fn area_chunk(&self, area: u64) -> Option<u64> {
        area.checked_mul(self.area_stride())?.checked_add(1)
    }

    /// Byte offset of metadata area `area`
    pub fn area_offset(&self, area: u64) -> Option<u64> {
        self.chunk_offset(self.area_chunk(area)?)
    }

    /// Byte offset of slot `slot` within its metadata area
    pub fn slot_offset(&self, slot: u64) -> Option<u64> {
        if slot >= self.exceptions_per_area {
            return None;
        }
        slot.checked_mul(EXCEPTION_SIZE as u64)
    }

    /// Chunk that a well-formed store uses for the data of slot `slot` in
    /// area `area`.
    ///
    /// Readers must not rely on this; the slot's `new_chunk` is
    /// authoritative. Writers use it to lay out new stores.
    pub fn data_chunk(&self, area: u64, slot: u64) -> Option<u64> {
        if slot >= self.exceptions_per_area {
            return None;
        }
        self.area_chunk(area)?.checked_add(1 + slot)
    }

    /// Whether `chunk` is the header chunk or a metadata area
    pub const fn is_metadata_chunk(&self, chunk: u64) -> bool {
        chunk == 0 || (chunk - 1) % self.area_stride() == 0
    }

    /// Chunk size in bytes as a buffer length
    pub fn buffer_len(&self) -> Option<usize> {
        usize::try_from(self.chunk_bytes).ok()
    }
}
