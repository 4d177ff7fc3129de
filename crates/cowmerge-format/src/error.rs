//! Error types for exception store format operations

use thiserror::Error;

/// Result type for format operations
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors that can occur when decoding an exception store header
#[derive(Debug, Error)]
pub enum FormatError {
    /// Header magic does not identify a copy-on-write exception store
    #[error("Invalid magic: expected 0x{expected:08x}, got 0x{found:08x}")]
    BadMagic {
        /// Magic value read from disk
        found: u32,
        /// Magic value of the supported format
        expected: u32,
    },

    /// Metadata format version is not the supported one
    #[error("Unsupported metadata format version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Version read from disk
        found: u32,
        /// Only supported version
        expected: u32,
    },

    /// The valid flag is not set
    #[error("Store is not marked valid: valid flag is {found}")]
    NotValid {
        /// Flag value read from disk
        found: u32,
    },

    /// Chunk size of zero sectors
    #[error("Invalid chunk size: must be > 0 sectors")]
    ZeroChunkSize,

    /// Not enough bytes for a header
    #[error("Truncated header: need {needed} bytes, got {len}")]
    Truncated {
        /// Number of bytes supplied
        len: usize,
        /// Number of bytes required
        needed: usize,
    },

    /// Shadow data handed to the builder does not fit in one chunk
    #[error("Chunk data too large: {len} bytes, chunk holds {chunk_bytes}")]
    ChunkDataTooLarge {
        /// Length of the supplied data
        len: usize,
        /// Chunk size in bytes
        chunk_bytes: u64,
    },

    /// Image position not representable
    #[error("Store image too large for this platform")]
    ImageTooLarge,

    /// Binary parsing error
    #[error("Binary parsing error: {0}")]
    Binary(#[from] binrw::Error),
}
