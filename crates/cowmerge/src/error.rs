//! Error types for exception store sessions.
//!
//! Every error carries structured fields (device, offset, chunk index).
//! Turning them into operator-facing text is left to the caller.

use std::fmt;
use std::io;
use std::path::PathBuf;

use cowmerge_format::FormatError;
use thiserror::Error;

/// Which of the two devices an I/O error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// The exception store (COW) device
    Store,
    /// The backing (origin) device
    Backing,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => f.write_str("exception store"),
            Self::Backing => f.write_str("backing device"),
        }
    }
}

/// Errors raised while applying a single exception.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Shadow chunk could not be read from the exception store
    #[error("Failed to read shadow chunk {new_chunk} from the exception store: {source}")]
    ShadowRead {
        /// Store chunk that was being read
        new_chunk: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Shadow data could not be written to the backing device
    #[error("Failed to write chunk {old_chunk} to the backing device: {source}")]
    TargetWrite {
        /// Backing chunk that was being written
        old_chunk: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Errors raised while zero-filling a shadow chunk.
#[derive(Debug, Error)]
pub enum ScrubError {
    /// The record points at the header chunk or a metadata area
    #[error("Refusing to scrub chunk {new_chunk}: it holds store metadata")]
    MetadataChunk {
        /// Store chunk the record points at
        new_chunk: u64,
    },

    /// Zero-fill write failed
    #[error("Failed to scrub shadow chunk {new_chunk}: {source}")]
    Write {
        /// Store chunk that was being written
        new_chunk: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Errors raised while comparing a shadow chunk with its target.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Target chunk could not be read from the backing device
    #[error("Failed to read chunk {old_chunk} from the backing device: {source}")]
    TargetRead {
        /// Backing chunk that was being read
        old_chunk: u64,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Errors that end a session operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Header failed to decode or validate
    #[error("Not a valid copy-on-write exception store: {0}")]
    Decode(#[from] FormatError),

    /// Exact-length read or write failed
    #[error("I/O error on {device} at offset {offset} ({requested_len} bytes): {source}")]
    Io {
        /// Device the operation targeted
        device: Device,
        /// Byte offset of the operation
        offset: u64,
        /// Number of bytes requested
        requested_len: usize,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Device could not be opened
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Flushing a device failed
    #[error("Failed to sync {device}: {source}")]
    Sync {
        /// Device being flushed
        device: Device,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Metadata area offset cannot be represented
    #[error("Metadata area {area} lies beyond the addressable range")]
    AreaOutOfRange {
        /// Area index
        area: u64,
    },

    /// Chunk size exceeds the configured buffer limit
    #[error("Chunk size of {chunk_bytes} bytes exceeds the limit of {limit} bytes")]
    ChunkTooLarge {
        /// Chunk size from the header
        chunk_bytes: u64,
        /// Configured limit
        limit: u64,
    },

    /// Caller-supplied metadata buffer is shorter than a chunk
    #[error("Metadata buffer holds {len} bytes, a chunk needs {needed}")]
    BufferTooSmall {
        /// Buffer length
        len: usize,
        /// Chunk size in bytes
        needed: u64,
    },

    /// Merge of a single exception failed
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Scrub of a single exception failed
    #[error(transparent)]
    Scrub(#[from] ScrubError),

    /// Verification of a single exception failed
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl StoreError {
    /// Build an [`StoreError::Io`] for a failed exact-length operation.
    pub fn io(device: Device, offset: u64, requested_len: usize, source: io::Error) -> Self {
        Self::Io {
            device,
            offset,
            requested_len,
            source,
        }
    }
}

/// Command-line configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Scrub requested without explicit confirmation
    #[error("scrub destroys shadow data; pass --force to confirm")]
    ScrubNotConfirmed,

    /// Chunk buffer limit of zero
    #[error("--max-chunk-bytes must be greater than zero")]
    ZeroChunkLimit,
}

/// I/O error for a chunk index whose byte offset overflows `u64`.
pub(crate) fn offset_overflow(chunk: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("byte offset of chunk {chunk} overflows u64"),
    )
}
