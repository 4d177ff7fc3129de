//! Parser and builder for the snapshot copy-on-write exception store format
//!
//! A copy-on-write (COW) device records, for a backing volume, which chunks
//! have been copied aside ("exceptions") and where the saved copy lives.
//! Version 1 of the persistent format is laid out as:
//!
//! - chunks are a fixed number of 512-byte sectors, set at creation time
//! - chunk 0 starts with a 16-byte header holding that chunk size
//! - chunk 1 is a metadata area: as many 16-byte exception slots as fit
//! - the metadata area is followed by the data chunk of each used slot
//! - the device repeats metadata area, data chunks, metadata area, ...
//! - the first slot with `new_chunk == 0` ends the exception list
//!
//! This crate only deals with bytes. Reading devices and applying
//! exceptions lives in the `cowmerge` crate.
//!
//! # Example
//!
//! ```rust
//! use cowmerge_format::{DiskException, StoreBuilder, StoreHeader, StoreLayout};
//!
//! let mut builder = StoreBuilder::new(8)?;
//! let new_chunk = builder.add_exception(42, b"saved contents")?;
//! let image = builder.build()?;
//!
//! let header = StoreHeader::parse(&image)?;
//! let layout = StoreLayout::from_header(&header)?;
//! assert_eq!(layout.exceptions_per_area(), 256);
//!
//! let area = layout.area_offset(0).unwrap() as usize;
//! let slot = DiskException::decode_slot(&image[area..], 0).unwrap();
//! assert_eq!(slot, DiskException::new(42, new_chunk));
//! # Ok::<(), cowmerge_format::FormatError>(())
//! ```

#![warn(missing_docs)]

/// Store image builder
pub mod builder;
/// Format error types
pub mod error;
/// Exception slot codec
pub mod exception;
/// Store header codec
pub mod header;
/// Chunk and area arithmetic
pub mod layout;

pub use builder::StoreBuilder;
pub use error::{FormatError, FormatResult};
pub use exception::{DiskException, EXCEPTION_SIZE, ExceptionRecord};
pub use header::{
    HEADER_SIZE, SNAPSHOT_DISK_MAGIC, SNAPSHOT_DISK_VERSION, SNAPSHOT_VALID_FLAG, StoreHeader,
};
pub use layout::{SECTOR_SHIFT, SECTOR_SIZE, StoreLayout};
