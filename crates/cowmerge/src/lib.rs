//! Snapshot copy-on-write exception store tooling.
//!
//! A snapshot's exception store (the "COW device") records which chunks of
//! a backing volume were copied aside and where the saved copies live. This
//! crate walks that store and can:
//!
//! - list every exception (`inspect`)
//! - dump the saved data of every exception (`dump`)
//! - copy the saved data back onto the backing volume (`merge`)
//! - check which exceptions already match the backing volume (`verify`)
//! - zero-fill the saved data in place (`scrub`)
//!
//! # Architecture
//!
//! - `device`: exact-length positional I/O on files and memory
//! - `walker`: lazy walk over the metadata areas
//! - `merge`: per-record chunk operations
//! - `session`: an open store and the whole-store operations
//! - `report`: structured events and their renderers
//! - `config`: session configuration and the command line
//!
//! The on-disk format itself lives in the `cowmerge-format` crate and is
//! re-exported here.
//!
//! # Example
//!
//! ```no_run
//! use cowmerge::{AccessMode, FileDevice, Session, SessionConfig, TracingReporter};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = FileDevice::open("/dev/vg/snap-cow", AccessMode::ReadOnly)?;
//!     let mut backing = FileDevice::open("/dev/vg/origin", AccessMode::WriteOnly)?;
//!
//!     let mut session = Session::open(store, SessionConfig::default())?;
//!     let summary = session.merge_all(&mut backing, &mut TracingReporter)?;
//!     println!("merged {} chunks", summary.chunks_written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod device;
pub mod error;
pub mod merge;
pub mod report;
pub mod session;
pub mod walker;

pub use config::{Cli, Command, DEFAULT_MAX_CHUNK_BYTES, SessionConfig};
pub use device::{AccessMode, BlockDevice, FileDevice, MemoryDevice};
pub use error::{ConfigError, Device, MergeError, ScrubError, StoreError, VerifyError};
pub use merge::ChunkStatus;
pub use report::{ConsoleReporter, Event, HexDump, Reporter, TracingReporter};
pub use session::{Session, WalkSummary};
pub use walker::{AreaWalker, Exceptions, WalkState};

pub use cowmerge_format::{
    DiskException, ExceptionRecord, FormatError, StoreBuilder, StoreHeader, StoreLayout,
};

/// Result type for session operations
pub type Result<T> = std::result::Result<T, StoreError>;
