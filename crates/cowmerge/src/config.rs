//! Session and command-line configuration.
//!
//! [`SessionConfig`] holds the knobs of a library session. [`Cli`] is the
//! command line of the `cowmerge` binary; every global option can also be
//! set through a `COWMERGE_*` environment variable.
//!
//! # Example
//!
//! ```
//! use cowmerge::{Cli, Command};
//! use clap::Parser;
//!
//! let cli = Cli::try_parse_from(["cowmerge", "merge", "/dev/vg/snap-cow", "/dev/vg/origin"])
//!     .expect("valid arguments");
//! assert!(matches!(cli.command, Command::Merge { .. }));
//! assert!(cli.validate().is_ok());
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::ConfigError;

/// Default upper bound for a chunk buffer (64 MiB).
pub const DEFAULT_MAX_CHUNK_BYTES: u64 = 64 * 1024 * 1024;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Largest chunk size, in bytes, the session will allocate buffers for
    pub max_chunk_bytes: u64,

    /// Flush the written device when a merge or scrub completes
    pub sync_on_finish: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            sync_on_finish: true,
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chunk buffer limit
    #[must_use]
    pub const fn with_max_chunk_bytes(mut self, limit: u64) -> Self {
        self.max_chunk_bytes = limit;
        self
    }

    /// Enable or disable the final device flush
    #[must_use]
    pub const fn with_sync_on_finish(mut self, enable: bool) -> Self {
        self.sync_on_finish = enable;
        self
    }
}

/// Command line of the `cowmerge` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "cowmerge",
    about = "Inspect, verify, merge and scrub snapshot copy-on-write exception stores",
    version
)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "COWMERGE_LOG", default_value = "info")]
    pub log_level: String,

    /// Refuse stores whose chunk size exceeds this many bytes
    #[arg(
        long,
        global = true,
        env = "COWMERGE_MAX_CHUNK_BYTES",
        default_value_t = DEFAULT_MAX_CHUNK_BYTES
    )]
    pub max_chunk_bytes: u64,

    /// Operation to run
    #[command(subcommand)]
    pub command: Command,
}

/// Operations of the `cowmerge` binary.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the header and every exception without reading chunk data
    Inspect {
        /// Exception store (COW) device
        cow: PathBuf,
    },

    /// Print the header, every exception and a hex dump of its shadow chunk
    Dump {
        /// Exception store (COW) device
        cow: PathBuf,

        /// Dump at most this many bytes of each chunk
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Copy every shadow chunk back onto the backing device
    Merge {
        /// Exception store (COW) device
        cow: PathBuf,

        /// Backing (origin) device to write to
        backing: PathBuf,

        /// Skip the final flush of the backing device
        #[arg(long)]
        no_sync: bool,
    },

    /// Report which exceptions are already present on the backing device
    Verify {
        /// Exception store (COW) device
        cow: PathBuf,

        /// Backing (origin) device to compare against
        backing: PathBuf,
    },

    /// Zero-fill every shadow chunk on the exception store
    Scrub {
        /// Exception store (COW) device
        cow: PathBuf,

        /// Confirm that shadow data may be destroyed
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Exception store path of the command.
    pub fn store_path(&self) -> &PathBuf {
        match self {
            Self::Inspect { cow }
            | Self::Dump { cow, .. }
            | Self::Merge { cow, .. }
            | Self::Verify { cow, .. }
            | Self::Scrub { cow, .. } => cow,
        }
    }
}

impl Cli {
    /// Parse configuration from command-line arguments.
    #[must_use]
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_chunk_bytes == 0 {
            return Err(ConfigError::ZeroChunkLimit);
        }

        if let Command::Scrub { force: false, .. } = self.command {
            return Err(ConfigError::ScrubNotConfirmed);
        }

        Ok(())
    }

    /// Session configuration for the selected command.
    pub fn session_config(&self) -> SessionConfig {
        let sync = !matches!(self.command, Command::Merge { no_sync: true, .. });
        SessionConfig::new()
            .with_max_chunk_bytes(self.max_chunk_bytes)
            .with_sync_on_finish(sync)
    }
}
