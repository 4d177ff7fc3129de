//! Exception store sessions.
//!
//! A [`Session`] owns the store device, its decoded header and two
//! chunk-sized scratch buffers. Every operation walks the store from the
//! first area and stops at the terminator or at the first error.

use cowmerge_format::{ExceptionRecord, SECTOR_SIZE, StoreHeader, StoreLayout};
use tracing::info;

use crate::config::SessionConfig;
use crate::device::BlockDevice;
use crate::error::Device;
use crate::merge::{self, ChunkStatus};
use crate::report::{Event, Reporter};
use crate::walker::{AreaWalker, Exceptions};
use crate::{Result, StoreError};

/// Counters collected by a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Metadata areas read
    pub areas_read: u64,
    /// Exception records seen
    pub exceptions: u64,
    /// Chunks written (merge and scrub)
    pub chunks_written: u64,
    /// Bytes written (merge and scrub)
    pub bytes_written: u64,
    /// Records whose backing chunk differs from the shadow chunk (verify)
    pub pending: u64,
}

/// An open exception store.
///
/// # Example
///
/// ```
/// use cowmerge::{MemoryDevice, Session, SessionConfig, StoreBuilder};
///
/// let mut builder = StoreBuilder::new(1)?;
/// builder.add_exception(3, &[0xAB; 512])?;
/// let store = MemoryDevice::new(builder.build()?);
///
/// let mut session = Session::open(store, SessionConfig::default())?;
/// let mut backing = MemoryDevice::zeroed(8 * 512);
/// let summary = session.merge_all(&mut backing, &mut ())?;
///
/// assert_eq!(summary.chunks_written, 1);
/// assert!(backing.as_bytes()[3 * 512..4 * 512].iter().all(|&b| b == 0xAB));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct Session<S> {
    store: S,
    header: StoreHeader,
    layout: StoreLayout,
    config: SessionConfig,
    meta: Vec<u8>,
    data: Vec<u8>,
}

impl<S: BlockDevice> Session<S> {
    /// Read and validate the header of `store`.
    ///
    /// The first sector of the device is read and its first 16 bytes are
    /// decoded. Chunk buffers are allocated only after the chunk size has
    /// been checked against [`SessionConfig::max_chunk_bytes`].
    pub fn open(mut store: S, config: SessionConfig) -> Result<Self> {
        let mut sector = [0u8; SECTOR_SIZE as usize];
        store
            .read_exact_at(0, &mut sector)
            .map_err(|source| StoreError::io(Device::Store, 0, sector.len(), source))?;

        let header = StoreHeader::parse(&sector)?;
        let layout = StoreLayout::from_header(&header)?;

        let chunk_bytes = layout.chunk_bytes();
        let too_large = StoreError::ChunkTooLarge {
            chunk_bytes,
            limit: config.max_chunk_bytes,
        };
        if chunk_bytes > config.max_chunk_bytes {
            return Err(too_large);
        }
        let len = layout.buffer_len().ok_or(too_large)?;

        info!(
            "Opened exception store: chunk size {} sectors ({} bytes), {} exceptions per area",
            header.chunk_size,
            chunk_bytes,
            layout.exceptions_per_area()
        );

        Ok(Self {
            store,
            header,
            layout,
            config,
            meta: vec![0u8; len],
            data: vec![0u8; len],
        })
    }

    /// Decoded header.
    pub const fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Store geometry.
    pub const fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Session configuration.
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The store device.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Close the session and give back the store device.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Lazy walk over the exception records, starting at area 0.
    pub fn exceptions(&mut self) -> Exceptions<'_, S> {
        Exceptions::new(self.layout, &mut self.store, &mut self.meta)
    }

    /// Apply one record: copy its shadow chunk onto `backing`.
    pub fn merge<B>(&mut self, record: &ExceptionRecord, backing: &mut B) -> Result<()>
    where
        B: BlockDevice + ?Sized,
    {
        merge::merge_chunk(
            &self.layout,
            record,
            &mut self.store,
            backing,
            &mut self.data,
        )?;
        Ok(())
    }

    /// Report the header and every record without reading chunk data.
    pub fn inspect<R>(&mut self, reporter: &mut R) -> Result<WalkSummary>
    where
        R: Reporter + ?Sized,
    {
        let outcome = self.drive(reporter, |_, _, _, _, _, _| Ok(()));
        conclude(reporter, outcome)
    }

    /// Report every record together with the bytes of its shadow chunk.
    pub fn dump<R>(&mut self, reporter: &mut R) -> Result<WalkSummary>
    where
        R: Reporter + ?Sized,
    {
        let outcome = self.drive(reporter, |layout, store, data, record, _, reporter| {
            merge::read_shadow(layout, record, store, data)?;
            reporter.report(&Event::ChunkContents {
                record,
                bytes: &*data,
            });
            Ok(())
        });
        conclude(reporter, outcome)
    }

    /// Merge every record onto `backing`, in walk order.
    ///
    /// Stops at the first failure. Records merged before it stay merged,
    /// and running the merge again from the start completes the job.
    pub fn merge_all<B, R>(&mut self, backing: &mut B, reporter: &mut R) -> Result<WalkSummary>
    where
        B: BlockDevice + ?Sized,
        R: Reporter + ?Sized,
    {
        let mut outcome = self.drive(reporter, |layout, store, data, record, summary, reporter| {
            merge::merge_chunk(layout, record, store, backing, data)?;
            summary.chunks_written += 1;
            summary.bytes_written += layout.chunk_bytes();
            reporter.report(&Event::Merged(record));
            Ok(())
        });

        if outcome.is_ok() && self.config.sync_on_finish {
            outcome = backing
                .sync()
                .map_err(|source| StoreError::Sync {
                    device: Device::Backing,
                    source,
                })
                .and(outcome);
        }
        conclude(reporter, outcome)
    }

    /// Compare every record's shadow chunk with its backing chunk.
    ///
    /// Neither device is written.
    pub fn verify_all<B, R>(&mut self, backing: &mut B, reporter: &mut R) -> Result<WalkSummary>
    where
        B: BlockDevice + ?Sized,
        R: Reporter + ?Sized,
    {
        let mut target = vec![0u8; self.data.len()];
        let outcome = self.drive(reporter, |layout, store, data, record, summary, reporter| {
            let status = merge::verify_chunk(layout, record, store, backing, data, &mut target)?;
            if status == ChunkStatus::Pending {
                summary.pending += 1;
            }
            reporter.report(&Event::Verified { record, status });
            Ok(())
        });
        conclude(reporter, outcome)
    }

    /// Zero-fill every record's shadow chunk on the store.
    ///
    /// Metadata areas are left intact, so the store can still be walked
    /// afterwards and scrubbing twice is harmless.
    pub fn scrub_all<R>(&mut self, reporter: &mut R) -> Result<WalkSummary>
    where
        R: Reporter + ?Sized,
    {
        self.data.fill(0);
        let mut outcome = self.drive(reporter, |layout, store, zeros, record, summary, reporter| {
            merge::scrub_chunk(layout, record, store, zeros)?;
            summary.chunks_written += 1;
            summary.bytes_written += layout.chunk_bytes();
            reporter.report(&Event::Scrubbed(record));
            Ok(())
        });

        if outcome.is_ok() && self.config.sync_on_finish {
            outcome = self
                .store
                .sync()
                .map_err(|source| StoreError::Sync {
                    device: Device::Store,
                    source,
                })
                .and(outcome);
        }
        conclude(reporter, outcome)
    }

    /// Walk the store, calling `step` for every record.
    ///
    /// `step` receives the layout, the store, the data buffer, the record,
    /// the running summary and the reporter.
    fn drive<R, F>(&mut self, reporter: &mut R, mut step: F) -> Result<WalkSummary>
    where
        R: Reporter + ?Sized,
        F: FnMut(
            &StoreLayout,
            &mut S,
            &mut [u8],
            &ExceptionRecord,
            &mut WalkSummary,
            &mut R,
        ) -> Result<()>,
    {
        reporter.report(&Event::Header {
            header: &self.header,
            layout: &self.layout,
        });

        let mut walker = AreaWalker::new(self.layout);
        let mut summary = WalkSummary::default();

        let outcome = loop {
            let record = match walker.next_record(&mut self.store, &mut self.meta) {
                None => break Ok(()),
                Some(Err(e)) => break Err(e),
                Some(Ok(record)) => record,
            };

            summary.exceptions += 1;
            reporter.report(&Event::Exception(&record));

            if let Err(e) = step(
                &self.layout,
                &mut self.store,
                &mut self.data,
                &record,
                &mut summary,
                reporter,
            ) {
                break Err(e);
            }
        };

        summary.areas_read = walker.areas_read();
        outcome.map(|()| summary)
    }
}

fn conclude<R>(reporter: &mut R, outcome: Result<WalkSummary>) -> Result<WalkSummary>
where
    R: Reporter + ?Sized,
{
    match &outcome {
        Ok(summary) => {
            info!(
                "Processed {} exception(s) in {} area(s)",
                summary.exceptions, summary.areas_read
            );
            reporter.report(&Event::Finished(summary));
        }
        Err(e) => reporter.report(&Event::Failed(e)),
    }
    outcome
}
