//! Structured events emitted while walking a store, and the reporters that
//! render them.
//!
//! Sessions never print. They hand each [`Event`] to a [`Reporter`], which
//! decides whether it becomes a log line, console text, or nothing at all.

use std::fmt;
use std::io::{self, Write};

use cowmerge_format::{ExceptionRecord, StoreHeader, StoreLayout};
use tracing::{debug, error, info, trace};

use crate::StoreError;
use crate::merge::ChunkStatus;
use crate::session::WalkSummary;

/// Something that happened during a walk.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// Header decoded at the start of an operation
    Header {
        /// Decoded header
        header: &'a StoreHeader,
        /// Derived layout
        layout: &'a StoreLayout,
    },
    /// An exception record was read
    Exception(&'a ExceptionRecord),
    /// Shadow chunk contents of a record
    ChunkContents {
        /// Record whose shadow chunk was read
        record: &'a ExceptionRecord,
        /// The chunk bytes
        bytes: &'a [u8],
    },
    /// A record was merged onto the backing device
    Merged(&'a ExceptionRecord),
    /// A record was compared with the backing device
    Verified {
        /// Record that was checked
        record: &'a ExceptionRecord,
        /// Comparison result
        status: ChunkStatus,
    },
    /// A record's shadow chunk was zero-filled
    Scrubbed(&'a ExceptionRecord),
    /// The operation completed
    Finished(&'a WalkSummary),
    /// The operation stopped on an error
    Failed(&'a StoreError),
}

/// Receiver of walk events.
pub trait Reporter {
    /// Handle one event.
    fn report(&mut self, event: &Event<'_>);
}

/// Discards every event.
impl Reporter for () {
    fn report(&mut self, _event: &Event<'_>) {}
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, event: &Event<'_>) {
        (**self).report(event);
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, event: &Event<'_>) {
        match *event {
            Event::Header { header, layout } => info!(
                magic = %format!("0x{:08x}", header.magic),
                valid = header.valid,
                version = header.version,
                chunk_size = header.chunk_size,
                exceptions_per_area = layout.exceptions_per_area(),
                "Exception store header"
            ),
            Event::Exception(r) => debug!(
                area = r.area,
                slot = r.slot,
                old_chunk = r.old_chunk,
                new_chunk = r.new_chunk,
                "Exception"
            ),
            Event::ChunkContents { record, bytes } => trace!(
                new_chunk = record.new_chunk,
                head = %hex::encode(&bytes[..bytes.len().min(32)]),
                "Shadow chunk"
            ),
            Event::Merged(r) => debug!(old_chunk = r.old_chunk, new_chunk = r.new_chunk, "Merged"),
            Event::Verified { record, status } => match status {
                ChunkStatus::Applied => debug!(old_chunk = record.old_chunk, "Already applied"),
                ChunkStatus::Pending => info!(
                    old_chunk = record.old_chunk,
                    new_chunk = record.new_chunk,
                    "Not yet applied"
                ),
            },
            Event::Scrubbed(r) => debug!(new_chunk = r.new_chunk, "Scrubbed"),
            Event::Finished(s) => info!(
                areas = s.areas_read,
                exceptions = s.exceptions,
                chunks_written = s.chunks_written,
                bytes_written = s.bytes_written,
                pending = s.pending,
                "Walk complete"
            ),
            Event::Failed(e) => error!(error = %e, "Walk failed"),
        }
    }
}

/// Hex dump of a byte slice, 16 bytes per line with an ASCII gutter.
///
/// ```
/// use cowmerge::HexDump;
///
/// let text = HexDump::new(b"SnAp\x01\x00").to_string();
/// assert_eq!(
///     text,
///     "00000000  536e4170 0100                        |SnAp..|\n"
/// );
/// ```
#[derive(Debug, Clone, Copy)]
pub struct HexDump<'a> {
    bytes: &'a [u8],
}

impl<'a> HexDump<'a> {
    /// Bytes per output line.
    pub const WIDTH: usize = 16;

    /// Dump `bytes`, with offsets starting at zero.
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 8 hex digits per 4-byte group plus separators
        const HEX_COLUMN: usize = 35;

        for (line, chunk) in self.bytes.chunks(Self::WIDTH).enumerate() {
            let hex = chunk.chunks(4).map(hex::encode).collect::<Vec<_>>().join(" ");
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            writeln!(
                f,
                "{:08x}  {hex:<HEX_COLUMN$}  |{ascii}|",
                line * Self::WIDTH
            )?;
        }
        Ok(())
    }
}

/// Human-readable reporter writing to any [`Write`].
///
/// Write errors are kept and returned by [`ConsoleReporter::finish`];
/// events after the first failed write are dropped. Failures are left to
/// the caller, which also receives them as the operation's result.
#[derive(Debug)]
pub struct ConsoleReporter<W> {
    out: W,
    dump_limit: Option<usize>,
    write_error: Option<io::Error>,
}

impl<W: Write> ConsoleReporter<W> {
    /// Report to `out`.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            dump_limit: None,
            write_error: None,
        }
    }

    /// Dump at most `limit` bytes of each chunk.
    #[must_use]
    pub const fn with_dump_limit(mut self, limit: Option<usize>) -> Self {
        self.dump_limit = limit;
        self
    }

    /// Flush and hand back the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(e) = self.write_error.take() {
            return Err(e);
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn render(&mut self, event: &Event<'_>) -> io::Result<()> {
        let out = &mut self.out;
        match *event {
            Event::Header { header, layout } => {
                writeln!(out, "magic: 0x{:x}", header.magic)?;
                writeln!(out, "valid: {}", header.valid)?;
                writeln!(out, "version: {}", header.version)?;
                writeln!(out, "chunk_size: {}", header.chunk_size)?;
                writeln!(out, "exceptions_per_area: {}", layout.exceptions_per_area())?;
            }
            Event::Exception(r) => writeln!(
                out,
                "[area {}, exception {}] old: {}, new: {}",
                r.area, r.slot, r.old_chunk, r.new_chunk
            )?,
            Event::ChunkContents { bytes, .. } => {
                let shown = self.dump_limit.map_or(bytes.len(), |n| n.min(bytes.len()));
                write!(out, "{}", HexDump::new(&bytes[..shown]))?;
                if shown < bytes.len() {
                    writeln!(out, "... {} more bytes", bytes.len() - shown)?;
                }
                writeln!(out)?;
            }
            Event::Merged(r) => writeln!(
                out,
                "merged chunk {} -> backing chunk {}",
                r.new_chunk, r.old_chunk
            )?,
            Event::Verified { record, status } => {
                let state = match status {
                    ChunkStatus::Applied => "applied",
                    ChunkStatus::Pending => "pending",
                };
                writeln!(out, "backing chunk {}: {state}", record.old_chunk)?;
            }
            Event::Scrubbed(r) => writeln!(out, "scrubbed chunk {}", r.new_chunk)?,
            Event::Finished(s) => {
                writeln!(
                    out,
                    "No more exceptions: {} exception(s) in {} area(s)",
                    s.exceptions, s.areas_read
                )?;
                if s.chunks_written > 0 {
                    writeln!(
                        out,
                        "{} chunk(s), {} bytes written",
                        s.chunks_written, s.bytes_written
                    )?;
                }
                if s.pending > 0 {
                    writeln!(out, "{} exception(s) not yet merged", s.pending)?;
                }
            }
            Event::Failed(_) => {}
        }
        Ok(())
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn report(&mut self, event: &Event<'_>) {
        if self.write_error.is_some() {
            return;
        }
        if let Err(e) = self.render(event) {
            self.write_error = Some(e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use cowmerge_format::DiskException;
    use pretty_assertions::assert_eq;

    fn render(events: &[Event<'_>], limit: Option<usize>) -> String {
        let mut reporter = ConsoleReporter::new(Vec::new()).with_dump_limit(limit);
        for event in events {
            reporter.report(event);
        }
        String::from_utf8(reporter.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_hexdump_full_lines() {
        let bytes: Vec<u8> = (0u8..20).collect();
        assert_eq!(
            HexDump::new(&bytes).to_string(),
            "00000000  00010203 04050607 08090a0b 0c0d0e0f  |................|\n\
             00000010  10111213                             |....|\n"
        );
    }

    #[test]
    fn test_hexdump_ascii_gutter() {
        assert_eq!(
            HexDump::new(b"ab cd~\x7f").to_string(),
            "00000000  61622063 647e7f                      |ab cd~.|\n"
        );
    }

    #[test]
    fn test_hexdump_empty() {
        assert_eq!(HexDump::new(&[]).to_string(), "");
    }

    #[test]
    fn test_console_header_and_records() {
        let header = StoreHeader::new(8);
        let layout = StoreLayout::from_header(&header).unwrap();
        let record = DiskException::new(5, 10).at(0, 1);
        let summary = WalkSummary {
            areas_read: 1,
            exceptions: 1,
            ..WalkSummary::default()
        };

        let text = render(
            &[
                Event::Header {
                    header: &header,
                    layout: &layout,
                },
                Event::Exception(&record),
                Event::Finished(&summary),
            ],
            None,
        );

        assert_eq!(
            text,
            "magic: 0x70416e53\n\
             valid: 1\n\
             version: 1\n\
             chunk_size: 8\n\
             exceptions_per_area: 256\n\
             [area 0, exception 1] old: 5, new: 10\n\
             No more exceptions: 1 exception(s) in 1 area(s)\n"
        );
    }

    #[test]
    fn test_console_dump_limit() {
        let record = DiskException::new(1, 2).at(0, 0);
        let bytes = [0x41u8; 40];
        let text = render(
            &[Event::ChunkContents {
                record: &record,
                bytes: &bytes,
            }],
            Some(16),
        );

        assert_eq!(
            text,
            "00000000  41414141 41414141 41414141 41414141  |AAAAAAAAAAAAAAAA|\n\
             ... 24 more bytes\n\n"
        );
    }

    #[test]
    fn test_console_keeps_first_write_error() {
        #[derive(Debug)]
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let record = DiskException::new(1, 2).at(0, 0);
        let mut reporter = ConsoleReporter::new(Broken);
        reporter.report(&Event::Exception(&record));
        reporter.report(&Event::Scrubbed(&record));

        let err = reporter.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
