//! Sequential walk over the metadata areas of an exception store.
//!
//! Areas are visited in order and each is read exactly once. The walk ends
//! normally at the first slot whose `new_chunk` is zero. Running off the end
//! of the device is a failure, not an end-of-data signal.

use std::iter::FusedIterator;

use cowmerge_format::{DiskException, ExceptionRecord, StoreLayout};
use tracing::debug;

use crate::device::BlockDevice;
use crate::error::Device;
use crate::{Result, StoreError};

/// Progress of an [`AreaWalker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// More records may follow.
    Running,
    /// A terminator slot was reached.
    Finished,
    /// An error was returned; no further records follow.
    Failed,
}

/// Cursor over the exception slots of a store.
///
/// The walker owns only its position. The device and the metadata buffer
/// are lent on every step so the caller can use its other resources
/// between records.
#[derive(Debug, Clone)]
pub struct AreaWalker {
    layout: StoreLayout,
    area: u64,
    slot: u64,
    loaded: bool,
    areas_read: u64,
    state: WalkState,
}

impl AreaWalker {
    /// Start a walk at area 0, slot 0.
    pub const fn new(layout: StoreLayout) -> Self {
        Self {
            layout,
            area: 0,
            slot: 0,
            loaded: false,
            areas_read: 0,
            state: WalkState::Running,
        }
    }

    /// Current state.
    pub const fn state(&self) -> WalkState {
        self.state
    }

    /// Number of metadata areas read so far.
    pub const fn areas_read(&self) -> u64 {
        self.areas_read
    }

    /// Produce the next record.
    ///
    /// `meta` must hold at least one chunk; its contents are only valid
    /// between calls of the same walk.
    pub fn next_record<D>(
        &mut self,
        store: &mut D,
        meta: &mut [u8],
    ) -> Option<Result<ExceptionRecord>>
    where
        D: BlockDevice + ?Sized,
    {
        if self.state != WalkState::Running {
            return None;
        }

        if !self.loaded
            && let Err(e) = self.load_area(store, meta)
        {
            self.state = WalkState::Failed;
            return Some(Err(e));
        }

        let Some(slot) = DiskException::decode_slot(meta, self.slot as usize) else {
            self.state = WalkState::Failed;
            return Some(Err(StoreError::BufferTooSmall {
                len: meta.len(),
                needed: self.layout.chunk_bytes(),
            }));
        };

        if slot.is_terminator() {
            debug!(
                "Unused slot at area {} slot {}, end of exceptions",
                self.area, self.slot
            );
            self.state = WalkState::Finished;
            return None;
        }

        let record = slot.at(self.area, self.slot);

        self.slot += 1;
        if self.slot == self.layout.exceptions_per_area() {
            self.area += 1;
            self.slot = 0;
            self.loaded = false;
        }

        Some(Ok(record))
    }

    fn load_area<D>(&mut self, store: &mut D, meta: &mut [u8]) -> Result<()>
    where
        D: BlockDevice + ?Sized,
    {
        let chunk_bytes = self.layout.chunk_bytes();
        let len = meta.len();
        let buf = self
            .layout
            .buffer_len()
            .and_then(|n| meta.get_mut(..n))
            .ok_or(StoreError::BufferTooSmall {
                len,
                needed: chunk_bytes,
            })?;

        let offset = self
            .layout
            .area_offset(self.area)
            .ok_or(StoreError::AreaOutOfRange { area: self.area })?;

        let requested = buf.len();
        store
            .read_exact_at(offset, buf)
            .map_err(|source| StoreError::io(Device::Store, offset, requested, source))?;

        debug!("Read metadata area {} at offset {}", self.area, offset);
        self.loaded = true;
        self.areas_read += 1;
        Ok(())
    }
}

/// Lazy sequence of exception records.
///
/// `None` means the terminator was reached. `Some(Err(_))` means the walk
/// failed; the iterator yields nothing after it. Records already yielded
/// stay valid either way.
#[derive(Debug)]
pub struct Exceptions<'a, D: ?Sized> {
    walker: AreaWalker,
    store: &'a mut D,
    meta: &'a mut [u8],
}

impl<'a, D: BlockDevice + ?Sized> Exceptions<'a, D> {
    /// Walk `store` using `meta` as the metadata buffer.
    pub fn new(layout: StoreLayout, store: &'a mut D, meta: &'a mut [u8]) -> Self {
        Self {
            walker: AreaWalker::new(layout),
            store,
            meta,
        }
    }

    /// Number of metadata areas read so far.
    pub const fn areas_read(&self) -> u64 {
        self.walker.areas_read()
    }

    /// Current state of the walk.
    pub const fn state(&self) -> WalkState {
        self.walker.state()
    }
}

impl<D: BlockDevice + ?Sized> Iterator for Exceptions<'_, D> {
    type Item = Result<ExceptionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walker.next_record(&mut *self.store, &mut *self.meta)
    }
}

impl<D: BlockDevice + ?Sized> FusedIterator for Exceptions<'_, D> {}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;
    use cowmerge_format::{StoreBuilder, StoreHeader};
    use pretty_assertions::assert_eq;
    use std::io;

    /// Memory device that records the offset of every read.
    struct TracingDevice {
        inner: MemoryDevice,
        reads: Vec<u64>,
    }

    impl BlockDevice for TracingDevice {
        fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            self.reads.push(offset);
            self.inner.read_exact_at(offset, buf)
        }

        fn write_exact_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
            self.inner.write_exact_at(offset, buf)
        }
    }

    /// Single-sector chunks: 32 slots per area.
    fn layout() -> StoreLayout {
        StoreLayout::new(1).unwrap()
    }

    /// Image with a raw area 0 and a populated area 1 so any read of
    /// area 1 would produce records.
    fn raw_image(area0: &[(u64, u64)]) -> Vec<u8> {
        let layout = layout();
        let mut image = vec![0u8; 70 * 512];
        image[..16].copy_from_slice(&StoreHeader::new(1).build().unwrap());
        for (slot, &(old, new)) in area0.iter().enumerate() {
            let pos = 512 + slot * 16;
            image[pos..pos + 16].copy_from_slice(&DiskException::new(old, new).to_bytes());
        }
        let area1 = layout.area_offset(1).unwrap() as usize;
        image[area1..area1 + 16].copy_from_slice(&DiskException::new(1, 2).to_bytes());
        image
    }

    fn collect(store: &mut impl BlockDevice) -> (Vec<ExceptionRecord>, Option<StoreError>, u64) {
        let mut meta = vec![0u8; 512];
        let mut walk = Exceptions::new(layout(), store, &mut meta);
        let mut records = Vec::new();
        let mut error = None;
        for item in walk.by_ref() {
            match item {
                Ok(record) => records.push(record),
                Err(e) => error = Some(e),
            }
        }
        (records, error, walk.areas_read())
    }

    #[test]
    fn test_terminator_stops_walk_without_reading_next_area() {
        let mut store = TracingDevice {
            inner: MemoryDevice::new(raw_image(&[(5, 10), (6, 11), (0, 0)])),
            reads: Vec::new(),
        };

        let (records, error, areas) = collect(&mut store);

        assert!(error.is_none());
        assert_eq!(
            records,
            vec![
                DiskException::new(5, 10).at(0, 0),
                DiskException::new(6, 11).at(0, 1),
            ]
        );
        assert_eq!(areas, 1);
        assert_eq!(store.reads, vec![512]);
    }

    #[test]
    fn test_empty_store_yields_nothing() {
        let mut store = MemoryDevice::new(raw_image(&[]));
        let (records, error, areas) = collect(&mut store);
        assert!(records.is_empty());
        assert!(error.is_none());
        assert_eq!(areas, 1);
    }

    #[test]
    fn test_terminator_uses_new_chunk_only() {
        // old_chunk is non-zero but new_chunk is zero: still the end
        let mut store = MemoryDevice::new(raw_image(&[(3, 4), (9, 0), (5, 6)]));
        let (records, error, _) = collect(&mut store);
        assert!(error.is_none());
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_full_area_continues_into_next() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 0..32 {
            builder.add_exception(old, &[]).unwrap();
        }
        let mut store = TracingDevice {
            inner: MemoryDevice::new(builder.build().unwrap()),
            reads: Vec::new(),
        };

        let (records, error, areas) = collect(&mut store);

        assert!(error.is_none());
        assert_eq!(records.len(), 32);
        assert_eq!(records[31], DiskException::new(31, 33).at(0, 31));
        assert_eq!(areas, 2);
        assert_eq!(store.reads, vec![512, 34 * 512]);
    }

    #[test]
    fn test_records_span_areas_in_order() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 100..140 {
            builder.add_exception(old, &[]).unwrap();
        }
        let mut store = MemoryDevice::new(builder.build().unwrap());

        let (records, error, areas) = collect(&mut store);

        assert!(error.is_none());
        assert_eq!(records.len(), 40);
        assert!(records.iter().map(|r| r.old_chunk).eq(100..140));
        assert_eq!(records[32], DiskException::new(132, 35).at(1, 0));
        assert_eq!(areas, 2);
    }

    #[test]
    fn test_truncated_store_fails_after_valid_records() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 0..40 {
            builder.add_exception(old, &[]).unwrap();
        }
        let mut image = builder.build().unwrap();
        image.truncate(34 * 512 + 100);
        let mut store = MemoryDevice::new(image);

        let mut meta = vec![0u8; 512];
        let mut walk = Exceptions::new(layout(), &mut store, &mut meta);

        for expected in 0..32 {
            assert_eq!(walk.next().unwrap().unwrap().old_chunk, expected);
        }
        let err = walk.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            StoreError::Io {
                device: Device::Store,
                offset: 17408,
                requested_len: 512,
                ..
            }
        ));
        assert_eq!(walk.state(), WalkState::Failed);
        assert!(walk.next().is_none());
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_walk_is_fused_after_terminator() {
        let mut store = MemoryDevice::new(raw_image(&[(1, 2)]));
        let mut meta = vec![0u8; 512];
        let mut walk = Exceptions::new(layout(), &mut store, &mut meta);

        assert!(walk.next().is_some());
        assert!(walk.next().is_none());
        assert_eq!(walk.state(), WalkState::Finished);
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_short_metadata_buffer_rejected() {
        let mut store = MemoryDevice::new(raw_image(&[(1, 2)]));
        let mut meta = vec![0u8; 100];
        let mut walk = Exceptions::new(layout(), &mut store, &mut meta);

        assert!(matches!(
            walk.next(),
            Some(Err(StoreError::BufferTooSmall {
                len: 100,
                needed: 512
            }))
        ));
        assert!(walk.next().is_none());
    }

    #[test]
    fn test_early_stop_reads_only_what_was_consumed() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 0..40 {
            builder.add_exception(old, &[]).unwrap();
        }
        let mut store = TracingDevice {
            inner: MemoryDevice::new(builder.build().unwrap()),
            reads: Vec::new(),
        };
        let mut meta = vec![0u8; 512];

        let first: Vec<_> = Exceptions::new(layout(), &mut store, &mut meta)
            .take(3)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(first.len(), 3);
        assert_eq!(store.reads, vec![512]);
    }
}
