//! In-memory exception store builder
//!
//! Produces well-formed store images: a header chunk, then metadata areas
//! each followed by the data chunks of their slots, with a terminator slot
//! after the last exception. When the last exception fills its area
//! exactly, an all-zero area is appended so the image still ends with a
//! terminator.
//!
//! # Example
//!
//! ```rust
//! use cowmerge_format::{StoreBuilder, StoreHeader};
//!
//! let mut builder = StoreBuilder::new(1)?;
//! builder.add_exception(5, &[0xAA; 512])?;
//! builder.add_exception(6, b"partial chunk, zero padded")?;
//! let image = builder.build()?;
//!
//! assert_eq!(StoreHeader::parse(&image)?.chunk_size, 1);
//! # Ok::<(), cowmerge_format::FormatError>(())
//! ```

use std::io::Cursor;

use binrw::BinWrite;

use crate::error::{FormatError, FormatResult};
use crate::exception::{DiskException, EXCEPTION_SIZE};
use crate::header::StoreHeader;
use crate::layout::StoreLayout;

/// Builder for exception store images
#[derive(Debug, Clone)]
pub struct StoreBuilder {
    header: StoreHeader,
    layout: StoreLayout,
    exceptions: Vec<(u64, Vec<u8>)>,
}

impl StoreBuilder {
    /// Create a builder for stores with `chunk_size` sectors per chunk
    pub fn new(chunk_size: u32) -> FormatResult<Self> {
        let header = StoreHeader::new(chunk_size);
        let layout = StoreLayout::from_header(&header)?;
        Ok(Self {
            header,
            layout,
            exceptions: Vec::new(),
        })
    }

    /// Layout of the store being built
    pub const fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Number of exceptions added so far
    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    /// Whether no exceptions have been added
    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    /// Add an exception shadowing backing chunk `old_chunk`.
    ///
    /// `data` is zero-padded to a full chunk. Returns the store chunk index
    /// the shadow data will occupy.
    pub fn add_exception(&mut self, old_chunk: u64, data: &[u8]) -> FormatResult<u64> {
        if data.len() as u64 > self.layout.chunk_bytes() {
            return Err(FormatError::ChunkDataTooLarge {
                len: data.len(),
                chunk_bytes: self.layout.chunk_bytes(),
            });
        }

        let (area, slot) = self.position(self.exceptions.len() as u64);
        let new_chunk = self
            .layout
            .data_chunk(area, slot)
            .ok_or(FormatError::ImageTooLarge)?;

        self.exceptions.push((old_chunk, data.to_vec()));
        Ok(new_chunk)
    }

    /// Build the complete store image
    pub fn build(&self) -> FormatResult<Vec<u8>> {
        let epa = self.layout.exceptions_per_area();
        let count = self.exceptions.len() as u64;
        let (last_area, used) = self.position(count);

        // The last area is followed by one data chunk per used slot
        let total_chunks = self
            .layout
            .area_chunk(last_area)
            .and_then(|chunk| chunk.checked_add(1 + used))
            .ok_or(FormatError::ImageTooLarge)?;
        let total_bytes = self
            .layout
            .chunk_offset(total_chunks)
            .and_then(|len| usize::try_from(len).ok())
            .ok_or(FormatError::ImageTooLarge)?;

        let mut image = vec![0u8; total_bytes];
        self.header.write_le(&mut Cursor::new(&mut image[..]))?;

        for (index, (old_chunk, data)) in self.exceptions.iter().enumerate() {
            let (area, slot) = (index as u64 / epa, index as u64 % epa);
            let new_chunk = self
                .layout
                .data_chunk(area, slot)
                .ok_or(FormatError::ImageTooLarge)?;

            let slot_pos =
                self.offset(self.layout.area_offset(area))? + slot as usize * EXCEPTION_SIZE;
            image[slot_pos..slot_pos + EXCEPTION_SIZE]
                .copy_from_slice(&DiskException::new(*old_chunk, new_chunk).to_bytes());

            let data_pos = self.offset(self.layout.chunk_offset(new_chunk))?;
            image[data_pos..data_pos + data.len()].copy_from_slice(data);
        }

        Ok(image)
    }

    fn position(&self, index: u64) -> (u64, u64) {
        let epa = self.layout.exceptions_per_area();
        (index / epa, index % epa)
    }

    fn offset(&self, offset: Option<u64>) -> FormatResult<usize> {
        offset
            .and_then(|o| usize::try_from(o).ok())
            .ok_or(FormatError::ImageTooLarge)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slot(image: &[u8], layout: &StoreLayout, area: u64, slot: usize) -> DiskException {
        let start = layout.area_offset(area).unwrap() as usize;
        DiskException::decode_slot(&image[start..start + 512], slot).unwrap()
    }

    #[test]
    fn test_empty_store_is_header_and_terminator_area() {
        let image = StoreBuilder::new(1).unwrap().build().unwrap();
        assert_eq!(image.len(), 2 * 512);
        assert_eq!(StoreHeader::parse(&image).unwrap(), StoreHeader::new(1));
        assert!(image[512..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_exceptions_laid_out_in_slot_order() {
        let mut builder = StoreBuilder::new(1).unwrap();
        assert_eq!(builder.add_exception(5, &[0x11; 512]).unwrap(), 2);
        assert_eq!(builder.add_exception(6, &[0x22; 16]).unwrap(), 3);
        let image = builder.build().unwrap();
        let layout = *builder.layout();

        assert_eq!(image.len(), 4 * 512);
        assert_eq!(slot(&image, &layout, 0, 0), DiskException::new(5, 2));
        assert_eq!(slot(&image, &layout, 0, 1), DiskException::new(6, 3));
        assert!(slot(&image, &layout, 0, 2).is_terminator());
        assert!(image[1024..1536].iter().all(|&b| b == 0x11));
        assert!(image[1536..1552].iter().all(|&b| b == 0x22));
        assert!(image[1552..2048].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_full_area_gets_terminator_area() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 0..32 {
            builder.add_exception(old, &[old as u8]).unwrap();
        }
        let image = builder.build().unwrap();
        let layout = *builder.layout();

        // header + area 0 + 32 data chunks + empty area 1
        assert_eq!(image.len(), 35 * 512);
        assert_eq!(slot(&image, &layout, 0, 31), DiskException::new(31, 33));
        assert!(slot(&image, &layout, 1, 0).is_terminator());
    }

    #[test]
    fn test_second_area_data_chunks() {
        let mut builder = StoreBuilder::new(1).unwrap();
        for old in 0..33 {
            builder.add_exception(old, &[]).unwrap();
        }
        let layout = *builder.layout();
        let image = builder.build().unwrap();

        assert_eq!(slot(&image, &layout, 1, 0), DiskException::new(32, 35));
        assert_eq!(image.len(), 36 * 512);
    }

    #[test]
    fn test_oversized_data_rejected() {
        let mut builder = StoreBuilder::new(1).unwrap();
        let err = builder.add_exception(0, &[0u8; 513]).unwrap_err();
        assert!(matches!(
            err,
            FormatError::ChunkDataTooLarge {
                len: 513,
                chunk_bytes: 512
            }
        ));
        assert!(builder.is_empty());
    }
}
