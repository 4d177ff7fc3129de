//! Exception records stored in metadata area slots
//!
//! Each slot is 16 bytes: the backing-device chunk being shadowed followed by
//! the store chunk holding the shadow data, both little-endian u64. A slot
//! whose `new_chunk` is zero is unused and ends the exception sequence for
//! the whole store.

/// Size of one on-disk exception slot in bytes
pub const EXCEPTION_SIZE: usize = 16;

/// Raw exception slot as stored in a metadata area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiskException {
    /// Chunk index on the backing device
    pub old_chunk: u64,
    /// Chunk index on the exception store device
    pub new_chunk: u64,
}

impl DiskException {
    /// Create a new slot value
    pub const fn new(old_chunk: u64, new_chunk: u64) -> Self {
        Self {
            old_chunk,
            new_chunk,
        }
    }

    /// Decode slot `slot` of a metadata area buffer.
    ///
    /// Returns `None` if the slot lies (even partially) outside `area`.
    pub fn decode_slot(area: &[u8], slot: usize) -> Option<Self> {
        let start = slot.checked_mul(EXCEPTION_SIZE)?;
        let end = start.checked_add(EXCEPTION_SIZE)?;
        let bytes: &[u8; EXCEPTION_SIZE] = area.get(start..end)?.try_into().ok()?;
        Some(Self::from_bytes(bytes))
    }

    /// Decode a slot from its 16 raw bytes
    pub fn from_bytes(bytes: &[u8; EXCEPTION_SIZE]) -> Self {
        let (old, new) = bytes.split_at(8);
        let mut old_chunk = [0u8; 8];
        let mut new_chunk = [0u8; 8];
        old_chunk.copy_from_slice(old);
        new_chunk.copy_from_slice(new);

        Self {
            old_chunk: u64::from_le_bytes(old_chunk),
            new_chunk: u64::from_le_bytes(new_chunk),
        }
    }

    /// Encode the slot to its 16 raw bytes
    pub fn to_bytes(&self) -> [u8; EXCEPTION_SIZE] {
        let mut buf = [0u8; EXCEPTION_SIZE];
        buf[..8].copy_from_slice(&self.old_chunk.to_le_bytes());
        buf[8..].copy_from_slice(&self.new_chunk.to_le_bytes());
        buf
    }

    /// Whether this slot marks the end of the exception sequence
    pub const fn is_terminator(&self) -> bool {
        self.new_chunk == 0
    }

    /// Attach the position the slot was read from
    pub const fn at(self, area: u64, slot: u64) -> ExceptionRecord {
        ExceptionRecord {
            old_chunk: self.old_chunk,
            new_chunk: self.new_chunk,
            area,
            slot,
        }
    }
}

/// An exception read from the store, with its metadata position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExceptionRecord {
    /// Chunk index on the backing device that is shadowed
    pub old_chunk: u64,
    /// Chunk index on the exception store device holding the shadow data
    pub new_chunk: u64,
    /// Metadata area the record was read from
    pub area: u64,
    /// Slot within that area
    pub slot: u64,
}

impl From<ExceptionRecord> for DiskException {
    fn from(record: ExceptionRecord) -> Self {
        Self::new(record.old_chunk, record.new_chunk)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_layout_is_little_endian() {
        let slot = DiskException::new(0x0102_0304_0506_0708, 0x1112_1314_1516_1718);
        assert_eq!(
            slot.to_bytes(),
            [
                0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, //
                0x18, 0x17, 0x16, 0x15, 0x14, 0x13, 0x12, 0x11,
            ]
        );
    }

    #[test]
    fn test_decode_known_slot_bytes() {
        let data = [
            0x05, 0, 0, 0, 0, 0, 0, 0, //
            0x0a, 0, 0, 0, 0, 0, 0, 0,
        ];

        let decoded = DiskException::decode_slot(&data, 0).expect("slot 0");
        assert_eq!(decoded, DiskException::new(5, 10));
        assert_eq!(decoded.to_bytes(), data);
        assert_eq!(DiskException::from_bytes(&data), decoded);
    }

    #[test]
    fn test_decode_slot_by_index() {
        let mut area = vec![0u8; 64];
        area[16..32].copy_from_slice(&DiskException::new(6, 11).to_bytes());

        assert_eq!(
            DiskException::decode_slot(&area, 1),
            Some(DiskException::new(6, 11))
        );
        assert!(DiskException::decode_slot(&area, 2).unwrap().is_terminator());
        assert_eq!(DiskException::decode_slot(&area, 4), None);
    }

    #[test]
    fn test_terminator_ignores_old_chunk() {
        assert!(DiskException::new(99, 0).is_terminator());
        assert!(!DiskException::new(0, 1).is_terminator());
    }

    #[test]
    fn test_record_position() {
        let record = DiskException::new(5, 10).at(3, 7);
        assert_eq!(record.area, 3);
        assert_eq!(record.slot, 7);
        assert_eq!(DiskException::from(record), DiskException::new(5, 10));
    }
}
