//! Per-record chunk operations.
//!
//! Each function handles exactly one exception record with whole-chunk I/O
//! at absolute offsets. Re-applying a record rewrites the same bytes at the
//! same place, so a failed run can be resumed by walking again from the
//! start.

use cowmerge_format::{ExceptionRecord, StoreLayout};
use tracing::{debug, warn};

use crate::device::BlockDevice;
use crate::error::{MergeError, ScrubError, VerifyError, offset_overflow};

/// Whether a record's shadow data is already on the backing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// Backing chunk equals the shadow chunk.
    Applied,
    /// Backing chunk differs from the shadow chunk.
    Pending,
}

/// Read the shadow chunk of `record` into `buf`.
///
/// `buf` must be exactly one chunk long.
pub fn read_shadow<S>(
    layout: &StoreLayout,
    record: &ExceptionRecord,
    store: &mut S,
    buf: &mut [u8],
) -> Result<(), MergeError>
where
    S: BlockDevice + ?Sized,
{
    debug_assert_eq!(buf.len() as u64, layout.chunk_bytes());

    let new_chunk = record.new_chunk;
    let offset = layout
        .chunk_offset(new_chunk)
        .ok_or_else(|| offset_overflow(new_chunk))
        .map_err(|source| MergeError::ShadowRead { new_chunk, source })?;

    store
        .read_exact_at(offset, buf)
        .map_err(|source| MergeError::ShadowRead { new_chunk, source })
}

/// Copy the shadow chunk of `record` onto the backing device.
///
/// `buf` is scratch space of exactly one chunk.
pub fn merge_chunk<S, B>(
    layout: &StoreLayout,
    record: &ExceptionRecord,
    store: &mut S,
    backing: &mut B,
    buf: &mut [u8],
) -> Result<(), MergeError>
where
    S: BlockDevice + ?Sized,
    B: BlockDevice + ?Sized,
{
    read_shadow(layout, record, store, buf)?;

    let old_chunk = record.old_chunk;
    let offset = layout
        .chunk_offset(old_chunk)
        .ok_or_else(|| offset_overflow(old_chunk))
        .map_err(|source| MergeError::TargetWrite { old_chunk, source })?;

    backing
        .write_exact_at(offset, buf)
        .map_err(|source| MergeError::TargetWrite { old_chunk, source })?;

    debug!(
        "Merged store chunk {} onto backing chunk {}",
        record.new_chunk, old_chunk
    );
    Ok(())
}

/// Compare the shadow chunk of `record` with the backing chunk it targets.
///
/// `shadow` and `target` are scratch buffers of exactly one chunk each.
/// Nothing is written.
pub fn verify_chunk<S, B>(
    layout: &StoreLayout,
    record: &ExceptionRecord,
    store: &mut S,
    backing: &mut B,
    shadow: &mut [u8],
    target: &mut [u8],
) -> crate::Result<ChunkStatus>
where
    S: BlockDevice + ?Sized,
    B: BlockDevice + ?Sized,
{
    read_shadow(layout, record, store, shadow)?;

    let old_chunk = record.old_chunk;
    let offset = layout
        .chunk_offset(old_chunk)
        .ok_or_else(|| offset_overflow(old_chunk))
        .map_err(|source| VerifyError::TargetRead { old_chunk, source })?;

    backing
        .read_exact_at(offset, target)
        .map_err(|source| VerifyError::TargetRead { old_chunk, source })?;

    Ok(if shadow == target {
        ChunkStatus::Applied
    } else {
        ChunkStatus::Pending
    })
}

/// Zero-fill the shadow chunk of `record` on the store device.
///
/// Records pointing at the header chunk or a metadata area are refused
/// before anything is written. `zeros` must be one chunk of zero bytes.
pub fn scrub_chunk<S>(
    layout: &StoreLayout,
    record: &ExceptionRecord,
    store: &mut S,
    zeros: &[u8],
) -> Result<(), ScrubError>
where
    S: BlockDevice + ?Sized,
{
    debug_assert!(zeros.iter().all(|&b| b == 0));

    let new_chunk = record.new_chunk;
    if layout.is_metadata_chunk(new_chunk) {
        warn!(
            "Exception at area {} slot {} points at metadata chunk {}",
            record.area, record.slot, new_chunk
        );
        return Err(ScrubError::MetadataChunk { new_chunk });
    }

    let offset = layout
        .chunk_offset(new_chunk)
        .ok_or_else(|| offset_overflow(new_chunk))
        .map_err(|source| ScrubError::Write { new_chunk, source })?;

    store
        .write_exact_at(offset, zeros)
        .map_err(|source| ScrubError::Write { new_chunk, source })?;

    debug!("Scrubbed store chunk {}", new_chunk);
    Ok(())
}
