//! Row id packing: a frame-local row is addressed to the outside world as a
//! single bijective `u64` combining its partition index and its row offset
//! within that partition, so a `RecordCursor` can reseek to any row it
//! handed out earlier without carrying the pair around.
//!
//! The split is `ROW_ID_PARTITION_BITS` (24) for the partition index and
//! the remaining 40 bits for the local row id — 16M partitions, 1T rows per
//! partition, comfortably beyond any single scan this pipeline runs. See
//! `DESIGN.md` for why this split rather than a 32/32 or configurable one.

use crate::constants::ROW_ID_PARTITION_BITS;

const LOCAL_ROW_ID_BITS: u32 = 64 - ROW_ID_PARTITION_BITS;
const LOCAL_ROW_ID_MASK: u64 = (1u64 << LOCAL_ROW_ID_BITS) - 1;
const MAX_PARTITION_INDEX: u32 = (1u32 << ROW_ID_PARTITION_BITS) - 1;

/// Pack a partition index and local row id into one row id.
///
/// # Panics
/// Panics if `partition_index` doesn't fit in `ROW_ID_PARTITION_BITS` or
/// `local_row_id` doesn't fit in the remaining bits — both indicate a bug
/// in the caller rather than a recoverable condition.
pub fn pack(partition_index: u32, local_row_id: u64) -> u64 {
    assert!(
        partition_index <= MAX_PARTITION_INDEX,
        "partition index {partition_index} exceeds {ROW_ID_PARTITION_BITS}-bit range"
    );
    assert!(
        local_row_id <= LOCAL_ROW_ID_MASK,
        "local row id {local_row_id} exceeds {LOCAL_ROW_ID_BITS}-bit range"
    );
    ((partition_index as u64) << LOCAL_ROW_ID_BITS) | local_row_id
}

pub fn to_partition_index(row_id: u64) -> u32 {
    (row_id >> LOCAL_ROW_ID_BITS) as u32
}

pub fn to_local_row_id(row_id: u64) -> u64 {
    row_id & LOCAL_ROW_ID_MASK
}
