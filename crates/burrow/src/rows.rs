//! Row id codec.
//!
//! A row id packs a partition index and a row offset local to that partition
//! into one `i64`:
//!
//! ```text
//!  63 62             44 43                                    0
//! ┌──┬────────────────┬────────────────────────────────────────┐
//! │0 │ partition (19) │ local row id (44)                      │
//! └──┴────────────────┴────────────────────────────────────────┘
//! ```
//!
//! Row ids order first by partition, then by local offset. Downstream
//! consumers decode with the same shifts, so the layout is fixed.

use std::fmt;

use crate::error::{BurrowError, Result};

/// Number of bits reserved for the local row id.
pub const LOCAL_ROW_BITS: u32 = 44;

/// Mask selecting the local row id bits.
pub const LOCAL_ROW_MASK: i64 = (1 << LOCAL_ROW_BITS) - 1;

/// Largest encodable partition index.
pub const MAX_PARTITION_INDEX: i64 = (1 << (63 - LOCAL_ROW_BITS)) - 1;

/// Largest encodable local row id.
pub const MAX_LOCAL_ROW_ID: i64 = LOCAL_ROW_MASK;

/// Packed (partition index, local row id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(i64);

impl RowId {
    /// Packs a partition index and local row id.
    ///
    /// # Errors
    ///
    /// Returns an error if either component falls outside its bit budget.
    pub fn new(partition_index: i64, local_row_id: i64) -> Result<Self> {
        if !(0..=MAX_PARTITION_INDEX).contains(&partition_index) {
            return Err(BurrowError::PartitionIndexOutOfRange(partition_index));
        }
        if !(0..=MAX_LOCAL_ROW_ID).contains(&local_row_id) {
            return Err(BurrowError::LocalRowIdOutOfRange(local_row_id));
        }
        Ok(Self(encode(partition_index, local_row_id)))
    }

    /// Wraps an already packed value.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the packed value.
    pub fn to_raw(self) -> i64 {
        self.0
    }

    /// Returns the partition index.
    pub fn partition_index(self) -> i64 {
        partition_index(self.0)
    }

    /// Returns the row offset within the partition.
    pub fn local_row_id(self) -> i64 {
        local_row_id(self.0)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.partition_index(), self.local_row_id())
    }
}

/// Packs without range checks. Callers validate `partition_index` once per
/// call; local ids come from index data that already fits 44 bits.
#[inline]
pub(crate) fn encode(partition_index: i64, local_row_id: i64) -> i64 {
    (partition_index << LOCAL_ROW_BITS) + local_row_id
}

/// Extracts the partition index from a packed row id.
#[inline]
pub fn partition_index(row_id: i64) -> i64 {
    ((row_id as u64) >> LOCAL_ROW_BITS) as i64
}

/// Extracts the local row id from a packed row id.
#[inline]
pub fn local_row_id(row_id: i64) -> i64 {
    row_id & LOCAL_ROW_MASK
}
