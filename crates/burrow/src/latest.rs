//! Latest row per key, resolved backward through partitioned bitmap indexes.
//!
//! # Protocol
//!
//! The caller owns a [`ScanRange`]: one output slot per key plus the
//! half-open range of keys still unresolved. Each call to
//! [`scan_backward`] examines one partition. Keys whose most recent row in
//! that partition falls within `[min_value, max_value]` are resolved and the
//! range shrinks to the keys that remain. The caller repeats with the next
//! older partition until the range is empty or partitions run out.
//!
//! ```text
//! partitions:   P0 (oldest)   P1            P2 (newest)
//! call order:   3rd           2nd           1st
//! range:        [4, 5)   ←    [1, 5)   ←    [0, 8)
//! ```
//!
//! Resolved slots hold `row_id + 1` so that `0` always means "unresolved".

use tracing::trace;

use crate::error::{BurrowError, Result};
use crate::index::BitmapIndexView;
use crate::rows::{encode, RowId, MAX_LOCAL_ROW_ID, MAX_PARTITION_INDEX};

/// Keys still to resolve, plus the output slot of every key.
#[derive(Debug)]
pub struct ScanRange<'a> {
    key_lo: i64,
    key_hi: i64,
    rows: &'a mut [i64],
    rows_size: usize,
}

impl<'a> ScanRange<'a> {
    /// Creates a range over `[key_lo, key_hi)` writing into `rows`.
    ///
    /// Slots greater than zero are treated as already resolved and are never
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is inverted or negative, or if `rows`
    /// has no slot for `key_hi - 1`.
    pub fn new(rows: &'a mut [i64], key_lo: i64, key_hi: i64) -> Result<Self> {
        if key_lo < 0 || key_lo > key_hi {
            return Err(BurrowError::InvalidKeyRange { lo: key_lo, hi: key_hi });
        }
        if key_hi as u64 > rows.len() as u64 {
            return Err(BurrowError::RowsTooShort {
                required: key_hi as usize,
                actual: rows.len(),
            });
        }
        Ok(Self {
            key_lo,
            key_hi,
            rows,
            rows_size: 0,
        })
    }

    /// First unresolved key.
    pub fn key_lo(&self) -> i64 {
        self.key_lo
    }

    /// One past the last unresolved key.
    pub fn key_hi(&self) -> i64 {
        self.key_hi
    }

    /// True when no key is left to resolve.
    pub fn is_empty(&self) -> bool {
        self.key_lo >= self.key_hi
    }

    /// Keys resolved by the most recent call.
    pub fn rows_size(&self) -> usize {
        self.rows_size
    }

    /// Raw output slots.
    pub fn rows(&self) -> &[i64] {
        self.rows
    }

    /// Resolved row id of `key`, if any.
    pub fn row_id(&self, key: usize) -> Option<RowId> {
        self.rows
            .get(key)
            .filter(|&&slot| slot > 0)
            .map(|&slot| RowId::from_raw(slot - 1))
    }
}

/// Resolves the latest row in `[min_value, max_value]` for every unresolved
/// key of `range`, using one partition's index.
///
/// Keys the index does not know yet are kept in the range. Key `0` also
/// stands for null: the partition's first `unindexed_null_count` rows carry
/// no indexed value, so when the index holds no qualifying row for key `0`
/// the last of those rows (bounded by `max_value`) is used instead.
///
/// Values read from the index that do not fit the 44-bit local row id budget
/// never qualify, whatever `max_value` is.
///
/// Returns the number of keys resolved, also recorded as
/// [`ScanRange::rows_size`].
///
/// # Errors
///
/// Returns an error if `min_value > max_value`, `unindexed_null_count` is
/// negative, or `partition_index` does not fit the row id encoding. The
/// range is left untouched in that case.
pub fn scan_backward(
    view: &BitmapIndexView<'_>,
    range: &mut ScanRange<'_>,
    max_value: i64,
    min_value: i64,
    unindexed_null_count: i64,
    partition_index: i64,
) -> Result<usize> {
    if min_value > max_value {
        return Err(BurrowError::InvalidValueRange {
            min: min_value,
            max: max_value,
        });
    }
    if unindexed_null_count < 0 {
        return Err(BurrowError::NegativeNullCount(unindexed_null_count));
    }
    if !(0..=MAX_PARTITION_INDEX).contains(&partition_index) {
        return Err(BurrowError::PartitionIndexOutOfRange(partition_index));
    }

    let key_count = view.key_count() as i64;
    let max_local = max_value.min(MAX_LOCAL_ROW_ID);
    let mut unresolved_lo = i64::MAX;
    let mut unresolved_hi = i64::MIN;
    let mut resolved = 0usize;

    for k in range.key_lo..range.key_hi {
        let slot = k as usize;
        if range.rows[slot] > 0 {
            continue;
        }

        let mut found = None;
        if k < key_count {
            found = view
                .key(slot)
                .and_then(|entry| view.tail(&entry))
                .and_then(|tail| view.latest_at_or_below(tail, max_local))
                .filter(|&local| local >= min_value && (0..=max_local).contains(&local))
                .and_then(|local| slot_value(partition_index, local));
        }
        if found.is_none() && k == 0 && unindexed_null_count > 0 {
            let last_null = (unindexed_null_count - 1).min(max_local);
            if last_null >= min_value {
                found = slot_value(partition_index, last_null);
            }
        }

        match found {
            Some(row) => {
                range.rows[slot] = row;
                resolved += 1;
            }
            None => {
                unresolved_lo = unresolved_lo.min(k);
                unresolved_hi = unresolved_hi.max(k);
            }
        }
    }

    if unresolved_lo > unresolved_hi {
        range.key_lo = range.key_hi;
    } else {
        range.key_lo = unresolved_lo;
        range.key_hi = unresolved_hi + 1;
    }
    range.rows_size = resolved;

    trace!(
        partition_index,
        key_count,
        resolved,
        key_lo = range.key_lo,
        key_hi = range.key_hi,
        "Backward latest scan"
    );
    Ok(resolved)
}

/// Output slot for a resolved row: the packed row id plus one, so that `0`
/// keeps meaning unresolved. The last row of the last partition has no such
/// slot and is treated as not found.
fn slot_value(partition_index: i64, local: i64) -> Option<i64> {
    encode(partition_index, local).checked_add(1)
}

/// One partition's index plus the parameters it is scanned with.
#[derive(Debug, Clone, Copy)]
pub struct LatestPartition<'a> {
    /// Partition index encoded into resolved row ids.
    pub partition_index: i64,
    /// The partition's bitmap index.
    pub view: BitmapIndexView<'a>,
    /// Rows at the start of the partition that carry no indexed value.
    pub unindexed_null_count: i64,
    /// Smallest acceptable local row id.
    pub min_value: i64,
    /// Largest acceptable local row id.
    pub max_value: i64,
}

impl<'a> LatestPartition<'a> {
    /// Scans every row of the partition.
    pub fn new(partition_index: i64, view: BitmapIndexView<'a>) -> Self {
        Self {
            partition_index,
            view,
            unindexed_null_count: 0,
            min_value: 0,
            max_value: i64::MAX,
        }
    }

    /// Sets the number of leading null rows.
    pub fn with_unindexed_nulls(mut self, count: i64) -> Self {
        self.unindexed_null_count = count;
        self
    }

    /// Restricts the scan to local row ids in `[min_value, max_value]`.
    pub fn with_row_bounds(mut self, min_value: i64, max_value: i64) -> Self {
        self.min_value = min_value;
        self.max_value = max_value;
        self
    }
}

/// Drives [`scan_backward`] over `partitions`, newest (last) first, until
/// every key of `range` is resolved or the partitions run out.
///
/// Returns the total number of keys resolved.
///
/// # Errors
///
/// Returns the first error reported by [`scan_backward`].
pub fn resolve_latest_by_key(
    partitions: &[LatestPartition<'_>],
    range: &mut ScanRange<'_>,
) -> Result<usize> {
    let mut total = 0;
    for partition in partitions.iter().rev() {
        if range.is_empty() {
            break;
        }
        total += scan_backward(
            &partition.view,
            range,
            partition.max_value,
            partition.min_value,
            partition.unindexed_null_count,
            partition.partition_index,
        )?;
    }
    Ok(total)
}
