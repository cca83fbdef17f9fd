//! Sample window boundaries: first and last row of every time bucket.
//!
//! A sample-by query splits time into buckets at a sequence of ascending
//! boundaries. For each bucket holding at least one row (of one key, when a
//! per-key row-id index filters the timestamp column) the resolver reports
//! the first and last row id; aggregation kernels then run over exactly that
//! row range.
//!
//! # Example
//!
//! ```text
//! rows / timestamps   0         1         2         3    ...   10
//!                     0123456789012345678901234567890123 ... 0123456789
//! boundaries             |14                    |37 ... |62 |87 |108
//! key `a` rows        0, 9, 19, 26, 62, 70, 90, 102
//!
//! groups              (19, 26) period 0
//!                     (62, 70) period 2       bucket 1 holds no `a`
//!                     (90, 102) period 3
//! ```
//!
//! The last boundary only closes the bucket before it. Work is done one
//! frame at a time; every call returns a [`FrameCursor`] to resume from, and
//! a call may correct the last group of the previous call when that bucket
//! continued into the new frame (see [`FrameOutcome::carried_updated`]).

pub mod collector;
pub mod resolver;

pub use collector::SampleByCollector;
pub use resolver::{ResolverConfig, SampleWindowResolver};

use bytemuck::{Pod, Zeroable};

use crate::error::{BurrowError, Result};

/// Number of `i64` slots one [`WindowGroup`] occupies in a flat buffer.
pub const GROUP_SLOTS: usize = 4;

/// First and last row of one sample bucket.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WindowGroup {
    /// First row in the bucket, relative to the frame base offset.
    pub first_row_id: i64,
    /// Last row in the bucket, relative to the frame base offset.
    pub last_row_id: i64,
    /// Absolute index of the bucket in the boundary sequence.
    pub period_index: i64,
    /// Unused; keeps groups 32 bytes wide.
    pub reserved: i64,
}

impl WindowGroup {
    /// Creates a group.
    pub fn new(first_row_id: i64, last_row_id: i64, period_index: i64) -> Self {
        Self {
            first_row_id,
            last_row_id,
            period_index,
            reserved: 0,
        }
    }
}

/// Where the next call over the same key should resume.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCursor {
    /// Next position in the row-id index (filtered search), or the next row
    /// (unfiltered search).
    pub index_position: i64,
    /// Last timestamp row the search stood on.
    pub row_position: i64,
    /// Absolute index of the next boundary to search for.
    pub period_index: i64,
}

/// Result of one resolver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    /// One past the last group written.
    pub end: usize,
    /// True when the group just before the write position, written by an
    /// earlier call, had its last row corrected.
    pub carried_updated: bool,
    /// Resume point for the next call.
    pub cursor: FrameCursor,
}

impl FrameOutcome {
    /// Groups written by this call, given the write position it started at.
    pub fn emitted(&self, out_start: usize) -> usize {
        self.end - out_start
    }

    /// Flat encoding of the outcome: the end position, negated when a
    /// carried group was corrected.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::OutputTooLarge`] if the end position does not
    /// fit an `i32`.
    pub fn to_signed(&self) -> Result<i32> {
        let end = i32::try_from(self.end).map_err(|_| BurrowError::OutputTooLarge(self.end))?;
        Ok(if self.carried_updated { -end } else { end })
    }
}

/// Ascending bucket boundaries and the absolute index of the first one.
#[derive(Debug, Clone, Copy)]
pub struct SamplePeriods<'a> {
    starts: &'a [i64],
    index_offset: i64,
}

impl<'a> SamplePeriods<'a> {
    /// Wraps `starts`, whose first element has absolute index `index_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if `starts` is empty or not strictly ascending.
    pub fn new(starts: &'a [i64], index_offset: i64) -> Result<Self> {
        if starts.is_empty() {
            return Err(BurrowError::EmptySamplePeriods);
        }
        if let Some(position) = starts.windows(2).position(|w| w[0] >= w[1]) {
            return Err(BurrowError::SamplePeriodsNotAscending {
                position: position + 1,
            });
        }
        Ok(Self {
            starts,
            index_offset,
        })
    }

    /// The boundaries of this window.
    pub fn starts(&self) -> &'a [i64] {
        self.starts
    }

    /// Number of boundaries.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Always false; construction rejects empty sequences.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Absolute index of the first boundary.
    pub fn index_offset(&self) -> i64 {
        self.index_offset
    }

    /// The boundaries from absolute index `period_index` on, or `None` when
    /// that index lies outside this window.
    pub fn resume_from(&self, period_index: i64) -> Option<SamplePeriods<'a>> {
        let skip = usize::try_from(period_index - self.index_offset).ok()?;
        if skip >= self.starts.len() {
            return None;
        }
        Some(Self {
            starts: &self.starts[skip..],
            index_offset: period_index,
        })
    }
}

/// Rows `[row_lo, row_hi)` of an ascending timestamp column.
#[derive(Debug, Clone, Copy)]
pub struct TimestampFrame<'a> {
    timestamps: &'a [i64],
    row_lo: usize,
    row_hi: usize,
    frame_base_offset: i64,
}

impl<'a> TimestampFrame<'a> {
    /// Creates a frame. Row ids reported for it are `row - frame_base_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the range is empty or not inside `timestamps`.
    pub fn new(
        timestamps: &'a [i64],
        row_lo: i64,
        row_hi: i64,
        frame_base_offset: i64,
    ) -> Result<Self> {
        if row_lo < 0 || row_hi as u64 > timestamps.len() as u64 {
            return Err(BurrowError::FrameOutOfBounds {
                row_lo,
                row_hi,
                len: timestamps.len(),
            });
        }
        if row_lo >= row_hi {
            return Err(BurrowError::EmptyFrame { row_lo, row_hi });
        }
        Ok(Self {
            timestamps,
            row_lo: row_lo as usize,
            row_hi: row_hi as usize,
            frame_base_offset,
        })
    }

    /// The whole timestamp column the frame indexes into.
    pub fn timestamps(&self) -> &'a [i64] {
        self.timestamps
    }

    /// First row of the frame.
    pub fn row_lo(&self) -> usize {
        self.row_lo
    }

    /// One past the last row of the frame.
    pub fn row_hi(&self) -> usize {
        self.row_hi
    }

    /// Offset subtracted from reported row ids.
    pub fn frame_base_offset(&self) -> i64 {
        self.frame_base_offset
    }

    /// Timestamp of the last row in the frame.
    pub fn max_timestamp(&self) -> i64 {
        self.timestamps[self.row_hi - 1]
    }
}

/// Ascending row ids of one key, and the position to start searching at.
#[derive(Debug, Clone, Copy)]
pub struct KeyIndex<'a> {
    rows: &'a [i64],
    position: usize,
}

impl<'a> KeyIndex<'a> {
    /// Wraps a key's row-id index.
    ///
    /// # Errors
    ///
    /// Returns an error if `position` is outside `[0, rows.len()]` or the
    /// entry at `position` is negative.
    pub fn new(rows: &'a [i64], position: i64) -> Result<Self> {
        let pos = usize::try_from(position)
            .ok()
            .filter(|&p| p <= rows.len())
            .ok_or(BurrowError::IndexPositionOutOfRange {
                position,
                len: rows.len(),
            })?;
        if let Some(&first) = rows.get(pos) {
            if first < 0 {
                return Err(BurrowError::InvalidRowId(first));
            }
        }
        Ok(Self {
            rows,
            position: pos,
        })
    }

    /// All row ids of the key.
    pub fn rows(&self) -> &'a [i64] {
        self.rows
    }

    /// Position the search starts at.
    pub fn position(&self) -> usize {
        self.position
    }
}
