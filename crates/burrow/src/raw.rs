//! Flat-buffer entry points for engines that exchange plain `i64` arrays.
//!
//! These wrap the typed scanners with the calling convention of a columnar
//! query engine: regions arrive as byte or word slices, block capacity as a
//! mask, and sample output as one `i64` array of 4-slot groups. The group
//! after the last one written carries the continuation state:
//!
//! ```text
//! output (4 slots per group)
//! ┌──────────────────────────┬──────────────────────────┬─────────────────────────────┐
//! │ first, last, period, 0   │ ...                      │ index_pos, row_pos, period, 0│
//! │ group 0                  │ group n - 1              │ continuation                │
//! └──────────────────────────┴──────────────────────────┴─────────────────────────────┘
//! ```

use crate::error::{BurrowError, Result};
use crate::index::BitmapIndexView;
use crate::latest::{self, ScanRange};
use crate::sample::{
    FrameCursor, FrameOutcome, KeyIndex, SamplePeriods, SampleWindowResolver, TimestampFrame,
    WindowGroup, GROUP_SLOTS,
};

/// Backward latest-row scan over raw key and value regions.
///
/// # Errors
///
/// Returns an error if `block_capacity_mask + 1` is not a power of two, the
/// regions fail the checks of [`BitmapIndexView::new`], or the scan
/// arguments fail the checks of [`latest::scan_backward`].
#[allow(clippy::too_many_arguments)]
pub fn scan_backward(
    keys: &[u8],
    values: &[u8],
    range: &mut ScanRange<'_>,
    unindexed_null_count: i64,
    max_value: i64,
    min_value: i64,
    partition_index: i64,
    block_capacity_mask: u64,
) -> Result<usize> {
    let capacity = block_capacity_mask
        .checked_add(1)
        .filter(|c| c.is_power_of_two())
        .ok_or(BurrowError::InvalidBlockCapacity(block_capacity_mask.wrapping_add(1)))?;
    let view = BitmapIndexView::new(keys, values, capacity as usize)?;
    latest::scan_backward(
        &view,
        range,
        max_value,
        min_value,
        unindexed_null_count,
        partition_index,
    )
}

/// Filtered sample window resolution into a flat output array.
///
/// `out_capacity` counts groups, including the continuation group, so at
/// most `out_capacity - 1 - out_index` groups are written. Returns the
/// group index one past the last group written, negated when the group at
/// `out_index - 1` was corrected.
///
/// # Errors
///
/// Returns an error if the frame, index position, boundaries or output
/// buffer are malformed.
#[allow(clippy::too_many_arguments)]
pub fn find_first_last_in_frame(
    out_index: usize,
    row_lo: i64,
    row_hi: i64,
    timestamps: &[i64],
    frame_base_offset: i64,
    index: &[i64],
    index_position: i64,
    sample_periods: &[i64],
    sample_index_offset: i64,
    output: &mut [i64],
    out_capacity: usize,
) -> Result<i32> {
    let frame = TimestampFrame::new(timestamps, row_lo, row_hi, frame_base_offset)?;
    let index = KeyIndex::new(index, index_position)?;
    let periods = SamplePeriods::new(sample_periods, sample_index_offset)?;
    let groups = as_groups(output, out_capacity, out_index)?;
    let (out, continuation) = groups.split_at_mut(out_capacity - 1);
    let outcome = SampleWindowResolver::default().find_first_last_in_frame(
        &frame, &index, &periods, out, out_index,
    )?;
    finish(outcome, out, continuation)
}

/// Unfiltered sample window resolution into a flat output array.
///
/// Same conventions as [`find_first_last_in_frame`]; both position fields
/// of the continuation group hold the row the search stopped at.
///
/// # Errors
///
/// Returns an error if the frame, boundaries or output buffer are
/// malformed.
#[allow(clippy::too_many_arguments)]
pub fn find_first_last_in_frame_no_filter(
    out_index: usize,
    row_lo: i64,
    row_hi: i64,
    timestamps: &[i64],
    frame_base_offset: i64,
    sample_periods: &[i64],
    sample_index_offset: i64,
    output: &mut [i64],
    out_capacity: usize,
) -> Result<i32> {
    let frame = TimestampFrame::new(timestamps, row_lo, row_hi, frame_base_offset)?;
    let periods = SamplePeriods::new(sample_periods, sample_index_offset)?;
    let groups = as_groups(output, out_capacity, out_index)?;
    let (out, continuation) = groups.split_at_mut(out_capacity - 1);
    let outcome = SampleWindowResolver::default()
        .find_first_last_in_frame_no_filter(&frame, &periods, out, out_index)?;
    finish(outcome, out, continuation)
}

/// Reads the continuation group following `end` groups of `output`.
///
/// Returns `None` if `output` holds no group at that position.
pub fn read_continuation(output: &[i64], end: usize) -> Option<FrameCursor> {
    let start = end.checked_mul(GROUP_SLOTS)?;
    let slots = output.get(start..start.checked_add(GROUP_SLOTS)?)?;
    Some(FrameCursor {
        index_position: slots[0],
        row_position: slots[1],
        period_index: slots[2],
    })
}

fn as_groups(output: &mut [i64], out_capacity: usize, out_index: usize) -> Result<&mut [WindowGroup]> {
    if out_capacity < 2 || out_index + 1 >= out_capacity {
        return Err(BurrowError::OutputTooSmall {
            capacity: out_capacity,
            position: out_index,
        });
    }
    if i32::try_from(out_capacity).is_err() {
        return Err(BurrowError::OutputTooLarge(out_capacity));
    }
    let slots = out_capacity
        .checked_mul(GROUP_SLOTS)
        .ok_or(BurrowError::OutputTooLarge(out_capacity))?;
    if output.len() < slots {
        return Err(BurrowError::MisalignedBuffer(format!(
            "output holds {} slots, {out_capacity} groups need {slots}",
            output.len()
        )));
    }
    bytemuck::try_cast_slice_mut(&mut output[..slots])
        .map_err(|e| BurrowError::MisalignedBuffer(format!("output: {e}")))
}

/// Writes the continuation after the last group; the continuation group
/// itself is the spare slot when the groups filled `out`.
fn finish(
    outcome: FrameOutcome,
    out: &mut [WindowGroup],
    continuation: &mut [WindowGroup],
) -> Result<i32> {
    let cursor = outcome.cursor;
    let state = WindowGroup {
        first_row_id: cursor.index_position,
        last_row_id: cursor.row_position,
        period_index: cursor.period_index,
        reserved: 0,
    };
    match out.get_mut(outcome.end) {
        Some(slot) => *slot = state,
        None => continuation[0] = state,
    }
    outcome.to_signed()
}
