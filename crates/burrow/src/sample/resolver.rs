//! First/last row resolution inside one frame.

use tracing::trace;

use crate::error::{BurrowError, Result};
use crate::sample::{
    FrameCursor, FrameOutcome, KeyIndex, SamplePeriods, TimestampFrame, WindowGroup,
};
use crate::search::{branch_free_search_lower, linked_search_lower, DEFAULT_MIN_LINKED_STEP};

/// Resolver configuration.
///
/// # Examples
///
/// ```
/// use alopex_burrow::sample::ResolverConfig;
///
/// let config = ResolverConfig::default().with_min_linked_step(64);
/// assert_eq!(config.min_linked_step, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Smallest stride of the galloping search through a row-id index.
    pub min_linked_step: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_linked_step: DEFAULT_MIN_LINKED_STEP,
        }
    }
}

impl ResolverConfig {
    /// Sets the minimum galloping stride. Zero is treated as one.
    pub fn with_min_linked_step(mut self, step: usize) -> Self {
        self.min_linked_step = step;
        self
    }
}

/// Finds the first and last row of every non-empty sample bucket.
///
/// Both searches advance a single cursor through the frame: for each bucket
/// they find the first row at or after its start, which is both the first
/// row of that bucket and one past the last row of the bucket before it.
/// A group is therefore written with `last_row_id == first_row_id` and
/// corrected when the search for the next boundary lands. When the next
/// boundary lies in a later frame, the correction happens in the next call,
/// against the group left at `out[out_start - 1]`.
///
/// Output stops when `out` is full; the returned cursor then points at the
/// next bucket to search for.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleWindowResolver {
    config: ResolverConfig,
}

impl SampleWindowResolver {
    /// Creates a resolver.
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// The resolver configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves bucket groups for the rows of one key.
    ///
    /// `index` lists the rows holding the key; only entries from
    /// `index.position()` on that fall inside the frame are considered.
    /// Entries below the frame are passed over and the returned cursor moves
    /// past them.
    /// Groups are written to `out` from `out_start`; if `out_start > 0` the
    /// group at `out_start - 1` is the last group of the previous call and
    /// may have its last row corrected.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::OutputTooSmall`] if `out_start` is not below
    /// `out.len()`.
    pub fn find_first_last_in_frame(
        &self,
        frame: &TimestampFrame<'_>,
        index: &KeyIndex<'_>,
        periods: &SamplePeriods<'_>,
        out: &mut [WindowGroup],
        out_start: usize,
    ) -> Result<FrameOutcome> {
        check_output(out, out_start)?;

        let ts = frame.timestamps();
        let row_hi = frame.row_hi();
        let base = frame.frame_base_offset();
        let rows = index.rows();
        let starts = periods.starts();
        let count = starts.len();
        let period_offset = periods.index_offset();

        // entries below row_lo belong to earlier frames, entries at or past
        // row_hi to later ones
        let position = index.position();
        let idx_first =
            position + rows[position..].partition_point(|&r| r < frame.row_lo() as i64);
        let mut idx_lo = idx_first;
        let idx_hi = idx_lo + rows[idx_lo..].partition_point(|&r| r < row_hi as i64);

        let mut ts_lo = match rows.get(idx_lo) {
            Some(&r) if idx_lo < idx_hi => frame.row_lo().max(r as usize),
            _ => frame.row_lo(),
        };
        let max_ts = frame.max_timestamp();
        let mut period = 0usize;
        let mut pos = out_start;
        let mut carried_updated = false;

        while idx_lo < idx_hi && period < count && ts_lo < row_hi && pos < out.len() {
            let sample_start = starts[period];
            idx_lo += linked_search_lower(
                &rows[idx_lo..idx_hi],
                ts,
                count - period,
                sample_start.min(max_ts.saturating_add(1)),
                self.config.min_linked_step,
            );

            let previous = period_offset + period as i64 - 1;
            if pos > 0 && idx_lo > idx_first && out[pos - 1].period_index == previous {
                out[pos - 1].last_row_id = rows[idx_lo - 1] - base;
                carried_updated |= pos == out_start;
            }

            if idx_lo == idx_hi || sample_start > max_ts || period + 2 > count {
                break;
            }

            let row = rows[idx_lo];
            let row_ts = ts[row as usize];
            if row_ts >= starts[period + 1] {
                // skip buckets holding no row of the key
                period += branch_free_search_lower(&starts[period..], row_ts.saturating_add(1)) - 1;
                continue;
            }

            ts_lo = row as usize;
            if ts_lo >= row_hi || row_ts < sample_start {
                break;
            }
            out[pos] = WindowGroup::new(row - base, row - base, period_offset + period as i64);
            pos += 1;
            period += 1;
        }

        let cursor = FrameCursor {
            index_position: idx_lo as i64,
            row_position: ts_lo as i64,
            period_index: period_offset + period.min(count - 1) as i64,
        };
        trace!(
            emitted = pos - out_start,
            carried_updated,
            index_position = cursor.index_position,
            period_index = cursor.period_index,
            "Resolved filtered frame"
        );
        Ok(FrameOutcome {
            end: pos,
            carried_updated,
            cursor,
        })
    }

    /// Resolves bucket groups over every row of the frame.
    ///
    /// The cursor's `index_position` and `row_position` both hold the row the
    /// search stopped at; a continuation call starts its frame there.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::OutputTooSmall`] if `out_start` is not below
    /// `out.len()`.
    pub fn find_first_last_in_frame_no_filter(
        &self,
        frame: &TimestampFrame<'_>,
        periods: &SamplePeriods<'_>,
        out: &mut [WindowGroup],
        out_start: usize,
    ) -> Result<FrameOutcome> {
        check_output(out, out_start)?;

        let ts = frame.timestamps();
        let row_lo = frame.row_lo();
        let row_hi = frame.row_hi();
        let base = frame.frame_base_offset();
        let starts = periods.starts();
        let count = starts.len();
        let period_offset = periods.index_offset();

        let max_ts = frame.max_timestamp();
        let mut ts_lo = row_lo;
        let mut period = 0usize;
        let mut pos = out_start;
        let mut carried_updated = false;

        while period < count && ts_lo < row_hi && pos < out.len() {
            let sample_start = starts[period];
            ts_lo += branch_free_search_lower(
                &ts[ts_lo..row_hi],
                sample_start.min(max_ts.saturating_add(1)),
            );

            let previous = period_offset + period as i64 - 1;
            if pos > 0 && ts_lo > row_lo && out[pos - 1].period_index == previous {
                out[pos - 1].last_row_id = (ts_lo - 1) as i64 - base;
                carried_updated |= pos == out_start;
            }

            if ts_lo >= row_hi || sample_start > max_ts || period + 2 > count {
                break;
            }

            let row_ts = ts[ts_lo];
            if row_ts >= starts[period + 1] {
                period += branch_free_search_lower(&starts[period..], row_ts.saturating_add(1)) - 1;
                continue;
            }
            if row_ts < sample_start {
                break;
            }
            let row = ts_lo as i64 - base;
            out[pos] = WindowGroup::new(row, row, period_offset + period as i64);
            pos += 1;
            period += 1;
        }

        let cursor = FrameCursor {
            index_position: ts_lo as i64,
            row_position: ts_lo as i64,
            period_index: period_offset + period.min(count - 1) as i64,
        };
        trace!(
            emitted = pos - out_start,
            carried_updated,
            row_position = cursor.row_position,
            period_index = cursor.period_index,
            "Resolved unfiltered frame"
        );
        Ok(FrameOutcome {
            end: pos,
            carried_updated,
            cursor,
        })
    }
}

fn check_output(out: &[WindowGroup], out_start: usize) -> Result<()> {
    if out_start >= out.len() {
        return Err(BurrowError::OutputTooSmall {
            capacity: out.len(),
            position: out_start,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_timestamps(n: i64) -> Vec<i64> {
        (0..n).collect()
    }

    fn groups(out: &[WindowGroup]) -> Vec<(i64, i64, i64)> {
        out.iter()
            .map(|g| (g.first_row_id, g.last_row_id, g.period_index))
            .collect()
    }

    #[test]
    fn test_filtered_skips_empty_buckets() {
        let ts = identity_timestamps(110);
        let rows = [0i64, 9, 19, 26, 62, 70, 90, 102];
        let frame = TimestampFrame::new(&ts, 0, 110, 0).unwrap();
        let index = KeyIndex::new(&rows, 0).unwrap();
        let periods = SamplePeriods::new(&[14, 37, 62, 87, 108], 0).unwrap();
        let mut out = [WindowGroup::default(); 8];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame(&frame, &index, &periods, &mut out, 0)
            .unwrap();

        assert_eq!(outcome.end, 3);
        assert!(!outcome.carried_updated);
        assert_eq!(
            groups(&out[..3]),
            vec![(19, 26, 0), (62, 70, 2), (90, 102, 3)]
        );
        assert_eq!(outcome.cursor.index_position, 8);
        assert_eq!(outcome.cursor.period_index, 4);
    }

    #[test]
    fn test_no_filter_every_row() {
        let ts = [1i64, 2, 2, 5, 7, 8, 12, 15];
        let frame = TimestampFrame::new(&ts, 0, 8, 0).unwrap();
        let periods = SamplePeriods::new(&[2, 6, 10, 14, 20], 0).unwrap();
        let mut out = [WindowGroup::default(); 8];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 0)
            .unwrap();

        // bucket [10, 14) holds row 6 (ts 12), [14, 20) holds row 7
        assert_eq!(
            groups(&out[..outcome.end]),
            vec![(1, 3, 0), (4, 5, 1), (6, 6, 2), (7, 7, 3)]
        );
    }

    #[test]
    fn test_rows_before_first_boundary_are_ignored() {
        let ts = [1i64, 2, 3];
        let frame = TimestampFrame::new(&ts, 0, 3, 0).unwrap();
        let periods = SamplePeriods::new(&[10, 20], 0).unwrap();
        let mut out = [WindowGroup::default(); 2];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(outcome.end, 0);
        assert_eq!(outcome.cursor.row_position, 3);
    }

    #[test]
    fn test_frame_base_offset_is_subtracted() {
        let ts = identity_timestamps(20);
        let frame = TimestampFrame::new(&ts, 10, 20, 10).unwrap();
        let periods = SamplePeriods::new(&[0, 15, 30], 0).unwrap();
        let mut out = [WindowGroup::default(); 4];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(groups(&out[..outcome.end]), vec![(0, 4, 0), (5, 9, 1)]);
    }

    #[test]
    fn test_carried_group_is_corrected() {
        let ts = identity_timestamps(40);
        let periods_all = [0i64, 25, 40];
        let periods = SamplePeriods::new(&periods_all, 0).unwrap();
        let resolver = SampleWindowResolver::default();
        let mut out = [WindowGroup::default(); 4];

        let first = TimestampFrame::new(&ts, 0, 20, 0).unwrap();
        let outcome = resolver
            .find_first_last_in_frame_no_filter(&first, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(groups(&out[..outcome.end]), vec![(0, 19, 0)]);
        assert_eq!(outcome.cursor.period_index, 1);

        // bucket 0 continues into the second frame
        let carried = out[outcome.end - 1];
        let mut next = [WindowGroup::default(); 4];
        next[0] = carried;
        let resumed = periods.resume_from(outcome.cursor.period_index).unwrap();
        let second = TimestampFrame::new(&ts, 20, 40, 0).unwrap();
        let outcome = resolver
            .find_first_last_in_frame_no_filter(&second, &resumed, &mut next, 1)
            .unwrap();

        assert!(outcome.carried_updated);
        assert_eq!(outcome.to_signed().unwrap(), -2);
        assert_eq!(groups(&next[..outcome.end]), vec![(0, 24, 0), (25, 39, 1)]);
    }

    #[test]
    fn test_capacity_exhaustion_resumes_without_duplicates() {
        let ts = identity_timestamps(50);
        let starts: Vec<i64> = (0..=10).map(|i| i * 5).collect();
        let periods = SamplePeriods::new(&starts, 0).unwrap();
        let resolver = SampleWindowResolver::default();

        let mut out = [WindowGroup::default(); 3];
        let frame = TimestampFrame::new(&ts, 0, 50, 0).unwrap();
        let outcome = resolver
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(outcome.end, 3);
        assert_eq!(groups(&out), vec![(0, 4, 0), (5, 9, 1), (10, 10, 2)]);
        assert_eq!(outcome.cursor.period_index, 3);
        assert_eq!(outcome.cursor.row_position, 10);

        let mut next = [WindowGroup::default(); 3];
        next[0] = out[2];
        let resumed = periods.resume_from(outcome.cursor.period_index).unwrap();
        let frame = TimestampFrame::new(&ts, outcome.cursor.row_position, 50, 0).unwrap();
        let outcome = resolver
            .find_first_last_in_frame_no_filter(&frame, &resumed, &mut next, 1)
            .unwrap();
        assert!(outcome.carried_updated);
        assert_eq!(groups(&next), vec![(10, 14, 2), (15, 19, 3), (20, 20, 4)]);
    }

    #[test]
    fn test_index_entries_past_frame_are_not_read() {
        // timestamps only cover the frame; index runs ahead into the next one
        let ts = identity_timestamps(10);
        let rows = [2i64, 7, 12, 15];
        let frame = TimestampFrame::new(&ts, 0, 10, 0).unwrap();
        let index = KeyIndex::new(&rows, 0).unwrap();
        let periods = SamplePeriods::new(&[0, 5, 100], 0).unwrap();
        let mut out = [WindowGroup::default(); 4];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame(&frame, &index, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(groups(&out[..outcome.end]), vec![(2, 2, 0), (7, 7, 1)]);
        assert_eq!(outcome.cursor.index_position, 2);
    }

    #[test]
    fn test_index_entries_before_frame_are_skipped() {
        let ts = identity_timestamps(110);
        let rows = [0i64, 9, 19, 26, 62, 70, 90, 102];
        let frame = TimestampFrame::new(&ts, 50, 110, 0).unwrap();
        let index = KeyIndex::new(&rows, 0).unwrap();
        let periods = SamplePeriods::new(&[14, 37, 62, 87, 108], 0).unwrap();
        let mut out = [WindowGroup::default(); 8];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame(&frame, &index, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(groups(&out[..outcome.end]), vec![(62, 70, 2), (90, 102, 3)]);
        assert_eq!(outcome.cursor.index_position, 8);

        // a carried group is never stretched back to a row before the frame
        let mut out = [WindowGroup::default(); 8];
        out[0] = WindowGroup::new(9, 9, 1);
        let periods = SamplePeriods::new(&[37, 62, 87, 108], 1).unwrap();
        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame(&frame, &index, &periods, &mut out, 1)
            .unwrap();
        assert!(!outcome.carried_updated);
        assert_eq!(
            groups(&out[..outcome.end]),
            vec![(9, 9, 1), (62, 70, 2), (90, 102, 3)]
        );
    }

    #[test]
    fn test_filtered_frame_base_offset_is_subtracted() {
        let ts = identity_timestamps(30);
        let rows = [3i64, 12, 14, 21, 28];
        let frame = TimestampFrame::new(&ts, 10, 30, 10).unwrap();
        let index = KeyIndex::new(&rows, 0).unwrap();
        let periods = SamplePeriods::new(&[0, 15, 25, 40], 0).unwrap();
        let mut out = [WindowGroup::default(); 4];

        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame(&frame, &index, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(
            groups(&out[..outcome.end]),
            vec![(2, 4, 0), (11, 11, 1), (18, 18, 2)]
        );
        assert_eq!(outcome.cursor.index_position, 5);
    }

    #[test]
    fn test_single_boundary_emits_nothing() {
        let ts = identity_timestamps(5);
        let frame = TimestampFrame::new(&ts, 0, 5, 0).unwrap();
        let periods = SamplePeriods::new(&[0], 0).unwrap();
        let mut out = [WindowGroup::default(); 2];
        let outcome = SampleWindowResolver::default()
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 0)
            .unwrap();
        assert_eq!(outcome.end, 0);
        assert_eq!(outcome.cursor.period_index, 0);
    }

    #[test]
    fn test_full_output_is_rejected() {
        let ts = identity_timestamps(5);
        let frame = TimestampFrame::new(&ts, 0, 5, 0).unwrap();
        let periods = SamplePeriods::new(&[0, 10], 0).unwrap();
        let mut out = [WindowGroup::default(); 2];
        let result = SampleWindowResolver::default()
            .find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 2);
        assert!(matches!(
            result,
            Err(BurrowError::OutputTooSmall {
                capacity: 2,
                position: 2
            })
        ));
    }
}
