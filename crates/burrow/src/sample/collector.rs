//! Multi-frame driver for the window resolver.

use tracing::debug;

use crate::error::{BurrowError, Result};
use crate::sample::{
    KeyIndex, SamplePeriods, SampleWindowResolver, TimestampFrame, WindowGroup,
};

/// Collects the bucket groups of one key (or of all rows) across frames.
///
/// Frames are pushed in row order. The collector keeps the resume state
/// between resolver calls: the next boundary to search for, the position in
/// the row-id index, and the last group, which is handed back to the
/// resolver so a bucket spanning a frame edge gets its last row corrected.
/// When the scratch buffer fills up mid-frame the collector resumes from
/// the returned cursor until the frame is exhausted.
///
/// # Examples
///
/// ```
/// use alopex_burrow::sample::{SampleByCollector, SampleWindowResolver};
///
/// let timestamps: Vec<i64> = (0..30).collect();
/// let boundaries = [0, 10, 20, 30];
/// let mut collector =
///     SampleByCollector::new(SampleWindowResolver::default(), &boundaries, 2).unwrap();
/// collector.push_frame(&timestamps, 0, 15, 0).unwrap();
/// collector.push_frame(&timestamps, 15, 30, 0).unwrap();
///
/// let groups = collector.finish();
/// assert_eq!(groups.len(), 3);
/// assert_eq!((groups[1].first_row_id, groups[1].last_row_id), (10, 19));
/// ```
#[derive(Debug)]
pub struct SampleByCollector<'p> {
    resolver: SampleWindowResolver,
    periods: SamplePeriods<'p>,
    next_period: i64,
    index_position: i64,
    groups: Vec<WindowGroup>,
    scratch: Vec<WindowGroup>,
    buffer_capacity: usize,
}

impl<'p> SampleByCollector<'p> {
    /// Creates a collector over `boundaries`, resolving at most
    /// `buffer_capacity` new groups per resolver call.
    ///
    /// # Errors
    ///
    /// Returns an error if `boundaries` is empty or not strictly ascending,
    /// or if `buffer_capacity` is zero.
    pub fn new(
        resolver: SampleWindowResolver,
        boundaries: &'p [i64],
        buffer_capacity: usize,
    ) -> Result<Self> {
        let periods = SamplePeriods::new(boundaries, 0)?;
        if buffer_capacity == 0 {
            return Err(BurrowError::OutputTooSmall {
                capacity: 0,
                position: 0,
            });
        }
        Ok(Self {
            resolver,
            periods,
            next_period: 0,
            index_position: 0,
            groups: Vec::new(),
            // one extra slot for the carried group
            scratch: vec![WindowGroup::default(); buffer_capacity + 1],
            buffer_capacity,
        })
    }

    /// Groups collected so far. The last one may still grow.
    pub fn groups(&self) -> &[WindowGroup] {
        &self.groups
    }

    /// Absolute index of the next boundary to search for.
    pub fn next_period(&self) -> i64 {
        self.next_period
    }

    /// Resolves the frame `[row_lo, row_hi)` over every row.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is empty or out of bounds.
    pub fn push_frame(
        &mut self,
        timestamps: &[i64],
        row_lo: i64,
        row_hi: i64,
        frame_base_offset: i64,
    ) -> Result<()> {
        let mut lo = row_lo;
        let mut calls = 0usize;
        loop {
            let frame = TimestampFrame::new(timestamps, lo, row_hi, frame_base_offset)?;
            let Some(periods) = self.periods.resume_from(self.next_period) else {
                break;
            };
            let out_start = self.load_carried();
            let out = &mut self.scratch[..out_start + self.buffer_capacity];
            let outcome =
                self.resolver
                    .find_first_last_in_frame_no_filter(&frame, &periods, out, out_start)?;
            calls += 1;
            let full = self.store(out_start, outcome.end, outcome.carried_updated);
            self.next_period = outcome.cursor.period_index;
            lo = outcome.cursor.row_position;
            if !full || lo >= row_hi {
                break;
            }
        }
        debug!(
            row_lo,
            row_hi,
            calls,
            groups = self.groups.len(),
            "Collected unfiltered frame"
        );
        Ok(())
    }

    /// Resolves the frame `[row_lo, row_hi)` over the rows listed in
    /// `index`, the full ascending row-id index of the key. The position in
    /// the index carries over between frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is empty or out of bounds, or if the
    /// index is shorter than the position reached by earlier frames.
    pub fn push_indexed_frame(
        &mut self,
        timestamps: &[i64],
        row_lo: i64,
        row_hi: i64,
        frame_base_offset: i64,
        index: &[i64],
    ) -> Result<()> {
        let frame = TimestampFrame::new(timestamps, row_lo, row_hi, frame_base_offset)?;
        let mut calls = 0usize;
        loop {
            let Some(periods) = self.periods.resume_from(self.next_period) else {
                break;
            };
            let key_index = KeyIndex::new(index, self.index_position)?;
            let out_start = self.load_carried();
            let out = &mut self.scratch[..out_start + self.buffer_capacity];
            let outcome = self.resolver.find_first_last_in_frame(
                &frame,
                &key_index,
                &periods,
                out,
                out_start,
            )?;
            calls += 1;
            let full = self.store(out_start, outcome.end, outcome.carried_updated);
            self.next_period = outcome.cursor.period_index;
            self.index_position = outcome.cursor.index_position;
            // a full call always emitted at least one group, so this ends
            if !full {
                break;
            }
        }
        debug!(
            row_lo,
            row_hi,
            calls,
            index_position = self.index_position,
            groups = self.groups.len(),
            "Collected indexed frame"
        );
        Ok(())
    }

    /// Returns every collected group.
    pub fn finish(self) -> Vec<WindowGroup> {
        self.groups
    }

    /// Places the last collected group in the carry slot; returns where new
    /// groups start.
    fn load_carried(&mut self) -> usize {
        match self.groups.last() {
            Some(last) => {
                self.scratch[0] = *last;
                1
            }
            None => 0,
        }
    }

    /// Moves resolved groups out of the scratch buffer; true when it filled.
    fn store(&mut self, out_start: usize, end: usize, carried_updated: bool) -> bool {
        if carried_updated {
            if let Some(last) = self.groups.last_mut() {
                *last = self.scratch[0];
            }
        }
        self.groups.extend_from_slice(&self.scratch[out_start..end]);
        end == out_start + self.buffer_capacity
    }
}
