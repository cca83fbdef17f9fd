//! Bounded search primitives over ascending sequences.
//!
//! Two families live here:
//!
//! - [`scan_search`] / [`binary_search`]: exact-match searches over an
//!   inclusive `[low, high]` range. A hit inside a run of duplicates is moved
//!   to the run boundary selected by [`ScanDirection`]. A miss reports the
//!   insertion point. Both return `Ok(position)` / `Err(insertion_point)`;
//!   [`encode_search_result`] produces the flat `-(insertion) - 1` form used
//!   at the raw boundary.
//! - [`branch_free_search_lower`] and its linked variants: lower-bound
//!   searches returning the position of the first element `>= value`.
//!   The linked variants search through a row-id index into a data column
//!   (`data[index[i]]`), which is how the window resolver walks a per-key
//!   index over a timestamp column.

use std::cmp::Ordering;

/// Ranges narrower than this are finished with a linear scan.
pub const SCAN_THRESHOLD: usize = 65;

/// Smallest galloping step taken by [`linked_search_lower`] by default.
pub const DEFAULT_MIN_LINKED_STEP: usize = 32;

/// Which end of a run of equal values a search reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Report the last element of the run.
    Up,
    /// Report the first element of the run.
    Down,
}

/// Outcome of an exact-match search: `Ok(position)` or `Err(insertion_point)`.
pub type SearchResult = std::result::Result<usize, usize>;

/// Encodes a search result as a single `i64`: the position when found,
/// `-(insertion_point) - 1` otherwise.
pub fn encode_search_result(result: SearchResult) -> i64 {
    match result {
        Ok(position) => position as i64,
        Err(insertion) => -(insertion as i64) - 1,
    }
}

/// Inverse of [`encode_search_result`].
pub fn decode_search_result(encoded: i64) -> SearchResult {
    if encoded >= 0 {
        Ok(encoded as usize)
    } else {
        Err((-(encoded + 1)) as usize)
    }
}

#[inline]
fn run_boundary<T: Copy + Ord>(
    data: &[T],
    mut p: usize,
    low: usize,
    high: usize,
    direction: ScanDirection,
) -> usize {
    let value = data[p];
    match direction {
        ScanDirection::Up => {
            while p < high && data[p + 1] == value {
                p += 1;
            }
        }
        ScanDirection::Down => {
            while p > low && data[p - 1] == value {
                p -= 1;
            }
        }
    }
    p
}

/// Linear search over the inclusive range `[low, high]`.
///
/// # Panics
///
/// Panics if `high >= data.len()`.
pub fn scan_search<T: Copy + Ord>(
    data: &[T],
    value: T,
    low: usize,
    high: usize,
    direction: ScanDirection,
) -> SearchResult {
    for p in low..=high {
        match data[p].cmp(&value) {
            Ordering::Equal => return Ok(run_boundary(data, p, low, high, direction)),
            Ordering::Greater => return Err(p),
            Ordering::Less => {}
        }
    }
    Err(high + 1)
}

/// Binary search over the inclusive range `[low, high]`, switching to
/// [`scan_search`] once fewer than [`SCAN_THRESHOLD`] elements remain.
///
/// # Panics
///
/// Panics if `high >= data.len()`.
pub fn binary_search<T: Copy + Ord>(
    data: &[T],
    value: T,
    low: usize,
    high: usize,
    direction: ScanDirection,
) -> SearchResult {
    let (mut low, mut high) = (low, high);
    while low <= high && high - low >= SCAN_THRESHOLD {
        let mid = low + (high - low) / 2;
        match data[mid].cmp(&value) {
            Ordering::Less => low = mid + 1,
            Ordering::Greater => high = mid,
            Ordering::Equal => return Ok(run_boundary(data, mid, low, high, direction)),
        }
    }
    scan_search(data, value, low, high, direction)
}

/// Returns the position of the first element `>= value` (`data.len()` when
/// every element is smaller).
#[inline]
pub fn branch_free_search_lower<T: Copy + Ord>(data: &[T], value: T) -> usize {
    if data.is_empty() {
        return 0;
    }
    let mut base = 0;
    let mut n = data.len();
    while n > 1 {
        let half = n / 2;
        base = if data[base + half] < value { base + half } else { base };
        n -= half;
    }
    base + usize::from(data[base] < value)
}

/// Lower-bound search through a row-id index: returns the first position `i`
/// with `data[index[i]] >= value`.
///
/// # Panics
///
/// Panics if an index entry is negative or not below `data.len()`.
#[inline]
pub fn branch_free_linked_search_lower(index: &[i64], data: &[i64], value: i64) -> usize {
    if index.is_empty() {
        return 0;
    }
    let mut base = 0;
    let mut n = index.len();
    while n > 1 {
        let half = n / 2;
        base = if data[index[base + half] as usize] < value {
            base + half
        } else {
            base
        };
        n -= half;
    }
    base + usize::from(data[index[base] as usize] < value)
}

/// Galloping variant of [`branch_free_linked_search_lower`].
///
/// Timestamps of one key tend to be spread evenly over the index, so with
/// `estimated_count` targets left the next one is expected about
/// `index.len() / estimated_count` entries ahead. The search strides by
/// `max(min_step, index.len() / estimated_count)` while the last entry of the
/// stride is still below `value`, then finishes inside the final stride.
///
/// # Panics
///
/// Panics if an index entry is negative or not below `data.len()`.
pub fn linked_search_lower(
    index: &[i64],
    data: &[i64],
    estimated_count: usize,
    value: i64,
    min_step: usize,
) -> usize {
    let len = index.len();
    let step = min_step.max(1).max(len / estimated_count.max(1));
    let mut start = 0;
    while start + step < len && data[index[start + step - 1] as usize] < value {
        start += step;
    }
    let end = start + step.min(len - start);
    start + branch_free_linked_search_lower(&index[start..end], data, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_lower(data: &[i64], value: i64) -> usize {
        data.iter().position(|&v| v >= value).unwrap_or(data.len())
    }

    #[test]
    fn test_scan_search_duplicate_runs() {
        let data = [1i64, 3, 3, 3, 5, 7, 7];
        assert_eq!(scan_search(&data, 3, 0, 6, ScanDirection::Up), Ok(3));
        assert_eq!(scan_search(&data, 3, 0, 6, ScanDirection::Down), Ok(1));
        assert_eq!(scan_search(&data, 7, 0, 6, ScanDirection::Up), Ok(6));
        assert_eq!(scan_search(&data, 7, 0, 5, ScanDirection::Up), Ok(5));
        assert_eq!(scan_search(&data, 1, 0, 6, ScanDirection::Down), Ok(0));
    }

    #[test]
    fn test_scan_search_insertion_points() {
        let data = [1i64, 3, 3, 5];
        assert_eq!(scan_search(&data, 0, 0, 3, ScanDirection::Up), Err(0));
        assert_eq!(scan_search(&data, 4, 0, 3, ScanDirection::Up), Err(3));
        assert_eq!(scan_search(&data, 9, 0, 3, ScanDirection::Up), Err(4));
        assert_eq!(scan_search(&data, 9, 0, 2, ScanDirection::Up), Err(3));
    }

    #[test]
    fn test_binary_search_large_runs() {
        // 500 distinct values, each repeated three times
        let data: Vec<i64> = (0..1500).map(|i| (i / 3) * 2).collect();
        for v in [0i64, 2, 500, 998] {
            let first = data.iter().position(|&x| x == v).unwrap();
            let last = data.iter().rposition(|&x| x == v).unwrap();
            assert_eq!(
                binary_search(&data, v, 0, data.len() - 1, ScanDirection::Down),
                Ok(first)
            );
            assert_eq!(
                binary_search(&data, v, 0, data.len() - 1, ScanDirection::Up),
                Ok(last)
            );
        }
        for v in [-1i64, 1, 501, 999] {
            let insertion = naive_lower(&data, v);
            assert_eq!(
                binary_search(&data, v, 0, data.len() - 1, ScanDirection::Up),
                Err(insertion)
            );
        }
    }

    #[test]
    fn test_binary_search_sub_range() {
        let data: Vec<i64> = (0..400).collect();
        assert_eq!(binary_search(&data, 250, 100, 300, ScanDirection::Up), Ok(250));
        assert_eq!(binary_search(&data, 350, 100, 300, ScanDirection::Up), Err(301));
        assert_eq!(binary_search(&data, 50, 100, 300, ScanDirection::Up), Err(100));
    }

    #[test]
    fn test_encoded_result_roundtrip() {
        assert_eq!(encode_search_result(Ok(4)), 4);
        assert_eq!(encode_search_result(Err(0)), -1);
        assert_eq!(encode_search_result(Err(7)), -8);
        assert_eq!(decode_search_result(-8), Err(7));
        assert_eq!(decode_search_result(0), Ok(0));
    }

    #[test]
    fn test_branch_free_search_lower_matches_naive() {
        let data = [2i64, 4, 4, 4, 9, 12, 12, 30];
        for v in -1..=31 {
            assert_eq!(branch_free_search_lower(&data, v), naive_lower(&data, v), "v={v}");
        }
        assert_eq!(branch_free_search_lower::<i64>(&[], 5), 0);
    }

    #[test]
    fn test_linked_search_lower_matches_naive() {
        // timestamp column: row r has timestamp 3 * r
        let ts: Vec<i64> = (0..5_000).map(|r| r * 3).collect();
        let index: Vec<i64> = (0..5_000).filter(|r| r % 7 == 0 || r % 11 == 0).collect();
        let projected: Vec<i64> = index.iter().map(|&r| ts[r as usize]).collect();

        for value in [-5i64, 0, 1, 20, 333, 7_000, 14_997, 15_000, 20_000] {
            let expected = naive_lower(&projected, value);
            assert_eq!(branch_free_linked_search_lower(&index, &ts, value), expected);
            for estimate in [1usize, 3, 50, 10_000] {
                for min_step in [1usize, 32, 4_096] {
                    assert_eq!(
                        linked_search_lower(&index, &ts, estimate, value, min_step),
                        expected,
                        "value={value} estimate={estimate} min_step={min_step}"
                    );
                }
            }
        }
    }
}
