//! Integration tests for sample window resolution.

use alopex_burrow::index::files::write_column;
use alopex_burrow::index::{BitmapIndexWriter, IndexWriterConfig, MappedColumn};
use alopex_burrow::raw;
use alopex_burrow::sample::{
    KeyIndex, SamplePeriods, SampleByCollector, SampleWindowResolver, TimestampFrame,
    WindowGroup, GROUP_SLOTS,
};
use alopex_burrow::{BurrowError, ResolverConfig};
use tempfile::TempDir;

fn spans(groups: &[WindowGroup]) -> Vec<(i64, i64, i64)> {
    groups
        .iter()
        .map(|g| (g.first_row_id, g.last_row_id, g.period_index))
        .collect()
}

// ============================================================================
// Reference example
// ============================================================================

#[test]
fn test_filtered_reference_example() {
    let timestamps: Vec<i64> = (0..110).collect();
    let index = [0i64, 9, 19, 26, 62, 70, 90, 102];
    let boundaries = [14, 37, 62, 87, 108];

    let frame = TimestampFrame::new(&timestamps, 0, 110, 0).unwrap();
    let key_index = KeyIndex::new(&index, 0).unwrap();
    let periods = SamplePeriods::new(&boundaries, 0).unwrap();
    let mut out = vec![WindowGroup::default(); 8];

    let outcome = SampleWindowResolver::default()
        .find_first_last_in_frame(&frame, &key_index, &periods, &mut out, 0)
        .unwrap();

    assert_eq!(outcome.emitted(0), 3);
    assert_eq!(
        spans(&out[..outcome.end]),
        vec![(19, 26, 0), (62, 70, 2), (90, 102, 3)]
    );
}

#[test]
fn test_small_linked_step_gives_same_groups() {
    let timestamps: Vec<i64> = (0..2_000).map(|i| i * 3).collect();
    let index: Vec<i64> = (0..2_000).filter(|r| r % 7 == 2 || r % 11 == 0).collect();
    let boundaries: Vec<i64> = (0..=60).map(|i| i * 100).collect();

    let frame = TimestampFrame::new(&timestamps, 0, 2_000, 0).unwrap();
    let key_index = KeyIndex::new(&index, 0).unwrap();
    let periods = SamplePeriods::new(&boundaries, 0).unwrap();

    let mut galloping = vec![WindowGroup::default(); 64];
    let mut stepping = vec![WindowGroup::default(); 64];
    let a = SampleWindowResolver::default()
        .find_first_last_in_frame(&frame, &key_index, &periods, &mut galloping, 0)
        .unwrap();
    let b = SampleWindowResolver::new(ResolverConfig::default().with_min_linked_step(1))
        .find_first_last_in_frame(&frame, &key_index, &periods, &mut stepping, 0)
        .unwrap();

    assert_eq!(a.end, 60);
    assert_eq!(spans(&galloping[..a.end]), spans(&stepping[..b.end]));
}

// ============================================================================
// Multi-frame collection
// ============================================================================

#[test]
fn test_collector_over_mapped_columns() {
    let temp_dir = TempDir::new().unwrap();
    let ts_path = temp_dir.path().join("ts.d");
    let index_path = temp_dir.path().join("sym.r");

    // two rows per timestamp, every fourth row tagged with the key
    let timestamps: Vec<i64> = (0..400).map(|i| 1_000 + i / 2).collect();
    let index: Vec<i64> = (0..400).filter(|r| r % 4 == 1).collect();
    write_column(&ts_path, &timestamps).unwrap();
    write_column(&index_path, &index).unwrap();

    let ts_column = MappedColumn::open(&ts_path).unwrap();
    let index_column = MappedColumn::open(&index_path).unwrap();
    assert_eq!(ts_column.len(), 400);
    let ts = ts_column.as_slice().unwrap();
    let rows = index_column.as_slice().unwrap();

    let boundaries: Vec<i64> = (0..=10).map(|i| 1_000 + i * 20).collect();
    let mut collector =
        SampleByCollector::new(SampleWindowResolver::default(), &boundaries, 3).unwrap();
    for (lo, hi) in [(0, 77), (77, 150), (150, 333), (333, 400)] {
        collector.push_indexed_frame(ts, lo, hi, 0, rows).unwrap();
    }

    // bucket i covers timestamps [1000 + 20i, 1020 + 20i), rows [40i, 40i + 40)
    let expected: Vec<(i64, i64, i64)> =
        (0..10).map(|i| (40 * i + 1, 40 * i + 37, i)).collect();
    assert_eq!(spans(&collector.finish()), expected);
}

#[test]
fn test_collector_unfiltered_with_gaps() {
    // timestamps jump over whole buckets
    let timestamps = [0i64, 1, 2, 50, 51, 52, 53, 99, 140, 141];
    let boundaries = [0i64, 10, 20, 30, 40, 50, 60, 100, 150];
    let mut collector =
        SampleByCollector::new(SampleWindowResolver::default(), &boundaries, 2).unwrap();
    collector.push_frame(&timestamps, 0, 4, 0).unwrap();
    collector.push_frame(&timestamps, 4, 10, 0).unwrap();

    assert_eq!(
        spans(&collector.finish()),
        vec![(0, 2, 0), (3, 6, 5), (7, 7, 6), (8, 9, 7)]
    );
}

#[test]
fn test_frame_relative_row_ids() {
    let timestamps: Vec<i64> = (0..30).collect();
    let boundaries = [0i64, 10, 20, 30];
    let mut collector =
        SampleByCollector::new(SampleWindowResolver::default(), &boundaries, 8).unwrap();
    collector.push_frame(&timestamps, 10, 30, 10).unwrap();
    assert_eq!(
        spans(&collector.finish()),
        vec![(0, 9, 1), (10, 19, 2)]
    );
}

// ============================================================================
// Flat buffer protocol
// ============================================================================

#[test]
fn test_flat_calls_with_continuation_match_single_call() {
    let timestamps: Vec<i64> = (0..200).map(|i| i * 5).collect();
    let index: Vec<i64> = (0..200).filter(|r| r % 3 == 0).collect();
    let boundaries: Vec<i64> = (0..=25).map(|i| i * 40).collect();

    let mut whole = vec![0i64; 32 * GROUP_SLOTS];
    let n = raw::find_first_last_in_frame(
        0, 0, 200, &timestamps, 0, &index, 0, &boundaries, 0, &mut whole, 32,
    )
    .unwrap();
    assert_eq!(n, 25);

    // same work in calls of at most three groups, carrying the last group
    let mut collected: Vec<i64> = Vec::new();
    let mut index_position = 0;
    let mut period = 0i64;
    let mut carried: Option<[i64; GROUP_SLOTS]> = None;
    loop {
        let mut out = vec![0i64; 5 * GROUP_SLOTS];
        let out_index = match carried {
            Some(group) => {
                out[..GROUP_SLOTS].copy_from_slice(&group);
                1
            }
            None => 0,
        };
        let periods = &boundaries[period as usize..];
        let n = raw::find_first_last_in_frame(
            out_index,
            0,
            200,
            &timestamps,
            0,
            &index,
            index_position,
            periods,
            period,
            &mut out,
            out_index + 4,
        )
        .unwrap();
        let end = n.unsigned_abs() as usize;
        if n < 0 {
            let len = collected.len();
            collected[len - GROUP_SLOTS..].copy_from_slice(&out[..GROUP_SLOTS]);
        }
        collected.extend_from_slice(&out[out_index * GROUP_SLOTS..end * GROUP_SLOTS]);

        let cursor = raw::read_continuation(&out, end).unwrap();
        index_position = cursor.index_position;
        period = cursor.period_index;
        if end - out_index < 3 {
            break;
        }
        let last = &collected[collected.len() - GROUP_SLOTS..];
        carried = Some([last[0], last[1], last[2], last[3]]);
    }

    assert_eq!(collected, whole[..25 * GROUP_SLOTS].to_vec());
}

#[test]
fn test_contract_violations_fail_fast() {
    let timestamps = [1i64, 2, 3];
    let mut out = vec![WindowGroup::default(); 4];
    let resolver = SampleWindowResolver::default();

    assert!(matches!(
        SamplePeriods::new(&[5, 4], 0),
        Err(BurrowError::SamplePeriodsNotAscending { position: 1 })
    ));
    assert!(matches!(
        TimestampFrame::new(&timestamps, 0, 9, 0),
        Err(BurrowError::FrameOutOfBounds { .. })
    ));
    assert!(matches!(
        KeyIndex::new(&[1, 2], 5),
        Err(BurrowError::IndexPositionOutOfRange { position: 5, len: 2 })
    ));

    let frame = TimestampFrame::new(&timestamps, 0, 3, 0).unwrap();
    let periods = SamplePeriods::new(&[0, 10], 0).unwrap();
    assert!(matches!(
        resolver.find_first_last_in_frame_no_filter(&frame, &periods, &mut out, 4),
        Err(BurrowError::OutputTooSmall { capacity: 4, position: 4 })
    ));
}

#[test]
fn test_index_built_by_writer_drives_resolver() {
    // a key's row list read back through the bitmap index
    let mut writer =
        BitmapIndexWriter::new(IndexWriterConfig::default().with_block_capacity(8)).unwrap();
    for row in 0..100 {
        writer.add(row % 5, row).unwrap();
    }
    let view = writer.view().unwrap();
    let rows: Vec<i64> = view.values(3).collect();
    assert_eq!(rows.len(), 20);

    let timestamps: Vec<i64> = (0..100).collect();
    let boundaries = [0i64, 50, 100];
    let frame = TimestampFrame::new(&timestamps, 0, 100, 0).unwrap();
    let key_index = KeyIndex::new(&rows, 0).unwrap();
    let periods = SamplePeriods::new(&boundaries, 0).unwrap();
    let mut out = vec![WindowGroup::default(); 4];
    let outcome = SampleWindowResolver::default()
        .find_first_last_in_frame(&frame, &key_index, &periods, &mut out, 0)
        .unwrap();
    assert_eq!(spans(&out[..outcome.end]), vec![(3, 48, 0), (53, 98, 1)]);
}
