//! Burrow - Alopex row resolution over partitioned columnar storage
//!
//! This crate turns per-partition bitmap indexes and timestamp columns into
//! row ids for two query shapes: "latest row per key" and "first/last row
//! per sample bucket".
//!
//! # Components
//!
//! - [`RowId`]: partition index and local row packed into one `i64`
//! - [`BitmapIndexView`]: bounds-checked reader over an index's key and value regions
//! - [`latest::scan_backward`]: latest row per key within one partition
//! - [`SampleWindowResolver`]: first/last row per sample bucket within one frame
//! - [`search`]: bounded, run-aware and galloping searches shared by the scanners
//!
//! # Example
//!
//! ```
//! use alopex_burrow::index::{BitmapIndexWriter, IndexWriterConfig};
//! use alopex_burrow::latest::{scan_backward, ScanRange};
//!
//! let mut writer = BitmapIndexWriter::new(IndexWriterConfig::default())?;
//! writer.add(0, 3)?;
//! writer.add(1, 4)?;
//! writer.add(0, 7)?;
//!
//! let mut rows = vec![0i64; 2];
//! let mut range = ScanRange::new(&mut rows, 0, 2)?;
//! scan_backward(&writer.view()?, &mut range, i64::MAX, 0, 0, 5)?;
//!
//! assert!(range.is_empty());
//! assert_eq!(range.row_id(0).map(|r| r.local_row_id()), Some(7));
//! assert_eq!(range.row_id(1).map(|r| r.partition_index()), Some(5));
//! # Ok::<(), alopex_burrow::BurrowError>(())
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod index;
pub mod latest;
pub mod raw;
pub mod rows;
pub mod sample;
pub mod search;

pub use error::{BurrowError, Result};
pub use index::{BitmapIndexView, BitmapIndexWriter, IndexWriterConfig, MappedColumn, MappedIndex};
pub use latest::{resolve_latest_by_key, LatestPartition, ScanRange};
pub use rows::RowId;
pub use sample::{
    FrameCursor, FrameOutcome, ResolverConfig, SampleByCollector, SampleWindowResolver,
    WindowGroup,
};
