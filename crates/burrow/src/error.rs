//! Error and Result types for Burrow scans.
//!
//! Data conditions met during a scan (keys missing from a partition, blocks
//! not yet visible, output buffers filling up) are never errors; they are
//! reported through the scan state. The variants below are contract
//! violations detected before any memory is read, plus I/O failures from the
//! file mapping layer.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for Burrow operations.
pub type Result<T> = std::result::Result<T, BurrowError>;

/// The error type for Burrow operations.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// Value block capacity is not a power of two.
    #[error("Invalid block capacity: {0} is not a power of two")]
    InvalidBlockCapacity(u64),

    /// Key range has `key_lo > key_hi` or a negative bound.
    #[error("Invalid key range: [{lo}, {hi})")]
    InvalidKeyRange {
        /// Lower key bound (inclusive).
        lo: i64,
        /// Upper key bound (exclusive).
        hi: i64,
    },

    /// Value range has `min_value > max_value`.
    #[error("Invalid value range: min {min} > max {max}")]
    InvalidValueRange {
        /// Lower value bound (inclusive).
        min: i64,
        /// Upper value bound (inclusive).
        max: i64,
    },

    /// Output rows array cannot hold every key of the scan range.
    #[error("Rows array too short: need {required} slots, have {actual}")]
    RowsTooShort {
        /// Slots required by the key range.
        required: usize,
        /// Slots available.
        actual: usize,
    },

    /// Unindexed null count is negative.
    #[error("Negative unindexed null count: {0}")]
    NegativeNullCount(i64),

    /// Partition index does not fit the row id encoding.
    #[error("Partition index {0} out of range")]
    PartitionIndexOutOfRange(i64),

    /// Local row id does not fit the row id encoding.
    #[error("Local row id {0} out of range")]
    LocalRowIdOutOfRange(i64),

    /// Frame row range does not lie within the timestamp column.
    #[error("Frame [{row_lo}, {row_hi}) out of bounds for column of {len} rows")]
    FrameOutOfBounds {
        /// First row of the frame (inclusive).
        row_lo: i64,
        /// Last row of the frame (exclusive).
        row_hi: i64,
        /// Rows available in the column.
        len: usize,
    },

    /// Frame contains no rows.
    #[error("Empty frame [{row_lo}, {row_hi})")]
    EmptyFrame {
        /// First row of the frame (inclusive).
        row_lo: i64,
        /// Last row of the frame (exclusive).
        row_hi: i64,
    },

    /// Sample boundary sequence is empty.
    #[error("Sample period sequence is empty")]
    EmptySamplePeriods,

    /// Sample boundaries are not strictly ascending.
    #[error("Sample periods not ascending at position {position}")]
    SamplePeriodsNotAscending {
        /// Position of the first boundary not greater than its predecessor.
        position: usize,
    },

    /// Index position lies outside the row-id index.
    #[error("Index position {position} out of range for index of {len} entries")]
    IndexPositionOutOfRange {
        /// Requested starting position.
        position: i64,
        /// Entries in the index.
        len: usize,
    },

    /// Row-id index holds a negative row id.
    #[error("Invalid row id in index: {0}")]
    InvalidRowId(i64),

    /// Output buffer has no room past the write position.
    #[error("Output buffer too small: capacity {capacity}, write position {position}")]
    OutputTooSmall {
        /// Declared capacity in groups.
        capacity: usize,
        /// Group position writing would start at.
        position: usize,
    },

    /// Output capacity does not fit the signed 32-bit flat return value.
    #[error("Output buffer too large: {0} groups")]
    OutputTooLarge(usize),

    /// Flat buffer length or alignment does not match the expected layout.
    #[error("Misaligned buffer: {0}")]
    MisalignedBuffer(String),

    /// Key file does not start with the index signature.
    #[error("Invalid index signature: expected {expected:#x}, got {actual:#x}")]
    InvalidSignature {
        /// Expected signature byte.
        expected: u8,
        /// Signature byte found.
        actual: u8,
    },

    /// Key file is shorter than its header.
    #[error("Truncated key file: {0} bytes")]
    TruncatedKeyFile(usize),

    /// Key is negative or otherwise unusable by the index writer.
    #[error("Invalid key: {0}")]
    InvalidKey(i64),

    /// Row ids must be appended to a key in ascending order.
    #[error("Non-ascending row id for key {key}: {row_id} after {last}")]
    NonAscendingRowId {
        /// Key being appended to.
        key: i64,
        /// Rejected row id.
        row_id: i64,
        /// Last row id stored for the key.
        last: i64,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
