//! In-memory bitmap index writer.
//!
//! Builds the key and value regions described in [`crate::index`]. Row ids
//! must be appended to each key in ascending order, which is what an
//! append-only table produces. The regions can be scanned directly through
//! [`BitmapIndexWriter::view`] or persisted with
//! [`BitmapIndexWriter::write_to`] and mapped back with
//! [`MappedIndex`](crate::index::MappedIndex).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BurrowError, Result};
use crate::index::view::BitmapIndexView;
use crate::index::{
    block_memory_size, key_entry_offset, KeyEntry, KeyHeader, KEY_FILE_SIGNATURE, KEY_HEADER_SIZE,
};
use crate::rows::MAX_LOCAL_ROW_ID;

/// Default number of row ids per value block.
pub const DEFAULT_BLOCK_CAPACITY: usize = 256;

/// Extension of the key region file.
pub const KEY_FILE_EXTENSION: &str = "k";

/// Extension of the value region file.
pub const VALUE_FILE_EXTENSION: &str = "v";

/// Configuration for the index writer.
#[derive(Debug, Clone)]
pub struct IndexWriterConfig {
    /// Row ids per value block. Must be a power of two. Default: 256.
    pub block_capacity: usize,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        Self {
            block_capacity: DEFAULT_BLOCK_CAPACITY,
        }
    }
}

impl IndexWriterConfig {
    /// Sets the block capacity.
    pub fn with_block_capacity(mut self, capacity: usize) -> Self {
        self.block_capacity = capacity;
        self
    }
}

/// Builds a bitmap index in memory.
#[derive(Debug, Clone)]
pub struct BitmapIndexWriter {
    config: IndexWriterConfig,
    /// Key region: header followed by one entry per key.
    keys: Vec<u8>,
    /// Value region as 64-bit words.
    values: Vec<i64>,
    key_count: usize,
    sequence: i64,
}

impl BitmapIndexWriter {
    /// Creates an empty index.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured block capacity is not a power of two.
    pub fn new(config: IndexWriterConfig) -> Result<Self> {
        let capacity = config.block_capacity;
        if capacity == 0 || !capacity.is_power_of_two() || i32::try_from(capacity).is_err() {
            return Err(BurrowError::InvalidBlockCapacity(capacity as u64));
        }
        let mut writer = Self {
            config,
            keys: vec![0u8; KEY_HEADER_SIZE],
            values: Vec::new(),
            key_count: 0,
            sequence: 0,
        };
        writer.publish_header();
        Ok(writer)
    }

    /// Row ids per value block.
    pub fn block_capacity(&self) -> usize {
        self.config.block_capacity
    }

    /// Number of keys in the index.
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Appends `row_id` to `key`, creating the key (and every key below it)
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if `key` is negative, `row_id` does not fit the 44-bit
    /// local row id budget, or `row_id` is smaller than the last row id stored
    /// for `key`.
    pub fn add(&mut self, key: i64, row_id: i64) -> Result<()> {
        let k = usize::try_from(key).map_err(|_| BurrowError::InvalidKey(key))?;
        if !(0..=MAX_LOCAL_ROW_ID).contains(&row_id) {
            return Err(BurrowError::LocalRowIdOutOfRange(row_id));
        }
        if k >= self.key_count {
            self.keys.resize(key_entry_offset(k + 1), 0);
            self.key_count = k + 1;
        }

        let capacity = self.config.block_capacity;
        let mut entry = KeyEntry::read_from(&self.keys, k).unwrap_or_default();
        let cell = (entry.value_count as usize) & (capacity - 1);

        if entry.value_count == 0 {
            let offset = self.allocate_block(-1);
            entry.first_value_block_offset = offset;
            entry.last_value_block_offset = offset;
        } else {
            let last = self.word(entry.last_value_block_offset, (cell + capacity - 1) % capacity);
            if row_id < last {
                return Err(BurrowError::NonAscendingRowId { key, row_id, last });
            }
            if cell == 0 {
                let prev = entry.last_value_block_offset;
                let offset = self.allocate_block(prev);
                self.set_word(prev, capacity + 1, offset);
                entry.last_value_block_offset = offset;
            }
        }
        self.set_word(entry.last_value_block_offset, cell, row_id);

        entry.value_count += 1;
        entry.count_check = entry.value_count;
        entry.write_to(&mut self.keys, k);
        self.publish_header();
        Ok(())
    }

    fn allocate_block(&mut self, prev_offset: i64) -> i64 {
        let capacity = self.config.block_capacity;
        let offset = (self.values.len() * 8) as i64;
        self.values.resize(self.values.len() + block_memory_size(capacity) / 8, 0);
        self.set_word(offset, capacity, prev_offset);
        offset
    }

    fn word(&self, block_offset: i64, slot: usize) -> i64 {
        self.values[block_offset as usize / 8 + slot]
    }

    fn set_word(&mut self, block_offset: i64, slot: usize, value: i64) {
        self.values[block_offset as usize / 8 + slot] = value;
    }

    fn publish_header(&mut self) {
        self.sequence += 1;
        let header = KeyHeader {
            signature: KEY_FILE_SIGNATURE,
            sequence: self.sequence,
            value_mem_size: (self.values.len() * 8) as i64,
            block_value_count: self.config.block_capacity as i32,
            key_count: self.key_count as i64,
            sequence_check: self.sequence,
        };
        header.write_to(&mut self.keys);
    }

    /// The key region.
    pub fn key_memory(&self) -> &[u8] {
        &self.keys
    }

    /// The value region as bytes.
    pub fn value_memory(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }

    /// The value region as 64-bit words.
    pub fn value_words(&self) -> &[i64] {
        &self.values
    }

    /// A view over the current regions.
    ///
    /// # Errors
    ///
    /// Never fails for a writer-built index; the `Result` mirrors
    /// [`BitmapIndexView::from_words`].
    pub fn view(&self) -> Result<BitmapIndexView<'_>> {
        BitmapIndexView::from_words(&self.keys, &self.values, self.config.block_capacity)
    }

    /// Writes `<name>.k` and `<name>.v` into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn write_to(&self, dir: &Path, name: &str) -> Result<(PathBuf, PathBuf)> {
        let key_path = dir.join(format!("{name}.{KEY_FILE_EXTENSION}"));
        let value_path = dir.join(format!("{name}.{VALUE_FILE_EXTENSION}"));
        fs::write(&key_path, &self.keys)?;
        fs::write(&value_path, self.value_memory())?;
        debug!(
            keys = self.key_count,
            value_bytes = self.values.len() * 8,
            "Wrote bitmap index {}",
            key_path.display()
        );
        Ok((key_path, value_path))
    }
}
