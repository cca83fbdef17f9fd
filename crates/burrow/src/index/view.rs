//! Read-only view over a bitmap index.
//!
//! The view is built from the key and value regions as they are mapped at
//! call time. Both region lengths are fixed for the lifetime of the view and
//! every block offset read from the index is checked against that snapshot
//! before it is dereferenced, so an index that a concurrent writer has grown
//! past the mapping is read as if the growth had not happened yet.

use tracing::debug;

use crate::error::{BurrowError, Result};
use crate::index::{block_memory_size, KeyEntry, KeyHeader, KEY_ENTRY_SIZE, KEY_FILE_SIGNATURE, KEY_HEADER_SIZE};
use crate::search::{binary_search, ScanDirection};

/// View over the key and value regions of one bitmap index.
#[derive(Debug, Clone, Copy)]
pub struct BitmapIndexView<'a> {
    keys: &'a [u8],
    values: &'a [i64],
    capacity: usize,
    key_count: usize,
}

impl<'a> BitmapIndexView<'a> {
    /// Creates a view over raw key and value regions.
    ///
    /// A trailing partial word of the value region is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `block_capacity` is not a power of two, the key
    /// region is shorter than its header or carries the wrong signature, or
    /// the value region is not 8-byte aligned.
    pub fn new(keys: &'a [u8], values: &'a [u8], block_capacity: usize) -> Result<Self> {
        let whole_words = values.len() & !7;
        let values: &[i64] = bytemuck::try_cast_slice(&values[..whole_words])
            .map_err(|e| BurrowError::MisalignedBuffer(format!("value region: {e}")))?;
        Self::from_words(keys, values, block_capacity)
    }

    /// Creates a view over a key region and a value region already typed as
    /// 64-bit words.
    ///
    /// # Errors
    ///
    /// Same as [`BitmapIndexView::new`], minus the alignment check.
    pub fn from_words(keys: &'a [u8], values: &'a [i64], block_capacity: usize) -> Result<Self> {
        if block_capacity == 0 || !block_capacity.is_power_of_two() {
            return Err(BurrowError::InvalidBlockCapacity(block_capacity as u64));
        }
        let header = KeyHeader::read_from(keys).ok_or(BurrowError::TruncatedKeyFile(keys.len()))?;
        if header.signature != KEY_FILE_SIGNATURE {
            return Err(BurrowError::InvalidSignature {
                expected: KEY_FILE_SIGNATURE,
                actual: header.signature,
            });
        }
        let mapped_keys = (keys.len() - KEY_HEADER_SIZE) / KEY_ENTRY_SIZE;
        let key_count = usize::try_from(header.key_count).unwrap_or(0).min(mapped_keys);
        Ok(Self {
            keys,
            values,
            capacity: block_capacity,
            key_count,
        })
    }

    /// Number of keys whose entries are both published and mapped.
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Row ids per value block.
    pub fn block_capacity(&self) -> usize {
        self.capacity
    }

    /// Mapped size of the value region in bytes.
    pub fn value_memory_size(&self) -> usize {
        self.values.len() * 8
    }

    /// Metadata of key `k`, or `None` if `k` is not below [`key_count`](Self::key_count).
    pub fn key(&self, k: usize) -> Option<KeyEntry> {
        if k >= self.key_count {
            return None;
        }
        KeyEntry::read_from(self.keys, k)
    }

    /// Opens a block cursor at a byte offset.
    ///
    /// Returns `None` for negative or misaligned offsets. The cursor may still
    /// point past the mapped region; check [`BlockCursor::is_mapped`].
    pub fn block(&self, offset: i64) -> Option<BlockCursor<'a>> {
        let offset = usize::try_from(offset).ok()?;
        if offset % 8 != 0 {
            return None;
        }
        Some(BlockCursor {
            values: self.values,
            offset,
            capacity: self.capacity,
        })
    }

    /// Locates the block holding the key's most recent value.
    ///
    /// The published last block offset is used only when the entry is
    /// consistent and the block is mapped. Otherwise the chain is walked from
    /// the first block for as long as each next block is mapped, and every
    /// traversed block is assumed full. Returns `None` for keys without
    /// values or whose first block is not mapped.
    pub fn tail(&self, entry: &KeyEntry) -> Option<KeyTail<'a>> {
        if entry.value_count <= 0 {
            return None;
        }

        if entry.is_block_consistent() {
            if let Some(tail) = self.block(entry.last_value_block_offset) {
                if tail.is_mapped() {
                    return Some(KeyTail {
                        cursor: tail,
                        value_count: entry.value_count,
                        recomputed: false,
                    });
                }
            }
        }

        let mut cursor = self.block(entry.first_value_block_offset)?;
        if !cursor.is_mapped() {
            debug!(
                offset = entry.first_value_block_offset,
                mapped = self.value_memory_size(),
                "First value block not mapped"
            );
            return None;
        }
        let mut traversed = 1i64;
        while let Some(next) = cursor.next_offset() {
            if next <= cursor.offset() as i64 {
                break;
            }
            match self.block(next) {
                Some(block) if block.is_mapped() => {
                    cursor = block;
                    traversed += 1;
                }
                _ => break,
            }
        }
        debug!(
            value_count = entry.value_count,
            count_check = entry.count_check,
            blocks = traversed,
            "Recomputed value count from block chain"
        );
        Some(KeyTail {
            cursor,
            value_count: self.capacity as i64 * traversed,
            recomputed: true,
        })
    }

    /// Scans backward from `tail` for the rightmost value `<= max_value`.
    pub fn latest_at_or_below(&self, tail: KeyTail<'a>, max_value: i64) -> Option<i64> {
        let mask = self.capacity - 1;
        let mut remaining = tail.value_count;
        let mut cursor = tail.cursor;
        let mut cells = (((remaining - 1) as usize) & mask) + 1;
        loop {
            let slots = cursor.cells(cells)?;
            match binary_search(slots, max_value, 0, cells - 1, ScanDirection::Up) {
                Ok(i) => return Some(slots[i]),
                Err(0) => {}
                Err(i) => return Some(slots[i - 1]),
            }
            remaining -= cells as i64;
            if remaining <= 0 || !cursor.move_prev() {
                return None;
            }
            cells = self.capacity;
        }
    }

    /// Iterates the values of key `k` in ascending order, stopping early at
    /// the first block that is not mapped.
    pub fn values(&self, k: usize) -> KeyValues<'a> {
        let entry = self.key(k).unwrap_or_default();
        let cursor = if entry.value_count > 0 {
            self.block(entry.first_value_block_offset)
        } else {
            None
        };
        KeyValues {
            cursor,
            remaining: entry.value_count,
            slot: 0,
        }
    }
}

/// Where the backward scan of one key starts.
#[derive(Debug, Clone, Copy)]
pub struct KeyTail<'a> {
    /// Block holding the most recent value.
    pub cursor: BlockCursor<'a>,
    /// Values in the tail block and every block before it.
    pub value_count: i64,
    /// True when the count was recomputed from the chain.
    pub recomputed: bool,
}

/// Cursor over one value block.
#[derive(Debug, Clone, Copy)]
pub struct BlockCursor<'a> {
    values: &'a [i64],
    offset: usize,
    capacity: usize,
}

impl<'a> BlockCursor<'a> {
    /// Byte offset of the block.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Byte size of the block including its link record.
    pub fn memory_size(&self) -> usize {
        block_memory_size(self.capacity)
    }

    /// True when the whole block lies inside the mapped region.
    pub fn is_mapped(&self) -> bool {
        self.offset
            .checked_add(self.memory_size())
            .is_some_and(|end| end <= self.values.len() * 8)
    }

    fn word(&self, slot: usize) -> Option<i64> {
        if !self.is_mapped() {
            return None;
        }
        self.values.get(self.offset / 8 + slot).copied()
    }

    /// Row id in slot `i`, or `None` if `i` is past the capacity or the block
    /// is not mapped.
    pub fn get(&self, i: usize) -> Option<i64> {
        if i >= self.capacity {
            return None;
        }
        self.word(i)
    }

    /// The first `count` slots of the block.
    pub fn cells(&self, count: usize) -> Option<&'a [i64]> {
        if count > self.capacity || !self.is_mapped() {
            return None;
        }
        let start = self.offset / 8;
        self.values.get(start..start + count)
    }

    /// Byte offset of the previous block as recorded in the link.
    pub fn prev_offset(&self) -> Option<i64> {
        self.word(self.capacity)
    }

    /// Byte offset of the next block as recorded in the link; `0` marks the
    /// end of the chain.
    pub fn next_offset(&self) -> Option<i64> {
        self.word(self.capacity + 1)
    }

    /// Follows the link to the next block. Returns false, leaving the cursor
    /// in place, when the link does not point strictly forward to a mapped
    /// block.
    pub fn move_next(&mut self) -> bool {
        match self.next_offset() {
            Some(next) if next > self.offset as i64 => self.move_to(next),
            _ => false,
        }
    }

    /// Follows the link to the previous block. Returns false, leaving the
    /// cursor in place, when the link does not point strictly backward.
    pub fn move_prev(&mut self) -> bool {
        match self.prev_offset() {
            Some(prev) if prev >= 0 && prev < self.offset as i64 => self.move_to(prev),
            _ => false,
        }
    }

    fn move_to(&mut self, offset: i64) -> bool {
        let moved = BlockCursor {
            values: self.values,
            offset: offset as usize,
            capacity: self.capacity,
        };
        if offset % 8 != 0 || !moved.is_mapped() {
            return false;
        }
        *self = moved;
        true
    }
}

/// Ascending iterator over one key's row ids.
#[derive(Debug, Clone)]
pub struct KeyValues<'a> {
    cursor: Option<BlockCursor<'a>>,
    remaining: i64,
    slot: usize,
}

impl Iterator for KeyValues<'_> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        if self.remaining <= 0 {
            return None;
        }
        let cursor = self.cursor.as_mut()?;
        if self.slot == cursor.capacity {
            if !cursor.move_next() {
                self.cursor = None;
                return None;
            }
            self.slot = 0;
        }
        let value = cursor.get(self.slot);
        if value.is_none() {
            self.cursor = None;
        }
        self.slot += 1;
        self.remaining -= 1;
        value
    }
}
