//! Bitmap index storage layout.
//!
//! A bitmap index maps every key (a symbol code, or any small non-negative
//! integer) to the ascending list of local row ids where it occurs. It is
//! stored in two regions:
//!
//! ## Key region (`.k`)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Header (64 bytes)                                           │
//! │  - Signature: u8 = 0xfa                                      │
//! │  - Sequence: i64                                             │
//! │  - Value region size: i64                                    │
//! │  - Block value count: i32                                    │
//! │  - Key count: i64                                            │
//! │  - Sequence check: i64                                       │
//! │  - Reserved: 27 bytes                                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Key entries (32 bytes each, key k at 64 + 32 * k)           │
//! │  - Value count: i64                                          │
//! │  - First value block offset: i64                             │
//! │  - Last value block offset: i64                              │
//! │  - Count check: i64                                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Value region (`.v`)
//!
//! A sequence of fixed-size blocks, each `capacity` row ids followed by the
//! byte offsets of the previous and next block of the same key. A key's first
//! block records `-1` as its previous offset and its last block records `0`
//! as its next offset. The block capacity is a power of two. Blocks are only
//! ever appended.
//!
//! The writer updates a key entry's value count first and its count check
//! last, so a reader seeing the two differ knows the entry is mid-update.
//!
//! ## Byte order
//!
//! Key region fields are little-endian and decoded field by field. The value
//! region, like the `i64` columns of [`files`], is an array of native-endian
//! words that readers cast in place, so value and column files are only
//! readable on a machine with the byte order that wrote them.

pub mod files;
pub mod view;
pub mod writer;

pub use files::{MappedColumn, MappedIndex};
pub use view::{BitmapIndexView, BlockCursor, KeyTail};
pub use writer::{BitmapIndexWriter, IndexWriterConfig};

/// First byte of every key region.
pub const KEY_FILE_SIGNATURE: u8 = 0xfa;

/// Size of the key region header in bytes.
pub const KEY_HEADER_SIZE: usize = 64;

/// Size of one key entry in bytes.
pub const KEY_ENTRY_SIZE: usize = 32;

/// Size of the block link record (previous + next offsets) in bytes.
pub const BLOCK_LINK_SIZE: usize = 16;

pub(crate) const HEADER_OFFSET_SIGNATURE: usize = 0;
pub(crate) const HEADER_OFFSET_SEQUENCE: usize = 1;
pub(crate) const HEADER_OFFSET_VALUE_MEM_SIZE: usize = 9;
pub(crate) const HEADER_OFFSET_BLOCK_VALUE_COUNT: usize = 17;
pub(crate) const HEADER_OFFSET_KEY_COUNT: usize = 21;
pub(crate) const HEADER_OFFSET_SEQUENCE_CHECK: usize = 29;

const ENTRY_OFFSET_VALUE_COUNT: usize = 0;
const ENTRY_OFFSET_FIRST_BLOCK: usize = 8;
const ENTRY_OFFSET_LAST_BLOCK: usize = 16;
const ENTRY_OFFSET_COUNT_CHECK: usize = 24;

/// Byte size of a value block holding `capacity` row ids.
pub fn block_memory_size(capacity: usize) -> usize {
    capacity * 8 + BLOCK_LINK_SIZE
}

/// Byte offset of key `k`'s entry in the key region.
pub fn key_entry_offset(key: usize) -> usize {
    KEY_HEADER_SIZE + key * KEY_ENTRY_SIZE
}

pub(crate) fn read_i64(mem: &[u8], offset: usize) -> Option<i64> {
    let bytes = mem.get(offset..offset.checked_add(8)?)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(i64::from_le_bytes(buf))
}

pub(crate) fn read_i32(mem: &[u8], offset: usize) -> Option<i32> {
    let bytes = mem.get(offset..offset.checked_add(4)?)?;
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    Some(i32::from_le_bytes(buf))
}

pub(crate) fn write_i64(mem: &mut [u8], offset: usize, value: i64) {
    mem[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn write_i32(mem: &mut [u8], offset: usize, value: i32) {
    mem[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Key region header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHeader {
    /// Signature byte, [`KEY_FILE_SIGNATURE`] for a valid region.
    pub signature: u8,
    /// Writer sequence, bumped before every header update.
    pub sequence: i64,
    /// Size of the value region the writer has published.
    pub value_mem_size: i64,
    /// Row ids per value block.
    pub block_value_count: i32,
    /// Number of keys the writer has published.
    pub key_count: i64,
    /// Copy of `sequence`, written after the header update completes.
    pub sequence_check: i64,
}

impl KeyHeader {
    /// Reads the header from the start of a key region.
    ///
    /// Returns `None` if the region is shorter than [`KEY_HEADER_SIZE`].
    pub fn read_from(mem: &[u8]) -> Option<Self> {
        if mem.len() < KEY_HEADER_SIZE {
            return None;
        }
        Some(Self {
            signature: mem[HEADER_OFFSET_SIGNATURE],
            sequence: read_i64(mem, HEADER_OFFSET_SEQUENCE)?,
            value_mem_size: read_i64(mem, HEADER_OFFSET_VALUE_MEM_SIZE)?,
            block_value_count: read_i32(mem, HEADER_OFFSET_BLOCK_VALUE_COUNT)?,
            key_count: read_i64(mem, HEADER_OFFSET_KEY_COUNT)?,
            sequence_check: read_i64(mem, HEADER_OFFSET_SEQUENCE_CHECK)?,
        })
    }

    /// Writes the header into the first [`KEY_HEADER_SIZE`] bytes of `mem`.
    ///
    /// # Panics
    ///
    /// Panics if `mem` is shorter than the header.
    pub fn write_to(&self, mem: &mut [u8]) {
        mem[..KEY_HEADER_SIZE].fill(0);
        mem[HEADER_OFFSET_SIGNATURE] = self.signature;
        write_i64(mem, HEADER_OFFSET_SEQUENCE, self.sequence);
        write_i64(mem, HEADER_OFFSET_VALUE_MEM_SIZE, self.value_mem_size);
        write_i32(mem, HEADER_OFFSET_BLOCK_VALUE_COUNT, self.block_value_count);
        write_i64(mem, HEADER_OFFSET_KEY_COUNT, self.key_count);
        write_i64(mem, HEADER_OFFSET_SEQUENCE_CHECK, self.sequence_check);
    }

    /// True when no header update was in flight when the header was read.
    pub fn is_consistent(&self) -> bool {
        self.sequence == self.sequence_check
    }
}

/// Metadata of one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyEntry {
    /// Row ids recorded for the key.
    pub value_count: i64,
    /// Byte offset of the key's first value block.
    pub first_value_block_offset: i64,
    /// Byte offset of the key's last value block.
    pub last_value_block_offset: i64,
    /// Copy of `value_count`, written after the entry update completes.
    pub count_check: i64,
}

impl KeyEntry {
    /// Reads the entry of `key`, or `None` if it lies past the region end.
    pub fn read_from(mem: &[u8], key: usize) -> Option<Self> {
        let base = key_entry_offset(key);
        Some(Self {
            value_count: read_i64(mem, base + ENTRY_OFFSET_VALUE_COUNT)?,
            first_value_block_offset: read_i64(mem, base + ENTRY_OFFSET_FIRST_BLOCK)?,
            last_value_block_offset: read_i64(mem, base + ENTRY_OFFSET_LAST_BLOCK)?,
            count_check: read_i64(mem, base + ENTRY_OFFSET_COUNT_CHECK)?,
        })
    }

    /// Writes the entry of `key`.
    ///
    /// # Panics
    ///
    /// Panics if the entry lies past the end of `mem`.
    pub fn write_to(&self, mem: &mut [u8], key: usize) {
        let base = key_entry_offset(key);
        write_i64(mem, base + ENTRY_OFFSET_VALUE_COUNT, self.value_count);
        write_i64(mem, base + ENTRY_OFFSET_FIRST_BLOCK, self.first_value_block_offset);
        write_i64(mem, base + ENTRY_OFFSET_LAST_BLOCK, self.last_value_block_offset);
        write_i64(mem, base + ENTRY_OFFSET_COUNT_CHECK, self.count_check);
    }

    /// False while the writer is mid-update; the last block offset may then
    /// be stale.
    pub fn is_block_consistent(&self) -> bool {
        self.value_count == self.count_check
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = KeyHeader {
            signature: KEY_FILE_SIGNATURE,
            sequence: 7,
            value_mem_size: 4096,
            block_value_count: 64,
            key_count: 12,
            sequence_check: 7,
        };
        let mut mem = vec![0xffu8; KEY_HEADER_SIZE];
        header.write_to(&mut mem);
        assert_eq!(KeyHeader::read_from(&mem), Some(header));
        assert!(header.is_consistent());
        assert_eq!(KeyHeader::read_from(&mem[..KEY_HEADER_SIZE - 1]), None);
    }

    #[test]
    fn test_entry_read_past_end() {
        let mut mem = vec![0u8; key_entry_offset(2)];
        let entry = KeyEntry {
            value_count: 3,
            first_value_block_offset: 0,
            last_value_block_offset: 0,
            count_check: 2,
        };
        entry.write_to(&mut mem, 1);
        assert_eq!(KeyEntry::read_from(&mem, 1), Some(entry));
        assert!(!entry.is_block_consistent());
        assert_eq!(KeyEntry::read_from(&mem, 2), None);
    }

    #[test]
    fn test_read_i64_overflowing_offset() {
        let mem = [0u8; 16];
        assert_eq!(read_i64(&mem, usize::MAX - 2), None);
        assert_eq!(read_i64(&mem, 9), None);
        assert_eq!(read_i64(&mem, 8), Some(0));
    }
}
