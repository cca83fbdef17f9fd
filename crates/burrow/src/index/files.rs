//! Read-only file mappings for bitmap indexes and fixed-width columns.
//!
//! The scanners only ever see slices; this module is the thin layer that
//! turns files on disk into those slices. The mapped length is taken once at
//! open time, which is the snapshot every later bounds check is made
//! against.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use crate::error::{BurrowError, Result};
use crate::index::view::BitmapIndexView;
use crate::index::writer::{KEY_FILE_EXTENSION, VALUE_FILE_EXTENSION};
use crate::index::{KeyHeader, KEY_FILE_SIGNATURE};

/// Maps a whole file read-only. Empty files map to `None`.
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: the mapping is read-only and the files are append-only, so
    // bytes inside the mapped length are never rewritten while mapped.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(mmap))
}

/// A bitmap index mapped from its `.k` and `.v` files.
#[derive(Debug)]
pub struct MappedIndex {
    key_path: PathBuf,
    keys: Mmap,
    values: Option<Mmap>,
    block_capacity: usize,
}

impl MappedIndex {
    /// Maps `<name>.k` and `<name>.v` in `dir`. The block capacity is read
    /// from the key file header.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be mapped, the key file is
    /// shorter than its header, or the header signature or block capacity is
    /// invalid.
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let key_path = dir.join(format!("{name}.{KEY_FILE_EXTENSION}"));
        let value_path = dir.join(format!("{name}.{VALUE_FILE_EXTENSION}"));

        let keys = map_file(&key_path)?.ok_or(BurrowError::TruncatedKeyFile(0))?;
        let header = KeyHeader::read_from(&keys).ok_or(BurrowError::TruncatedKeyFile(keys.len()))?;
        if header.signature != KEY_FILE_SIGNATURE {
            warn!(
                "Rejected index file {}: signature {:#x}",
                key_path.display(),
                header.signature
            );
            return Err(BurrowError::InvalidSignature {
                expected: KEY_FILE_SIGNATURE,
                actual: header.signature,
            });
        }
        let block_capacity = usize::try_from(header.block_value_count)
            .ok()
            .filter(|c| c.is_power_of_two())
            .ok_or(BurrowError::InvalidBlockCapacity(header.block_value_count as u64))?;

        let values = map_file(&value_path)?;
        debug!(
            key_bytes = keys.len(),
            value_bytes = values.as_ref().map_or(0, |v| v.len()),
            block_capacity,
            "Mapped bitmap index {}",
            key_path.display()
        );
        Ok(Self {
            key_path,
            keys,
            values,
            block_capacity,
        })
    }

    /// Path of the key file.
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Row ids per value block, as recorded in the key file header.
    pub fn block_capacity(&self) -> usize {
        self.block_capacity
    }

    /// A view over the mapped regions.
    ///
    /// # Errors
    ///
    /// Returns an error if the mappings fail the checks of
    /// [`BitmapIndexView::new`].
    pub fn view(&self) -> Result<BitmapIndexView<'_>> {
        let values: &[u8] = self.values.as_deref().unwrap_or(&[]);
        BitmapIndexView::new(&self.keys, values, self.block_capacity)
    }
}

/// A column of 64-bit values (timestamps, row ids) mapped from a file.
#[derive(Debug)]
pub struct MappedColumn {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl MappedColumn {
    /// Maps the column file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open(path: &Path) -> Result<Self> {
        let mmap = map_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    /// Path of the column file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The column values. A trailing partial value is not visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping is not 8-byte aligned.
    pub fn as_slice(&self) -> Result<&[i64]> {
        let bytes: &[u8] = self.mmap.as_deref().unwrap_or(&[]);
        let whole_words = bytes.len() & !7;
        bytemuck::try_cast_slice(&bytes[..whole_words])
            .map_err(|e| BurrowError::MisalignedBuffer(format!("{}: {e}", self.path.display())))
    }

    /// Number of complete values in the column.
    pub fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len() / 8)
    }

    /// True when the column holds no complete value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes a column of 64-bit values in native byte order.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_column(path: &Path, values: &[i64]) -> Result<()> {
    std::fs::write(path, bytemuck::cast_slice::<i64, u8>(values))?;
    Ok(())
}
