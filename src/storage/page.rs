//! Page index files.
//!
//! Every flush appends one page per column to the column's record stream
//! and one entry to its page index:
//!
//! ```text
//! ┌──────────────┬──────────────┐
//! │ offset: i64  │ length: i64  │   16 bytes, little-endian
//! └──────────────┴──────────────┘
//! ```

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, StorageError};

/// Size of one page index entry in bytes.
pub const PAGE_ENTRY_SIZE: usize = 16;

/// Location of one page in a record stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageEntry {
    /// Byte offset of the page.
    pub offset: u64,
    /// Byte length of the page.
    pub length: u64,
}

impl PageEntry {
    /// Appends this entry's encoding.
    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_i64::<LittleEndian>(self.offset as i64)?;
        out.write_i64::<LittleEndian>(self.length as i64)?;
        Ok(())
    }

    /// Slices this page out of `stream`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the page runs past the stream.
    pub fn slice<'a>(&self, stream: &'a [u8]) -> Result<&'a [u8]> {
        let range = usize::try_from(self.offset)
            .ok()
            .zip(usize::try_from(self.length).ok())
            .and_then(|(start, len)| Some(start..start.checked_add(len)?))
            .filter(|range| range.end <= stream.len())
            .ok_or_else(|| {
                StorageError::corrupted(format!(
                    "page at {} (+{}) past stream end {}",
                    self.offset,
                    self.length,
                    stream.len()
                ))
            })?;
        Ok(&stream[range])
    }
}

/// Parses every entry of a page index file.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` for a partial entry or a negative
/// field.
pub fn read_page_index(bytes: &[u8]) -> Result<Vec<PageEntry>> {
    if bytes.len() % PAGE_ENTRY_SIZE != 0 {
        return Err(StorageError::corrupted(format!(
            "page index length {} is not a multiple of {}",
            bytes.len(),
            PAGE_ENTRY_SIZE
        ))
        .into());
    }

    let mut cursor = bytes;
    let mut entries = Vec::with_capacity(bytes.len() / PAGE_ENTRY_SIZE);
    while !cursor.is_empty() {
        let offset = cursor.read_i64::<LittleEndian>()?;
        let length = cursor.read_i64::<LittleEndian>()?;
        if offset < 0 || length < 0 {
            return Err(StorageError::corrupted(format!(
                "page index entry {} is negative",
                entries.len()
            ))
            .into());
        }
        entries.push(PageEntry {
            offset: offset as u64,
            length: length as u64,
        });
    }
    Ok(entries)
}
