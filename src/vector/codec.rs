//! Vector byte stream encoding.

use std::io::Write;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, StorageError};

use super::SparseVector;

/// Bytes used by one component on disk (u32 index + f32 weight).
pub const COMPONENT_SIZE: usize = 4 + 4;

/// Writes the vector's indices then weights; returns bytes written.
pub fn write_vector<W: Write>(vector: &SparseVector, out: &mut W) -> Result<u64> {
    for &index in vector.indices() {
        out.write_u32::<LittleEndian>(index)?;
    }
    for &value in vector.values() {
        out.write_f32::<LittleEndian>(value)?;
    }
    Ok((vector.component_count() * COMPONENT_SIZE) as u64)
}

/// Reads a vector of `component_count` components at `offset` in `stream`.
///
/// # Errors
///
/// Returns `StorageError::Corrupted` if the range runs past the stream,
/// an index is out of range for `width`, or indices are not strictly
/// increasing.
pub fn read_vector(
    stream: &[u8],
    offset: u64,
    component_count: usize,
    width: u32,
) -> Result<SparseVector> {
    let start = usize::try_from(offset)
        .map_err(|_| StorageError::corrupted(format!("vector offset {} overflows", offset)))?;
    let len = component_count * COMPONENT_SIZE;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= stream.len())
        .ok_or_else(|| {
            StorageError::corrupted(format!(
                "vector at {} with {} components exceeds stream length {}",
                offset,
                component_count,
                stream.len()
            ))
        })?;

    let mut cursor = &stream[start..end];
    let mut indices = Vec::with_capacity(component_count);
    for _ in 0..component_count {
        let index = cursor.read_u32::<LittleEndian>()?;
        if index >= width {
            return Err(StorageError::corrupted(format!(
                "vector at {} has component {} outside width {}",
                offset, index, width
            ))
            .into());
        }
        if indices.last().is_some_and(|&prev| prev >= index) {
            return Err(StorageError::corrupted(format!(
                "vector at {} has unordered component indices",
                offset
            ))
            .into());
        }
        indices.push(index);
    }

    let mut values = Vec::with_capacity(component_count);
    for _ in 0..component_count {
        values.push(cursor.read_f32::<LittleEndian>()?);
    }

    Ok(SparseVector::from_sorted_parts(width, indices, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_at_offset() {
        let first = SparseVector::new(16, [(1, 0.5)]).unwrap();
        let second = SparseVector::new(16, [(2, 1.0), (9, -3.25)]).unwrap();

        let mut stream = Vec::new();
        write_vector(&first, &mut stream).unwrap();
        let offset = stream.len() as u64;
        let written = write_vector(&second, &mut stream).unwrap();
        assert_eq!(written, 16);

        let restored = read_vector(&stream, offset, 2, 16).unwrap();
        assert_eq!(restored.indices(), second.indices());
        assert_eq!(restored.values(), second.values());
    }

    #[test]
    fn test_read_past_end_is_corruption() {
        let v = SparseVector::new(16, [(1, 0.5)]).unwrap();
        let mut stream = Vec::new();
        write_vector(&v, &mut stream).unwrap();

        let err = read_vector(&stream, 0, 2, 16).unwrap_err();
        assert!(err.is_corrupted());

        let err = read_vector(&stream, 100, 1, 16).unwrap_err();
        assert!(err.is_corrupted());
    }

    #[test]
    fn test_read_rejects_out_of_width_index() {
        let v = SparseVector::new(64, [(40, 1.0)]).unwrap();
        let mut stream = Vec::new();
        write_vector(&v, &mut stream).unwrap();

        let err = read_vector(&stream, 0, 1, 32).unwrap_err();
        assert!(err.is_corrupted());
    }
}
