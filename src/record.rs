//! Field-described record layout for the PCD binary payloads.
//!
//! A PCD header declares its columns through four parallel directives; the
//! parser zips them into one ordered list of [FieldDescriptor]s so the
//! equal-length invariant holds by construction from then on.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// One column of a tabular point record.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct FieldDescriptor {
    pub name: String,
    /// Byte size of a single element
    pub size: u32,
    /// PCD type letter: F (float), I (signed), U (unsigned)
    pub data_type: char,
    /// Number of elements in this field
    pub count: u32,
}

impl FieldDescriptor {
    pub fn new(name: &str, size: u32, data_type: char, count: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            size,
            data_type,
            count,
        }
    }

    /// Total bytes this field occupies in a record.
    pub fn byte_len(&self) -> usize {
        self.size as usize * self.count as usize
    }
}

/// Byte offsets of every field within a fixed-stride record.
#[derive(Clone, Debug)]
pub struct RecordLayout {
    offsets: Vec<usize>,
    stride: usize,
}

impl RecordLayout {
    /// Computes offsets as the running sum of `size * count` in declared order.
    pub fn new(fields: &[FieldDescriptor]) -> RecordLayout {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut stride = 0;
        for field in fields {
            offsets.push(stride);
            stride += field.byte_len();
        }
        RecordLayout { offsets, stride }
    }

    /// Bytes per record.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Byte offset of the field at `index` within a record.
    pub fn field_offset(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }
}

#[inline]
fn checked_range(buf: &[u8], offset: usize) -> Result<usize> {
    match offset.checked_add(4) {
        Some(end) if end <= buf.len() => Ok(end),
        _ => Err(Error::PayloadSizeMismatch {
            expected: offset.saturating_add(4),
            actual: buf.len(),
        }),
    }
}

/// Reads a little-endian f32 at `offset`, bounds-checked.
pub fn read_f32(buf: &[u8], offset: usize) -> Result<f32> {
    let end = checked_range(buf, offset)?;
    Ok(LittleEndian::read_f32(&buf[offset..end]))
}

/// Reads a little-endian u32 at `offset`, bounds-checked.
pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let end = checked_range(buf, offset)?;
    Ok(LittleEndian::read_u32(&buf[offset..end]))
}

/// Writes a little-endian f32 at `offset`, bounds-checked.
pub fn write_f32(buf: &mut [u8], offset: usize, value: f32) -> Result<()> {
    let end = checked_range(buf, offset)?;
    LittleEndian::write_f32(&mut buf[offset..end], value);
    Ok(())
}

/// Writes a little-endian u32 at `offset`, bounds-checked.
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let end = checked_range(buf, offset)?;
    LittleEndian::write_u32(&mut buf[offset..end], value);
    Ok(())
}
