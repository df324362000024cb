//! Little-endian primitive reader/writer shared by the build, anim and texture codecs.
//!
//! Fields are packed with no padding or alignment. Every read is bounds checked
//! and fails with [`FormatError::TruncatedInput`] instead of yielding zeroes.

use crate::error::FormatError;

pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if len > self.remaining() {
            return Err(FormatError::TruncatedInput {
                offset: self.position,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Booleans are stored as a full `u32`; any nonzero value is `true`.
    pub fn read_bool(&mut self) -> Result<bool, FormatError> {
        Ok(self.read_u32()? != 0)
    }

    /// Reads a `u32` length prefix followed by that many UTF-8 bytes.
    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let len = self.read_u32()? as usize;
        self.read_fixed_string(len)
    }

    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, FormatError> {
        let offset = self.position;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FormatError::InvalidString(offset))
    }

    /// Upper bound for preallocating `count` records of at least `record_size`
    /// bytes, so a corrupt count cannot trigger a huge allocation.
    pub fn capacity_hint(&self, count: u32, record_size: usize) -> usize {
        (count as usize).min(self.remaining() / record_size.max(1))
    }

    /// Fails if any byte is left unconsumed.
    pub fn finish(self) -> Result<(), FormatError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(FormatError::TrailingData(n)),
        }
    }
}

#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u32(u32::from(value));
    }

    /// Writes `s` as UTF-8, prefixed with its byte length unless
    /// `include_length` is false (magic headers only).
    pub fn write_string(&mut self, s: &str, include_length: bool) {
        if include_length {
            self.write_len(s.len());
        }
        self.write_bytes(s.as_bytes());
    }

    /// Collection lengths are stored as `u32`.
    ///
    /// # Panics
    ///
    /// Panics if `len` does not fit in a `u32`; no such collection can be
    /// encoded.
    pub fn write_len(&mut self, len: usize) {
        match u32::try_from(len) {
            Ok(len) => self.write_u32(len),
            Err(_) => panic!("collection of {len} items exceeds the u32 length field"),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads a fixed-length magic header and compares it against `expected`.
pub(crate) fn expect_magic(reader: &mut ByteReader, expected: &str) -> Result<(), FormatError> {
    let found = reader.read_bytes(expected.len())?;
    if found != expected.as_bytes() {
        return Err(FormatError::BadMagic {
            expected: expected.to_string(),
            found: String::from_utf8_lossy(found).into_owned(),
        });
    }
    Ok(())
}
