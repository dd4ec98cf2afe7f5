// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Little-endian read/write cursors for binary frames.
//!

use super::WireError;

/// Generate append methods for primitive types.
macro_rules! impl_write_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            self.buffer.extend_from_slice(&value.to_le_bytes());
        }
    };
}

/// Generate bounds-checked read methods for primitive types.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> Result<$type, WireError> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Growable writer. Appends never fail.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    impl_write_le!(write_u16_le, u16);
    impl_write_le!(write_u32_le, u32);
    impl_write_le!(write_u64_le, u64);
    impl_write_le!(write_i32_le, i32);
    impl_write_le!(write_i64_le, i64);

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_f32_le(&mut self, value: f32) {
        self.write_u32_le(value.to_bits());
    }

    pub fn write_f64_le(&mut self, value: f64) {
        self.write_u64_le(value.to_bits());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write a `u32` LE length followed by the bytes.
    pub fn write_blob(&mut self, data: &[u8]) {
        self.write_u32_le(data.len() as u32);
        self.write_bytes(data);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_blob(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

/// Immutable cursor for reading (bounds-checked, zero-copy)
pub struct WireReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_le!(read_u16_le, u16, 2);
    impl_read_le!(read_u32_le, u32, 4);
    impl_read_le!(read_u64_le, u64, 8);
    impl_read_le!(read_i32_le, i32, 4);
    impl_read_le!(read_i64_le, i64, 8);

    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_f32_le(&mut self) -> Result<f32, WireError> {
        Ok(f32::from_bits(self.read_u32_le()?))
    }

    pub fn read_f64_le(&mut self) -> Result<f64, WireError> {
        Ok(f64::from_bits(self.read_u64_le()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::Truncated {
                offset: self.offset,
                needed: len,
            });
        }
        let out = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    /// Read a `u32` LE length followed by that many bytes.
    pub fn read_blob(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u32_le()? as usize;
        self.read_bytes(len)
    }

    pub fn read_string(&mut self, what: &'static str) -> Result<String, WireError> {
        let bytes = self.read_blob()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| WireError::InvalidUtf8(what))
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buffer[self.offset..];
        self.offset = self.buffer.len();
        out
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_little_endian_layout() {
        let mut w = WireWriter::new();
        w.write_u32_le(0x0403_0201);
        w.write_str("ab");
        assert_eq!(w.as_slice(), &[1, 2, 3, 4, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_reader_bounds() {
        let data = [5u8, 0, 0, 0, b'x'];
        let mut r = WireReader::new(&data);
        let err = r.read_blob().unwrap_err();
        assert_eq!(
            err,
            WireError::Truncated {
                offset: 4,
                needed: 5
            }
        );
    }

    #[test]
    fn test_reader_primitives() {
        let mut w = WireWriter::new();
        w.write_i32_le(-7);
        w.write_f64_le(1.5);
        w.write_u8(9);
        let bytes = w.into_inner();

        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_i32_le().unwrap(), -7);
        assert_eq!(r.read_f64_le().unwrap(), 1.5);
        assert_eq!(r.read_u8().unwrap(), 9);
        assert!(r.is_exhausted());
    }

    #[test]
    fn test_invalid_utf8() {
        let data = [1u8, 0, 0, 0, 0xff];
        let mut r = WireReader::new(&data);
        assert_eq!(
            r.read_string("topic").unwrap_err(),
            WireError::InvalidUtf8("topic")
        );
    }
}
