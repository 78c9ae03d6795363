//! Growable output buffer with the primitive writers mirroring [`crate::file::parser::Parser`].

use crate::{file::io::SwfIO, Result};

/// Smallest and largest values representable by an `s24` branch offset.
pub const S24_RANGE: std::ops::RangeInclusive<i32> = -(1 << 23)..=(1 << 23) - 1;

/// Number of bytes the variable-length encoding of `value` occupies.
#[must_use]
pub fn u32_width(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Append-only byte sink used by every encoder in the crate.
#[derive(Debug, Default, Clone)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer { data: Vec::new() }
    }

    /// Create an empty writer with `capacity` bytes reserved.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for back-patching already written fields.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the writer and return its buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    /// Write a fixed width little-endian value.
    pub fn write_le<T: SwfIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Write a fixed width big-endian value.
    pub fn write_be<T: SwfIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_be_bytes().as_ref());
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Write an AVM2 variable-length unsigned integer in its minimal form.
    pub fn write_u32(&mut self, mut value: u32) {
        loop {
            #[allow(clippy::cast_possible_truncation)]
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                self.data.push(byte);
                return;
            }
            self.data.push(byte | 0x80);
        }
    }

    /// Write an AVM2 `u30`.
    pub fn write_u30(&mut self, value: u32) {
        self.write_u32(value);
    }

    /// Write an AVM2 `s32` as the variable-length encoding of its two's complement.
    pub fn write_s32(&mut self, value: i32) {
        #[allow(clippy::cast_sign_loss)]
        self.write_u32(value as u32);
    }

    /// Write a three byte little-endian signed branch offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if `value` does not fit in 24 bits.
    pub fn write_s24(&mut self, value: i32) -> Result<()> {
        if !S24_RANGE.contains(&value) {
            return Err(corrupt_error!("Branch offset {} exceeds the s24 range", value));
        }

        let bytes = value.to_le_bytes();
        self.data.extend_from_slice(&bytes[..3]);
        Ok(())
    }

    /// Write an IEEE-754 little-endian double.
    pub fn write_d64(&mut self, value: f64) {
        self.write_le(value);
    }

    /// Write a `u30` length-prefixed UTF-8 string.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_string(&mut self, value: &str) {
        self.write_u30(value.len() as u32);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a `u30` length-prefixed string from its raw bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write_string_bytes(&mut self, value: &[u8]) {
        self.write_u30(value.len() as u32);
        self.data.extend_from_slice(value);
    }

    /// Write a NUL-terminated UTF-8 string.
    pub fn write_cstring(&mut self, value: &str) {
        self.write_cstring_bytes(value.as_bytes());
    }

    /// Write a NUL-terminated string from its raw bytes.
    pub fn write_cstring_bytes(&mut self, value: &[u8]) {
        self.data.extend_from_slice(value);
        self.data.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Parser;

    #[test]
    fn u32_minimal_encoding() {
        let mut writer = Writer::new();
        writer.write_u30(624_485);
        assert_eq!(writer.data(), &[0xE5, 0x8E, 0x26]);
        assert_eq!(u32_width(624_485), 3);
    }

    #[test]
    fn widths_match_encoding() {
        for value in [0, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, u32::MAX] {
            let mut writer = Writer::new();
            writer.write_u32(value);
            assert_eq!(writer.len(), u32_width(value), "value {value:#x}");
        }
    }

    #[test]
    fn s32_negative_reads_back() {
        let mut writer = Writer::new();
        writer.write_s32(-42);
        assert_eq!(writer.len(), 5);

        let data = writer.into_inner();
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_s32().unwrap(), -42);
    }

    #[test]
    fn s24_bounds() {
        let mut writer = Writer::new();
        writer.write_s24(-3).unwrap();
        assert_eq!(writer.data(), &[0xFD, 0xFF, 0xFF]);
        assert!(writer.write_s24(1 << 23).is_err());
        assert!(writer.write_s24(-(1 << 23)).is_ok());
    }

    #[test]
    fn strings() {
        let mut writer = Writer::new();
        writer.write_string("ab");
        writer.write_cstring("c");
        assert_eq!(writer.data(), &[0x02, b'a', b'b', b'c', 0x00]);
    }
}
