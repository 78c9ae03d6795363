//! Cursor over a byte slice with the primitive readers used by the SWF and ABC decoders.
//!
//! The [`Parser`] tracks a position inside an immutable buffer and offers bounds checked
//! reads of fixed width values ([`Parser::read_le`]), the AVM2 variable-length integers
//! ([`Parser::read_u30`], [`Parser::read_s32`]), branch offsets ([`Parser::read_s24`])
//! and both string layouts (length-prefixed UTF-8 inside ABC, NUL-terminated inside SWF
//! tags).
//!
//! # Examples
//!
//! ```rust
//! use swfscope::Parser;
//!
//! let data = [0x81, 0x01, 0x03, b'a', b'b', b'c'];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_u30()?, 129);
//! assert_eq!(parser.read_string()?, "abc");
//! assert!(!parser.has_more_data());
//! # Ok::<(), swfscope::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, read_le_at, SwfIO},
    Result,
};

/// A generic parser for SWF and ABC byte streams.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if there is more data to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left after the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Move to a specific position in the data.
    ///
    /// Seeking to `len()` is allowed and leaves the parser exhausted.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Advance the position by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        let end = self
            .position
            .checked_add(step)
            .ok_or(out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = end;
        Ok(())
    }

    /// Get the current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Get access to the underlying data.
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Peek at the next byte without advancing.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the parser is exhausted.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Run `f` and restore the position if it fails.
    ///
    /// # Errors
    /// Returns whatever error `f` returns.
    pub fn transactional<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let saved_position = self.position;
        let result = f(self);
        if result.is_err() {
            self.position = saved_position;
        }

        result
    }

    /// Read a fixed width little-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
    pub fn read_le<T: SwfIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a fixed width big-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
    pub fn read_be<T: SwfIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Read `length` raw bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if there are not enough bytes left.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(length)
            .ok_or(out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read an AVM2 variable-length unsigned 32-bit integer.
    ///
    /// Seven bits per byte, least significant group first, high bit as continuation.
    /// At most five bytes are consumed; bits past the 32nd are discarded.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value is truncated.
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let byte = self.read_le::<u8>()?;
            value |= u32::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
        }

        Ok(value)
    }

    /// Read an AVM2 `u30`.
    ///
    /// The wire format is identical to [`Parser::read_u32`]; the upper two bits of a
    /// well-formed `u30` are always zero, but they are kept as read so that re-encoding
    /// stays lossless.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value is truncated.
    pub fn read_u30(&mut self) -> Result<u32> {
        self.read_u32()
    }

    /// Read an AVM2 `s32`, stored as the two's complement of its `u32` encoding.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value is truncated.
    pub fn read_s32(&mut self) -> Result<i32> {
        #[allow(clippy::cast_possible_wrap)]
        Ok(self.read_u32()? as i32)
    }

    /// Read a three byte little-endian signed branch offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than three bytes remain.
    pub fn read_s24(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(3)?;
        let raw = u32::from(bytes[0]) | (u32::from(bytes[1]) << 8) | (u32::from(bytes[2]) << 16);

        #[allow(clippy::cast_possible_wrap)]
        Ok(((raw << 8) as i32) >> 8)
    }

    /// Read an IEEE-754 little-endian double.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than eight bytes remain.
    pub fn read_d64(&mut self) -> Result<f64> {
        self.read_le::<f64>()
    }

    /// Read the bytes of a `u30` length-prefixed string without decoding them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated.
    pub fn read_string_bytes(&mut self) -> Result<&'a [u8]> {
        let length = self.read_u30()? as usize;
        self.read_bytes(length)
    }

    /// Read a `u30` length-prefixed UTF-8 string as stored in the ABC string pool.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the string is truncated and
    /// [`crate::Error::Corrupt`] if it is not valid UTF-8.
    pub fn read_string(&mut self) -> Result<String> {
        let start = self.position;
        let bytes = self.read_string_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|error| {
                corrupt_error!("Invalid UTF-8 string at offset {} - {}", start, error)
            })
    }

    /// Read the bytes of a NUL-terminated string, terminator excluded.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if no terminator is found.
    pub fn read_cstring_bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.position;
        let Some(length) = self.data[start..].iter().position(|&byte| byte == 0) else {
            return Err(corrupt_error!(
                "Unterminated string starting at offset {}",
                start
            ));
        };

        self.position = start + length + 1;
        Ok(&self.data[start..start + length])
    }

    /// Read a NUL-terminated UTF-8 string as used by SWF tags.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if no terminator is found or the bytes are not
    /// valid UTF-8.
    pub fn read_cstring(&mut self) -> Result<String> {
        let start = self.position;
        let bytes = self.read_cstring_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|error| {
                corrupt_error!("Invalid UTF-8 string at offset {} - {}", start, error)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn read_u30_single_byte() {
        let data = [0x7F];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_u30().unwrap(), 0x7F);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn read_u30_multi_byte() {
        let data = [0xE5, 0x8E, 0x26];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_u30().unwrap(), 624_485);
    }

    #[test]
    fn read_u32_five_bytes() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_u32().unwrap(), u32::MAX);
        assert_eq!(parser.pos(), 5);
    }

    #[test]
    fn read_s32_negative() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_s32().unwrap(), -1);
    }

    #[test]
    fn read_u30_truncated() {
        let data = [0x80, 0x80];
        let mut parser = Parser::new(&data);
        assert!(matches!(parser.read_u30(), Err(Error::OutOfBounds)));
    }

    #[test]
    fn read_s24_signs() {
        let data = [0xFE, 0xFF, 0xFF, 0x10, 0x00, 0x00];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_s24().unwrap(), -2);
        assert_eq!(parser.read_s24().unwrap(), 16);
    }

    #[test]
    fn read_strings() {
        let data = [0x02, b'o', b'k', b'n', b'a', b'm', b'e', 0x00, 0xFF];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_string().unwrap(), "ok");
        assert_eq!(parser.read_cstring().unwrap(), "name");
        assert_eq!(parser.remaining(), 1);
        assert!(parser.read_cstring().is_err());
    }

    #[test]
    fn invalid_utf8_keeps_raw_bytes() {
        let data = [0x02, 0xFF, b'A', 0xC3, 0x00];
        let mut parser = Parser::new(&data);
        assert!(parser.read_string().unwrap_err().is_corrupt());

        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_string_bytes().unwrap(), &[0xFF, b'A']);
        assert_eq!(parser.read_cstring_bytes().unwrap(), &[0xC3]);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn transactional_restores() {
        let data = [0x01, 0x02];
        let mut parser = Parser::new(&data);
        let result: Result<u32> = parser.transactional(|p| {
            p.read_le::<u8>()?;
            p.read_le::<u32>()
        });
        assert!(result.is_err());
        assert_eq!(parser.pos(), 0);
    }
}
