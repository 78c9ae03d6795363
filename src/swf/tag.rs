//! Tag records.
//!
//! A record header is one `u16` holding the code in the upper ten bits and a short
//! length in the lower six. A short length of `0x3F` announces a `u32` length. Tags with
//! no counterpart in this crate are carried as raw bytes, and so is a `SymbolClass`
//! record whose names are not valid UTF-8.

use std::borrow::Cow;

use crate::{
    abc::AbcFile,
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Tag code of the end marker.
pub const END: u16 = 0;
/// Tag code of `DoABC` without flags or name.
pub const DO_ABC1: u16 = 72;
/// Tag code of `SymbolClass`.
pub const SYMBOL_CLASS: u16 = 76;
/// Tag code of `DoABC`.
pub const DO_ABC: u16 = 82;

const SHORT_LENGTH_LIMIT: usize = 0x3F;

/// A `DoABC` or `DoABC1` payload.
#[derive(Debug, Clone)]
pub struct DoAbc {
    /// Loading flags, 0 for `DoABC1`
    pub flags: u32,
    /// Unit name bytes as stored, empty for `DoABC1`
    pub name: Vec<u8>,
    /// The decoded unit
    pub abc: AbcFile,
}

impl DoAbc {
    /// Unit name, lossily decoded.
    #[must_use]
    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }
}

/// Payload of one record.
#[derive(Debug, Clone)]
pub enum TagBody {
    /// End of the tag stream
    End,
    /// An ABC unit
    DoAbc(Box<DoAbc>),
    /// Character id to class name bindings
    SymbolClass(Vec<(u16, String)>),
    /// Anything else, verbatim
    Raw(Vec<u8>),
}

/// One record of the tag stream.
#[derive(Debug, Clone)]
pub struct Tag {
    /// Tag code
    pub code: u16,
    /// The input used the long length form
    pub long_header: bool,
    /// Decoded payload
    pub body: TagBody,
}

impl Tag {
    /// Decode one record.
    ///
    /// # Errors
    /// Returns [`crate::Error::Corrupt`] if a decoded payload does not span its declared
    /// length and [`crate::Error::OutOfBounds`] for truncated input.
    pub fn read(parser: &mut Parser) -> Result<Self> {
        let code_and_length = parser.read_le::<u16>()?;
        let code = code_and_length >> 6;
        let mut length = usize::from(code_and_length & 0x3F);
        let long_header = length == SHORT_LENGTH_LIMIT;
        if long_header {
            length = parser.read_le::<u32>()? as usize;
        }

        let data = parser.read_bytes(length)?;
        let body = match code {
            END => TagBody::End,
            DO_ABC => {
                let mut payload = Parser::new(data);
                let flags = payload.read_le::<u32>()?;
                let name = payload.read_cstring_bytes()?.to_vec();
                let abc = AbcFile::from_bytes(&data[payload.pos()..])?;
                TagBody::DoAbc(Box::new(DoAbc { flags, name, abc }))
            }
            DO_ABC1 => TagBody::DoAbc(Box::new(DoAbc {
                flags: 0,
                name: Vec::new(),
                abc: AbcFile::from_bytes(data)?,
            })),
            SYMBOL_CLASS => match Self::read_symbols(data)? {
                Some(symbols) => TagBody::SymbolClass(symbols),
                None => {
                    log::debug!("SymbolClass with non UTF-8 names kept verbatim");
                    TagBody::Raw(data.to_vec())
                }
            },
            _ => TagBody::Raw(data.to_vec()),
        };

        Ok(Tag {
            code,
            long_header,
            body,
        })
    }

    fn read_symbols(data: &[u8]) -> Result<Option<Vec<(u16, String)>>> {
        let mut parser = Parser::new(data);
        let count = parser.read_le::<u16>()?;
        let mut symbols = Vec::with_capacity(usize::from(count));
        let mut valid = true;
        for _ in 0..count {
            let id = parser.read_le::<u16>()?;
            match std::str::from_utf8(parser.read_cstring_bytes()?) {
                Ok(name) => symbols.push((id, name.to_string())),
                Err(_) => valid = false,
            }
        }
        if parser.has_more_data() {
            return Err(corrupt_error!(
                "{} trailing bytes in SymbolClass",
                parser.remaining()
            ));
        }
        Ok(valid.then_some(symbols))
    }

    /// Encoded payload without the record header.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        match &self.body {
            TagBody::End => Vec::new(),
            TagBody::DoAbc(tag) => {
                let mut writer = Writer::new();
                if self.code != DO_ABC1 {
                    writer.write_le(tag.flags);
                    writer.write_cstring_bytes(&tag.name);
                }
                tag.abc.write(&mut writer);
                writer.into_inner()
            }
            TagBody::SymbolClass(symbols) => {
                let mut writer = Writer::new();
                writer.write_le(symbols.len() as u16);
                for (id, name) in symbols {
                    writer.write_le(*id);
                    writer.write_cstring(name);
                }
                writer.into_inner()
            }
            TagBody::Raw(data) => data.clone(),
        }
    }

    /// Encode the record.
    ///
    /// The long length form is used when the input used it or the payload needs it.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, writer: &mut Writer) {
        let payload = self.payload();
        if self.long_header || payload.len() >= SHORT_LENGTH_LIMIT {
            writer.write_le((self.code << 6) | SHORT_LENGTH_LIMIT as u16);
            writer.write_le(payload.len() as u32);
        } else {
            writer.write_le((self.code << 6) | payload.len() as u16);
        }
        writer.write_bytes(&payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8]) -> Vec<u8> {
        let tag = Tag::read(&mut Parser::new(data)).unwrap();
        let mut writer = Writer::new();
        tag.write(&mut writer);
        writer.into_inner()
    }

    #[test]
    fn short_raw_tag() {
        // SetBackgroundColor (9), 3 bytes
        let data = [0x43, 0x02, 0xFF, 0x00, 0x00];
        let tag = Tag::read(&mut Parser::new(&data)).unwrap();
        assert_eq!(tag.code, 9);
        assert!(!tag.long_header);
        assert!(matches!(&tag.body, TagBody::Raw(bytes) if bytes.len() == 3));
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn long_form_is_kept() {
        // ShowFrame (1) in the long form with an empty payload
        let data = [0x7F, 0x00, 0x00, 0x00, 0x00, 0x00];
        let tag = Tag::read(&mut Parser::new(&data)).unwrap();
        assert!(tag.long_header);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn symbol_class() {
        let mut data = vec![0x00, 0x00];
        let payload = [0x01, 0x00, 0x00, 0x00, b'M', b'a', b'i', b'n', 0x00];
        let header = (SYMBOL_CLASS << 6) | payload.len() as u16;
        data[..2].copy_from_slice(&header.to_le_bytes());
        data.extend_from_slice(&payload);

        let tag = Tag::read(&mut Parser::new(&data)).unwrap();
        match &tag.body {
            TagBody::SymbolClass(symbols) => assert_eq!(symbols, &[(0, "Main".to_string())]),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn symbol_class_with_invalid_names_is_raw() {
        let payload = [0x01, 0x00, 0x02, 0x00, 0xFF, b'X', 0x00];
        let mut data = ((SYMBOL_CLASS << 6) | payload.len() as u16)
            .to_le_bytes()
            .to_vec();
        data.extend_from_slice(&payload);

        let tag = Tag::read(&mut Parser::new(&data)).unwrap();
        assert!(matches!(&tag.body, TagBody::Raw(bytes) if bytes[..] == payload));
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn do_abc_name_bytes_are_kept() {
        let mut payload = vec![0x01, 0x00, 0x00, 0x00, 0xFE, b'n', 0x00];
        payload.extend(AbcFile::new().to_bytes());
        let mut data = ((DO_ABC << 6) | 0x3F).to_le_bytes().to_vec();
        data.extend((payload.len() as u32).to_le_bytes());
        data.extend_from_slice(&payload);

        let tag = Tag::read(&mut Parser::new(&data)).unwrap();
        match &tag.body {
            TagBody::DoAbc(unit) => assert_eq!(unit.name(), "\u{FFFD}n"),
            other => panic!("unexpected body {:?}", other),
        }
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn symbol_class_trailing_bytes() {
        let payload = [0x00, 0x00, 0xAA];
        let mut data = ((SYMBOL_CLASS << 6) | 3).to_le_bytes().to_vec();
        data.extend_from_slice(&payload);
        let error = Tag::read(&mut Parser::new(&data)).unwrap_err();
        assert!(error.is_corrupt());
    }

    #[test]
    fn declared_length_past_end() {
        let data = [0x45, 0x00, 0x01];
        assert!(Tag::read(&mut Parser::new(&data)).is_err());
    }
}
