//! SWF file header and body compression.

use std::io::{Cursor, Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder};

use crate::{
    file::{parser::Parser, writer::Writer},
    Error, Result,
};

/// Body compression selected by the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// `FWS`
    None,
    /// `CWS`, zlib
    Zlib,
    /// `ZWS`, LZMA
    Lzma,
}

impl Compression {
    /// The three signature bytes.
    #[must_use]
    pub fn signature(self) -> &'static [u8; 3] {
        match self {
            Compression::None => b"FWS",
            Compression::Zlib => b"CWS",
            Compression::Lzma => b"ZWS",
        }
    }

    fn from_signature(signature: &[u8]) -> Option<Self> {
        match signature {
            b"FWS" => Some(Compression::None),
            b"CWS" => Some(Compression::Zlib),
            b"ZWS" => Some(Compression::Lzma),
            _ => None,
        }
    }
}

/// The fields before the first tag record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Body compression
    pub compression: Compression,
    /// Format version
    pub version: u8,
    /// Uncompressed file length as declared in the input
    pub file_length: u32,
    /// Bit-packed frame RECT, kept verbatim
    pub frame_size: Vec<u8>,
    /// Frame rate, 8.8 fixed point
    pub frame_rate: u16,
    /// Number of frames
    pub frame_count: u16,
}

/// Split `data` into its header and the decompressed body that holds the frame fields
/// and tag records.
///
/// The returned buffer starts at byte 8 of the uncompressed file.
///
/// # Errors
/// - [`crate::Error::NotSupported`] for an unknown signature
/// - [`crate::Error::Corrupt`] if decompression fails
pub(crate) fn decompress(data: &[u8]) -> Result<(Compression, u8, u32, Vec<u8>)> {
    if data.len() < 8 {
        return Err(out_of_bounds_error!());
    }
    let Some(compression) = Compression::from_signature(&data[..3]) else {
        return Err(Error::NotSupported);
    };
    let version = data[3];
    let file_length = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    let body_length = (file_length as usize).saturating_sub(8);

    let body = match compression {
        Compression::None => data[8..].to_vec(),
        Compression::Zlib => {
            let mut body = Vec::with_capacity(body_length.min(64 << 20));
            ZlibDecoder::new(&data[8..])
                .read_to_end(&mut body)
                .map_err(|e| corrupt_error!("zlib body: {}", e))?;
            body
        }
        Compression::Lzma => {
            // u32 compressed length, 5 property bytes, raw stream
            if data.len() < 17 {
                return Err(out_of_bounds_error!());
            }
            let properties = &data[12..17];
            let stream = &data[17..];

            let mut lzma = Vec::with_capacity(13 + stream.len());
            lzma.extend_from_slice(properties);
            lzma.extend_from_slice(&(body_length as u64).to_le_bytes());
            lzma.extend_from_slice(stream);

            let mut body = Vec::with_capacity(body_length.min(64 << 20));
            lzma_rs::lzma_decompress(&mut Cursor::new(&lzma), &mut body)
                .map_err(|e| corrupt_error!("LZMA body: {}", e))?;
            body
        }
    };

    if body.len() != body_length {
        log::warn!(
            "Declared file length {} does not match the {} bytes present",
            file_length,
            body.len() + 8
        );
    }

    Ok((compression, version, file_length, body))
}

/// Wrap an uncompressed body (everything after byte 8) into a complete file.
///
/// # Errors
/// Returns [`crate::Error::FileError`] if the compressor fails.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn compress(compression: Compression, version: u8, body: &[u8]) -> Result<Vec<u8>> {
    let file_length = (body.len() + 8) as u32;
    let mut out = Vec::with_capacity(body.len() / 2 + 32);
    out.extend_from_slice(compression.signature());
    out.push(version);
    out.extend_from_slice(&file_length.to_le_bytes());

    match compression {
        Compression::None => out.extend_from_slice(body),
        Compression::Zlib => {
            let mut encoder = ZlibEncoder::new(out, flate2::Compression::best());
            encoder.write_all(body)?;
            out = encoder.finish()?;
        }
        Compression::Lzma => {
            let mut lzma = Vec::with_capacity(body.len() / 2 + 13);
            let options = lzma_rs::compress::Options {
                unpacked_size: lzma_rs::compress::UnpackedSize::WriteToHeader(Some(
                    body.len() as u64
                )),
            };
            lzma_rs::lzma_compress_with_options(&mut Cursor::new(body), &mut lzma, &options)?;

            // Drop the 8 byte size field; the SWF header already carries it.
            let (properties, rest) = lzma.split_at(5.min(lzma.len()));
            let stream = rest.get(8..).unwrap_or_default();
            out.extend_from_slice(&(stream.len() as u32).to_le_bytes());
            out.extend_from_slice(properties);
            out.extend_from_slice(stream);
        }
    }

    Ok(out)
}

impl Header {
    /// Read the frame fields from the start of a decompressed body.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for truncated input.
    pub(crate) fn read_frame(
        parser: &mut Parser,
        compression: Compression,
        version: u8,
        file_length: u32,
    ) -> Result<Self> {
        let bits = parser.peek_byte()? >> 3;
        let rect_length = (5 + 4 * usize::from(bits)).div_ceil(8);
        let frame_size = parser.read_bytes(rect_length)?.to_vec();

        Ok(Header {
            compression,
            version,
            file_length,
            frame_size,
            frame_rate: parser.read_le::<u16>()?,
            frame_count: parser.read_le::<u16>()?,
        })
    }

    /// Write the frame fields.
    pub(crate) fn write_frame(&self, writer: &mut Writer) {
        writer.write_bytes(&self.frame_size);
        writer.write_le(self.frame_rate);
        writer.write_le(self.frame_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_signature() {
        let data = b"XWS\x0A\x08\x00\x00\x00";
        assert!(matches!(decompress(data), Err(Error::NotSupported)));
    }

    #[test]
    fn zlib_roundtrip() {
        let body = b"body bytes body bytes body bytes".to_vec();
        let file = compress(Compression::Zlib, 10, &body).unwrap();
        assert_eq!(&file[..3], b"CWS");

        let (compression, version, length, decoded) = decompress(&file).unwrap();
        assert_eq!(compression, Compression::Zlib);
        assert_eq!(version, 10);
        assert_eq!(length as usize, body.len() + 8);
        assert_eq!(decoded, body);
    }

    #[test]
    fn rect_length_follows_bit_count() {
        // nbits = 15: 5 + 60 bits = 9 bytes
        let data = [0x78, 0, 0, 0, 0, 0, 0, 0, 0, 0x00, 0x18, 0x01, 0x00];
        let mut parser = Parser::new(&data);
        let header = Header::read_frame(&mut parser, Compression::None, 10, 0).unwrap();
        assert_eq!(header.frame_size.len(), 9);
        assert_eq!(header.frame_rate, 0x1800);
        assert_eq!(header.frame_count, 1);
    }
}
