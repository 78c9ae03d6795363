//! The SWF container: header, compression and the tag stream.
//!
//! Only the records this crate works on are decoded: `DoABC`/`DoABC1` carry an
//! [`crate::abc::AbcFile`], `SymbolClass` carries its bindings. Every other record is kept
//! verbatim, so a file with untouched units re-encodes to the same uncompressed body.
//!
//! # Examples
//!
//! ```rust,no_run
//! use swfscope::SwfFile;
//! use std::path::Path;
//!
//! let swf = SwfFile::from_file(Path::new("client.swf"))?;
//! println!("version {}, {} units", swf.header.version, swf.abc_files().count());
//! let bytes = swf.to_bytes()?;
//! # Ok::<(), swfscope::Error>(())
//! ```

mod header;
mod tag;

pub use header::{Compression, Header};
pub use tag::{DoAbc, Tag, TagBody, DO_ABC, DO_ABC1, END, SYMBOL_CLASS};

use std::path::Path;

use crate::{
    abc::AbcFile,
    file::{parser::Parser, writer::Writer, File},
    Result,
};

/// A decoded SWF file.
#[derive(Debug, Clone)]
pub struct SwfFile {
    /// Header and frame fields
    pub header: Header,
    /// Tag records up to and including `End`
    pub tags: Vec<Tag>,
    trailing: Vec<u8>,
}

impl SwfFile {
    /// Load and decode a file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, otherwise see
    /// [`SwfFile::from_bytes`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::from_file(path)?;
        Self::from_bytes(file.data())
    }

    /// Decode an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer, otherwise see
    /// [`SwfFile::from_bytes`].
    pub fn from_mem(data: Vec<u8>) -> Result<Self> {
        let file = File::from_mem(data)?;
        Self::from_bytes(file.data())
    }

    /// Decode a complete file.
    ///
    /// # Errors
    /// - [`crate::Error::NotSupported`] for an unknown signature
    /// - [`crate::Error::Corrupt`] for damaged compression or a damaged record
    /// - [`crate::Error::OutOfBounds`] for truncated input
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (compression, version, file_length, body) = header::decompress(data)?;

        let mut parser = Parser::new(&body);
        let header = Header::read_frame(&mut parser, compression, version, file_length)?;

        let mut tags = Vec::new();
        while parser.has_more_data() {
            let tag = Tag::read(&mut parser)?;
            let is_end = tag.code == END;
            tags.push(tag);
            if is_end {
                break;
            }
        }
        let trailing = body[parser.pos()..].to_vec();

        log::debug!(
            "Decoded {:?} SWF v{} with {} tags",
            compression,
            version,
            tags.len()
        );

        Ok(SwfFile {
            header,
            tags,
            trailing,
        })
    }

    /// Encode the file, compressed as selected by `header.compression`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the compressor fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(self.tags.len() * 32);
        self.header.write_frame(&mut writer);
        for tag in &self.tags {
            tag.write(&mut writer);
        }
        writer.write_bytes(&self.trailing);

        header::compress(self.header.compression, self.header.version, writer.data())
    }

    /// Encode the file and write it to `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] on I/O failure.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    /// ABC units in tag order.
    pub fn abc_files(&self) -> impl Iterator<Item = &AbcFile> {
        self.tags.iter().filter_map(|tag| match &tag.body {
            TagBody::DoAbc(do_abc) => Some(&do_abc.abc),
            _ => None,
        })
    }

    /// Mutable ABC units in tag order.
    pub fn abc_files_mut(&mut self) -> impl Iterator<Item = &mut AbcFile> {
        self.tags.iter_mut().filter_map(|tag| match &mut tag.body {
            TagBody::DoAbc(do_abc) => Some(&mut do_abc.abc),
            _ => None,
        })
    }

    /// Mutable `SymbolClass` bindings of every `SymbolClass` record.
    pub fn symbol_classes_mut(&mut self) -> impl Iterator<Item = &mut Vec<(u16, String)>> {
        self.tags.iter_mut().filter_map(|tag| match &mut tag.body {
            TagBody::SymbolClass(symbols) => Some(symbols),
            _ => None,
        })
    }

    /// The unit declared last, which holds the client's own code.
    #[must_use]
    pub fn last_abc(&self) -> Option<&AbcFile> {
        self.abc_files().last()
    }

    /// Mutable access to the unit declared last.
    pub fn last_abc_mut(&mut self) -> Option<&mut AbcFile> {
        self.abc_files_mut().last()
    }
}
