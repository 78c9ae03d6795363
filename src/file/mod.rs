//! Raw input access and the primitive codec shared by the SWF and ABC layers.
//!
//! # Key Components
//!
//! - [`crate::file::File`] - Owns the raw bytes of a loaded client, from disk or memory
//! - [`crate::file::Backend`] - Trait for the different data sources
//! - [`crate::file::parser::Parser`] - Bounds checked cursor with the AVM2 integer readers
//! - [`crate::file::writer::Writer`] - Output buffer with the matching writers
//! - [`crate::file::io`] - Fixed width little/big-endian primitives
//!
//! # Examples
//!
//! ```rust
//! use swfscope::File;
//!
//! let file = File::from_mem(b"FWS\x0A".to_vec())?;
//! assert_eq!(file.len(), 4);
//! assert_eq!(&file.data()[..3], b"FWS");
//! # Ok::<(), swfscope::Error>(())
//! ```

pub mod io;
pub mod parser;
pub mod writer;

mod memory;
mod physical;

pub use memory::Memory;
pub use physical::Physical;

use std::path::Path;

use crate::{Error, Result};

/// Backend trait for file data sources.
///
/// Implemented by [`Physical`] for memory-mapped files and [`Memory`] for owned buffers.
/// Backends are `Send + Sync` so a loaded file can be handed across threads.
pub trait Backend: Send + Sync {
    /// Returns a slice of the data at the given offset and length.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data.
    fn len(&self) -> usize;
}

/// The raw bytes of a loaded client binary.
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-map a file from disk.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and
    /// [`crate::Error::Empty`] if it has no content.
    pub fn from_file(path: &Path) -> Result<File> {
        Self::load(Physical::new(path)?)
    }

    /// Wrap an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        Self::load(Memory::new(data))
    }

    fn load<T: Backend + 'static>(backend: T) -> Result<File> {
        if backend.len() == 0 {
            return Err(Error::Empty);
        }

        Ok(File {
            data: Box::new(backend),
        })
    }

    /// The full content of the file.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// A bounds checked slice of the file.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// Size of the file in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file has no content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_rejected() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Error::Empty)));
    }

    #[test]
    fn slices() {
        let file = File::from_mem(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(file.data_slice(1, 2).unwrap(), &[2, 3]);
        assert!(file.data_slice(3, 2).is_err());
        assert!(!file.is_empty());
    }
}
