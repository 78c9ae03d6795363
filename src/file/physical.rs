//! Memory-mapped file backend.
//!
//! A [`Physical`] backend maps a client binary read-only into the address space, so that
//! large `.swf` files are paged in on demand instead of being copied up front. Compressed
//! containers still end up inflated into an owned buffer by [`crate::swf::SwfFile`], but
//! the raw input is never duplicated.

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A file backend that uses memory-mapped I/O.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Create a new physical file backend by memory-mapping the specified file.
    ///
    /// # Arguments
    /// * `path` - Path to the file on disk
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;
        // The mapping is read-only and the file is not modified while it is alive.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;
        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(out_of_bounds_error!())
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"FWS\x0A\x08\x00\x00\x00").unwrap();
        temp.flush().unwrap();

        let physical = Physical::new(temp.path()).unwrap();
        assert_eq!(physical.len(), 8);
        assert_eq!(physical.data_slice(0, 3).unwrap(), b"FWS");
        assert_eq!(physical.data()[3], 0x0A);

        assert!(physical.data_slice(6, 3).is_err());
        assert!(physical.data_slice(usize::MAX, 1).is_err());
    }

    #[test]
    fn missing_file() {
        let result = Physical::new("definitely/not/here.swf");
        assert!(matches!(result, Err(FileError(_))));
    }
}
