//! Memory-mapped file backend.
//!
//! [`Physical`] maps a module or symbol file read-only into the address space, so the reader
//! can work on the file contents without copying them first.

use std::{fs, path::Path};

use memmap2::Mmap;

use super::Backend;
use crate::{Error::FileError, Result};

/// A file backend that uses memory-mapped I/O.
#[derive(Debug)]
pub struct Physical {
    /// Memory-mapped file data
    data: Mmap,
}

impl Physical {
    /// Memory-map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // SAFETY: the mapping is read-only; the files handled here are build outputs that
        // are not modified while a weaving pass reads them.
        let data = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..end])
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}
