//! Access to module and symbol files.
//!
//! # Key Components
//!
//! - [`File`] - one input blob, memory-mapped from disk or owned in memory
//! - [`Backend`] - trait for the data sources behind a [`File`]
//! - [`ModuleFile`] - a module file paired with its symbol file by naming convention
//! - [`parser::Parser`] - bounds-checked cursor over a blob
//! - [`io`] - little-endian and compressed integer primitives
//!
//! Module files hold a bare ECMA-335 metadata image (starting with the `BSJB` root); there is
//! no PE container around it.
//!
//! # Thread Safety
//!
//! All backends are read-only and [`Send`] + [`Sync`].

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::{Path, PathBuf};

use log::debug;

use crate::{Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// File extension of symbol images
pub const SYMBOL_EXTENSION: &str = "pdb";

/// Backend trait for file data sources.
///
/// Abstracts over in-memory buffers and memory-mapped files. All implementations must be
/// thread-safe.
pub trait Backend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the requested range is out of bounds.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Returns the entire data buffer.
    fn data(&self) -> &[u8];

    /// Returns the total length of the data buffer.
    fn len(&self) -> usize;
}

/// One loaded input blob.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::File;
/// use std::path::Path;
///
/// let file = File::from_file(Path::new("Game.dll"))?;
/// assert_eq!(&file.data()[..4], b"BSJB");
/// # Ok::<(), dotweave::Error>(())
/// ```
pub struct File {
    data: Box<dyn Backend>,
}

impl File {
    /// Memory-map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file can not be opened or mapped and
    /// [`crate::Error::Empty`] for empty files.
    pub fn from_file(path: &Path) -> Result<File> {
        let input = Physical::new(path)?;
        if input.len() == 0 {
            return Err(Empty);
        }

        debug!("mapped {} ({} bytes)", path.display(), input.len());
        Ok(File {
            data: Box::new(input),
        })
    }

    /// Wrap a buffer that is already in memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        if data.is_empty() {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(Memory::new(data)),
        })
    }

    /// Length in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file has no content
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.len() == 0
    }

    /// The complete contents
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is outside of the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }
}

/// The symbol file path belonging to a module: `<dir>/<stem>.pdb` next to `<dir>/<stem>.dll`
#[must_use]
pub fn symbols_path_for(module: &Path) -> PathBuf {
    module.with_extension(SYMBOL_EXTENSION)
}

/// A module file together with its symbol file.
pub struct ModuleFile {
    /// Path of the module
    pub path: PathBuf,
    /// Path of the symbol file
    pub symbols_path: PathBuf,
    /// The module blob
    pub code: File,
    /// The symbol blob, `None` if the symbol file does not exist
    pub symbols: Option<File>,
}

impl ModuleFile {
    /// Open `path` and the symbol file next to it.
    ///
    /// A missing symbol file is not an error here; whether symbols are required is decided
    /// by [`crate::reader::ReaderOptions`].
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a file exists but can not be mapped.
    pub fn open(path: &Path) -> Result<ModuleFile> {
        Self::open_with_symbols(path, &symbols_path_for(path))
    }

    /// Open `path` with an explicitly located symbol file.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if a file exists but can not be mapped.
    pub fn open_with_symbols(path: &Path, symbols_path: &Path) -> Result<ModuleFile> {
        let code = File::from_file(path)?;
        let symbols = if symbols_path.exists() {
            Some(File::from_file(symbols_path)?)
        } else {
            debug!("no symbol file at {}", symbols_path.display());
            None
        };

        Ok(ModuleFile {
            path: path.to_path_buf(),
            symbols_path: symbols_path.to_path_buf(),
            code,
            symbols,
        })
    }

    /// Module name: the file name of the module
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing() {
        assert_eq!(
            symbols_path_for(Path::new("/out/bin/Game.dll")),
            PathBuf::from("/out/bin/Game.pdb")
        );
        assert_eq!(
            symbols_path_for(Path::new("Tool.exe")),
            PathBuf::from("Tool.pdb")
        );
    }

    #[test]
    fn from_mem() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));

        let file = File::from_mem(b"BSJB".to_vec()).unwrap();
        assert_eq!(file.len(), 4);
        assert!(!file.is_empty());
        assert_eq!(file.data_slice(1, 2).unwrap(), b"SJ");
    }

    #[test]
    fn open_without_symbols() {
        let dir = std::env::temp_dir().join(format!("dotweave-file-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let module = dir.join("Lonely.dll");
        std::fs::write(&module, b"BSJB").unwrap();

        let file = ModuleFile::open(&module).unwrap();
        assert_eq!(file.name(), "Lonely.dll");
        assert!(file.symbols.is_none());
        assert_eq!(file.symbols_path, dir.join("Lonely.pdb"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
