//! Firmware image loading.
//!
//! The whole file is read up front: the total length drives the progress/ETA
//! math and the end address shown to the operator before anything is sent.

use {
    crate::error::{Error, Result},
    log::debug,
    std::{
        fs, io,
        path::{Path, PathBuf},
    },
};

/// An immutable firmware image held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    path: Option<PathBuf>,
}

impl FirmwareImage {
    /// Load an image from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(io::Error::new(
                e.kind(),
                format!("reading {}: {e}", path.display()),
            )),
        })?;
        debug!("Loaded {} bytes from {}", data.len(), path.display());

        Ok(Self {
            data,
            path: Some(path.to_path_buf()),
        })
    }

    /// Build an image from bytes already in memory.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            path: None,
        }
    }

    /// Image length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image has no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Byte at `index`, if in range.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Path the image was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Fail with [`Error::FileNotFound`] unless `path` exists.
///
/// Lets callers reject a bad path before acquiring the transport, and defer
/// reading the bytes until the transport is known to be usable.
pub fn ensure_exists(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        Ok(())
    } else {
        Err(Error::FileNotFound {
            path: path.to_path_buf(),
        })
    }
}
