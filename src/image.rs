//! Object images, the programs the simulator loads.
//!
//! An [`ObjectImage`] is a contiguous block of words with the address it loads at.
//! On disk, it is a plain binary file:
//!
//! ```text
//! origin (2 bytes, big-endian) | word 0 (2 bytes, big-endian) | word 1 | ...
//! ```
//!
//! There is no header beyond the origin, so any file of two or more bytes is an image.

use std::path::{Path, PathBuf};

/// Errors that can occur while loading an object image.
#[derive(Debug, thiserror::Error)]
pub enum LoadErr {
    /// The image file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// The path that was being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The image is shorter than its 2-byte origin.
    #[error("image is missing its origin word")]
    MissingOrigin,
}

/// A block of words and the address it is loaded at.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ObjectImage {
    origin: u16,
    words: Vec<u16>,
}
impl ObjectImage {
    /// Creates an image from its origin and payload.
    ///
    /// If the payload would run past `xFFFF`, the excess words are dropped.
    pub fn new(origin: u16, mut words: Vec<u16>) -> Self {
        let room = 0x10000 - usize::from(origin);
        if words.len() > room {
            log::warn!("image at {origin:#06X} has {} words, only {room} fit; truncating", words.len());
            words.truncate(room);
        }

        Self { origin, words }
    }

    /// Parses an image from its on-disk bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use lc3_vm::image::ObjectImage;
    ///
    /// let image = ObjectImage::from_bytes(&[0x30, 0x00, 0xF0, 0x25]).unwrap();
    /// assert_eq!(image.origin(), 0x3000);
    /// assert_eq!(image.words(), &[0xF025]);
    /// ```
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadErr> {
        let [hi, lo, payload @ ..] = bytes else {
            return Err(LoadErr::MissingOrigin);
        };

        let chunks = payload.chunks_exact(2);
        if !chunks.remainder().is_empty() {
            log::warn!("image has a trailing odd byte, ignoring it");
        }
        let words = chunks
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        Ok(Self::new(u16::from_be_bytes([*hi, *lo]), words))
    }

    /// Reads and parses an image file.
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, LoadErr> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|source| LoadErr::Io { path: path.to_path_buf(), source })?;

        log::debug!("read {} bytes from {}", bytes.len(), path.display());
        Self::from_bytes(&bytes)
    }

    /// Serializes the image into its on-disk bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }

    /// The address the first word loads at.
    pub fn origin(&self) -> u16 {
        self.origin
    }

    /// The payload.
    pub fn words(&self) -> &[u16] {
        &self.words
    }
}
