//! Content sources and the provider that loads them on demand
//!
//! Desired entities only carry a [`ContentSource`]; bytes are pulled through a
//! [`ContentProvider`] when the executor actually writes content, never for
//! entities that are left untouched.

use crate::fingerprint::Fingerprint;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the bytes of a piece of content live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Generated or already loaded content
    Bytes(Vec<u8>),
    /// File-backed content
    File(PathBuf),
}

impl ContentSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        ContentSource::File(path.as_ref().to_path_buf())
    }

    /// Read the content once to compute its fingerprint.
    pub fn fingerprint(&self) -> Result<Fingerprint, ContentError> {
        Ok(Fingerprint::of(&SourceLoader.load(self)?))
    }
}

/// Errors raised while loading content
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("Failed to read content from {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supplies raw bytes for a content source
pub trait ContentProvider {
    fn load(&self, source: &ContentSource) -> Result<Vec<u8>, ContentError>;
}

/// Default provider: clones in-memory bytes and reads files from disk
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceLoader;

impl ContentProvider for SourceLoader {
    fn load(&self, source: &ContentSource) -> Result<Vec<u8>, ContentError> {
        match source {
            ContentSource::Bytes(data) => Ok(data.clone()),
            ContentSource::File(path) => fs::read(path).map_err(|source| ContentError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

impl<P: ContentProvider + ?Sized> ContentProvider for &P {
    fn load(&self, source: &ContentSource) -> Result<Vec<u8>, ContentError> {
        (**self).load(source)
    }
}
