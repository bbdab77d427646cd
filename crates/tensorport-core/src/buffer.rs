use std::path::Path;

use bytes::Bytes;
use tracing::info;

use crate::{Error, Result};

/// Serialized model bytes, held in memory so an engine can be built
/// without a second disk read.
#[derive(Clone, Debug)]
pub struct ModelBuffer {
    bytes: Bytes,
}

impl ModelBuffer {
    /// Reads the whole file. Missing, unreadable and zero-length files fail.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if data.is_empty() {
            return Err(Error::EmptyModel {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), bytes = data.len(), "read model file");
        Ok(Self {
            bytes: Bytes::from(data),
        })
    }

    /// Takes a private copy of `data`.
    pub(crate) fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(data),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}
