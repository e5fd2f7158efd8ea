//! Read-only memory-mapped files shared between readers.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapOptions};

use crate::error::{PilumError, Result};

/// A cheaply clonable handle to a read-only memory map.
///
/// Every clone keeps the mapping alive; the region is unmapped when the last
/// clone is dropped. Query sources and filters hold their own clone so that a
/// retired index generation stays readable until in-flight queries finish.
#[derive(Debug, Clone)]
pub struct MappedFile {
    mmap: Option<Arc<Mmap>>,
}

impl MappedFile {
    /// Map the file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PilumError::storage(format!("Failed to open file {}: {e}", path.display()))
        })?;

        let len = file.metadata()?.len();
        if len == 0 {
            // Zero-length maps are rejected on some platforms.
            return Ok(MappedFile { mmap: None });
        }

        let mmap = unsafe {
            MmapOptions::new().map(&file).map_err(|e| {
                PilumError::storage(format!("Failed to mmap file {}: {e}", path.display()))
            })?
        };

        Ok(MappedFile {
            mmap: Some(Arc::new(mmap)),
        })
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => mmap,
            None => &[],
        }
    }

    /// Read a little-endian `u64` at byte offset `pos`.
    pub fn read_u64(&self, pos: usize) -> Result<u64> {
        let bytes = self
            .as_bytes()
            .get(pos..pos + 8)
            .ok_or_else(|| PilumError::corruption(format!("u64 read at {pos} out of bounds")))?;
        Ok(LittleEndian::read_u64(bytes))
    }
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
