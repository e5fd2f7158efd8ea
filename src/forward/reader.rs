//! Random access to forward index entries.

use std::path::Path;

use log::{debug, info, warn};

use crate::error::{PilumError, Result};
use crate::forward::spans::DocumentSpans;
use crate::forward::{ENTRY_SIZE, FEATURES_OFFSET, METADATA_OFFSET, SPANS_OFFSET, SpansReader};
use crate::model::DocIdCodec;
use crate::storage::MappedFile;

struct LoadedForward {
    ids: MappedFile,
    data: MappedFile,
    spans: SpansReader,
    count: usize,
}

/// Looks up documents by combined id. The rank bits of the id are ignored.
///
/// A reader whose files are absent reports itself as not loaded and answers
/// every lookup with zeros.
pub struct ForwardIndexReader {
    inner: Option<LoadedForward>,
}

impl ForwardIndexReader {
    pub fn open(ids_path: &Path, data_path: &Path, spans_path: &Path) -> Result<Self> {
        for path in [data_path, ids_path, spans_path] {
            if !path.exists() {
                warn!(
                    "Failed to create forward index reader, {} is absent",
                    path.display()
                );
                return Ok(Self::empty());
            }
        }

        let ids = MappedFile::open(ids_path)?;
        let data = MappedFile::open(data_path)?;
        let spans = SpansReader::open(spans_path)?;

        if ids.len() % 8 != 0 {
            return Err(PilumError::corruption(format!(
                "{} is not a whole number of longs",
                ids_path.display()
            )));
        }
        let count = ids.len() / 8;
        if data.len() != count * ENTRY_SIZE * 8 {
            return Err(PilumError::corruption(format!(
                "{} holds {}b, expected {}b for {count} documents",
                data_path.display(),
                data.len(),
                count * ENTRY_SIZE * 8
            )));
        }

        info!("Loaded forward index with {count} documents");
        Ok(ForwardIndexReader {
            inner: Some(LoadedForward {
                ids,
                data,
                spans,
                count,
            }),
        })
    }

    pub fn empty() -> Self {
        ForwardIndexReader { inner: None }
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.is_some()
    }

    pub fn total_doc_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |f| f.count)
    }

    fn idx_for_doc(&self, combined_id: u64) -> Option<(&LoadedForward, usize)> {
        let fwd = self.inner.as_ref()?;
        let id = DocIdCodec::remove_rank(combined_id);

        let (mut lo, mut hi) = (0usize, fwd.count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let value = fwd.ids.read_u64(mid * 8).ok()?;
            if value < id {
                lo = mid + 1;
            } else if value > id {
                hi = mid;
            } else {
                return Some((fwd, mid));
            }
        }
        debug!(
            "Could not find offset for doc {combined_id} ({}:{}:{})",
            DocIdCodec::rank(combined_id),
            DocIdCodec::domain_id(combined_id),
            DocIdCodec::ordinal(combined_id)
        );
        None
    }

    fn entry(&self, combined_id: u64, field: usize) -> Option<(&LoadedForward, u64)> {
        let (fwd, idx) = self.idx_for_doc(combined_id)?;
        let value = fwd.data.read_u64((idx * ENTRY_SIZE + field) * 8).ok()?;
        Some((fwd, value))
    }

    /// The document metadata long, zero for unknown documents.
    pub fn doc_meta(&self, combined_id: u64) -> u64 {
        self.entry(combined_id, METADATA_OFFSET).map_or(0, |(_, v)| v)
    }

    pub fn html_features(&self, combined_id: u64) -> u32 {
        self.entry(combined_id, FEATURES_OFFSET)
            .map_or(0, |(_, v)| (v & 0xFFFF_FFFF) as u32)
    }

    pub fn document_size(&self, combined_id: u64) -> u32 {
        self.entry(combined_id, FEATURES_OFFSET)
            .map_or(0, |(_, v)| (v >> 32) as u32)
    }

    /// Structural spans of a document, `None` for unknown documents.
    pub fn document_spans(&self, combined_id: u64) -> Result<Option<DocumentSpans>> {
        match self.entry(combined_id, SPANS_OFFSET) {
            Some((fwd, encoded)) => fwd.spans.read(encoded).map(Some),
            None => Ok(None),
        }
    }
}
