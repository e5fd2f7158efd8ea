//! Builds a forward index from journals.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::{PilumError, Result};
use crate::forward::{
    DOC_DATA_FILE, DOC_ID_FILE, ENTRY_SIZE, FEATURES_OFFSET, METADATA_OFFSET, SPANS_FILE,
    SPANS_OFFSET, SpansWriter,
};
use crate::journal::IndexJournal;
use crate::model::{DocIdCodec, DocIdRewriter};
use crate::storage::LongArray;

pub struct ForwardIndexConverter<'a> {
    rewriter: &'a dyn DocIdRewriter,
    doc_ids_path: PathBuf,
    doc_data_path: PathBuf,
    spans_path: PathBuf,
}

impl<'a> ForwardIndexConverter<'a> {
    /// A converter writing the standard file names into `out_dir`.
    pub fn new(rewriter: &'a dyn DocIdRewriter, out_dir: &Path) -> Self {
        ForwardIndexConverter {
            rewriter,
            doc_ids_path: out_dir.join(DOC_ID_FILE),
            doc_data_path: out_dir.join(DOC_DATA_FILE),
            spans_path: out_dir.join(SPANS_FILE),
        }
    }

    /// Write all three forward index files and return the number of
    /// documents, or `None` when there are no journals. A document appearing
    /// more than once keeps its last record.
    pub fn convert(&self, journals: &[IndexJournal]) -> Result<Option<usize>> {
        if journals.is_empty() {
            warn!("No journals, skipping forward index construction");
            return Ok(None);
        }
        if let Some(parent) = self.doc_ids_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let result = self.write_files(journals);
        if result.is_err() {
            for path in [&self.doc_ids_path, &self.doc_data_path, &self.spans_path] {
                let _ = fs::remove_file(path);
            }
        }
        result.map(Some)
    }

    fn write_files(&self, journals: &[IndexJournal]) -> Result<usize> {
        let mut ids = Vec::new();
        for journal in journals {
            for record in journal.records()? {
                ids.push(DocIdCodec::remove_rank(self.rewriter.rewrite(record?.doc_id)));
            }
        }
        ids.sort_unstable();
        ids.dedup();

        let mut id_array = LongArray::create(&self.doc_ids_path, ids.len())?;
        for (i, &id) in ids.iter().enumerate() {
            id_array.set(i, id);
        }
        id_array.flush()?;

        let mut data = LongArray::create(&self.doc_data_path, ids.len() * ENTRY_SIZE)?;
        let mut spans = SpansWriter::create(&self.spans_path)?;

        for journal in journals {
            for record in journal.records()? {
                let record = record?;
                let doc_id = DocIdCodec::remove_rank(self.rewriter.rewrite(record.doc_id));
                let idx = ids.binary_search(&doc_id).map_err(|_| {
                    PilumError::invariant(format!(
                        "doc {doc_id} appeared in {} between passes",
                        journal.path().display()
                    ))
                })?;

                let base = idx * ENTRY_SIZE;
                data.set(base + METADATA_OFFSET, record.doc_meta);
                data.set(
                    base + FEATURES_OFFSET,
                    record.features as u64 | ((record.size as u64) << 32),
                );
                data.set(base + SPANS_OFFSET, spans.write_document(doc_id, &record.spans)?);
            }
        }

        data.flush()?;
        let spans_bytes = spans.finish()?;
        info!(
            "Built forward index with {} documents, {}b of spans",
            ids.len(),
            spans_bytes
        );
        Ok(ids.len())
    }
}
