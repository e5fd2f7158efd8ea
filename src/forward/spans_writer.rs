//! Writes the spans file of a forward index.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::warn;

use crate::error::{PilumError, Result};
use crate::forward::spans_codec::{
    self, MAX_RECORD_SIZE, MAX_START, SpansVersion, encode_offset, is_valid_sequence,
};
use crate::journal::JournalSpan;
use crate::storage::StructWriter;

/// Appends one plain-encoded record per document and seals the file with a
/// page-aligned footer.
pub struct SpansWriter {
    out: StructWriter<BufWriter<File>>,
    path: PathBuf,
    record: Vec<u8>,
}

impl SpansWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            PilumError::storage(format!("Failed to create {}: {e}", path.display()))
        })?;
        Ok(SpansWriter {
            out: StructWriter::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            record: Vec::new(),
        })
    }

    /// Write the spans of one document and return the encoded offset of its
    /// record. Malformed groups are skipped.
    pub fn write_document(&mut self, doc_id: u64, spans: &[JournalSpan]) -> Result<u64> {
        let mut groups: Vec<(u8, &[u32])> = Vec::with_capacity(spans.len());
        for span in spans {
            if !is_valid_sequence(&span.starts_ends) || span.starts_ends.len() > u16::MAX as usize
            {
                warn!("Skipping malformed span group {} of doc {doc_id}", span.zone);
                continue;
            }
            groups.push((span.zone, &span.starts_ends));
        }
        if groups.len() > u8::MAX as usize {
            warn!("Doc {doc_id} has {} span groups, keeping {}", groups.len(), u8::MAX);
            groups.truncate(u8::MAX as usize);
        }

        self.record.clear();
        spans_codec::encode_plain(&groups, &mut self.record)?;
        if self.record.len() > MAX_RECORD_SIZE {
            return Err(PilumError::invalid_argument(format!(
                "spans of doc {doc_id} take {}b",
                self.record.len()
            )));
        }

        let offset = self.out.position();
        if offset > MAX_START {
            return Err(PilumError::invalid_argument(format!(
                "spans of doc {doc_id} would start at {offset}b, past the addressable {MAX_START}b"
            )));
        }
        self.out.write_raw(&self.record)?;
        Ok(encode_offset(offset, self.record.len()))
    }

    /// Write the footer and close the file, returning its size in bytes.
    pub fn finish(mut self) -> Result<u64> {
        let data_len = self.out.position();
        self.out
            .write_raw(&spans_codec::footer(data_len, SpansVersion::Plain))?;
        let size = self.out.position();
        let file = self.out.into_inner()?.into_inner().map_err(|e| e.into_error())?;
        file.sync_all().map_err(|e| {
            PilumError::storage(format!("Failed to sync {}: {e}", self.path.display()))
        })?;
        Ok(size)
    }
}
