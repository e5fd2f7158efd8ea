//! Documents store: `(doc id, metadata)` records grouped by term.

use std::path::Path;

use ahash::AHashMap;
use log::debug;

use crate::error::{PilumError, Result};
use crate::journal::IndexJournal;
use crate::model::DocIdRewriter;
use crate::preindex::encoder::PostingEncoder;
use crate::preindex::segments::WordSegments;
use crate::preindex::temp_file;
use crate::storage::LongArray;

/// Longs per posting record.
pub const RECORD_SIZE: usize = 2;

#[derive(Debug)]
pub struct PreindexDocuments {
    pub(crate) docs: LongArray,
}

impl PreindexDocuments {
    pub fn new(docs: LongArray) -> Self {
        PreindexDocuments { docs }
    }

    /// Fill a documents store for `segments` from a second pass over
    /// `journal`. Each segment ends up sorted by document id with duplicates
    /// removed, and `segments` counts are adjusted to match.
    pub fn construct(
        work_dir: &Path,
        journal: &IndexJournal,
        rewriter: &dyn DocIdRewriter,
        encoder: &dyn PostingEncoder,
        segments: &mut WordSegments,
    ) -> Result<Self> {
        let total = segments.total_size()? as usize;
        let mut docs = LongArray::create(temp_file(work_dir, "docs"), total * RECORD_SIZE)?;

        let mut write_offsets: AHashMap<u64, usize> = AHashMap::with_capacity(segments.len());
        {
            let mut iter = segments.iterator(RECORD_SIZE)?;
            while iter.is_position_before_end() {
                write_offsets.insert(iter.word_id(), iter.start_offset());
                iter.next();
            }
        }

        for record in journal.records()? {
            let record = record?;
            let doc_id = rewriter.rewrite(record.doc_id);
            for term in record.terms.iter().filter(|t| encoder.accepts(t)) {
                let offset = write_offsets.get_mut(&term.term_id).ok_or_else(|| {
                    PilumError::invariant(format!(
                        "term {} missing from word segments of {}",
                        term.term_id,
                        journal.path().display()
                    ))
                })?;
                if *offset + RECORD_SIZE > docs.len() {
                    return Err(PilumError::invariant(format!(
                        "{} changed between construction passes",
                        journal.path().display()
                    )));
                }
                docs.set(*offset, doc_id);
                docs.set(*offset + 1, encoder.encode(term)?);
                *offset += RECORD_SIZE;
            }
        }

        let mut documents = PreindexDocuments { docs };
        documents.sort_segments(segments)?;
        documents.docs.flush()?;
        Ok(documents)
    }

    /// Sort every segment by document id and squeeze out duplicate ids,
    /// compacting the store in place.
    fn sort_segments(&mut self, segments: &mut WordSegments) -> Result<()> {
        let mut read = 0usize;
        let mut write = 0usize;
        let mut removed = 0u64;

        for i in 0..segments.len() {
            let count = segments.counts.get(i) as usize;
            let end = read + count * RECORD_SIZE;
            self.docs.sort_records(read, end, RECORD_SIZE)?;

            let mut kept = 0u64;
            let mut last: Option<u64> = None;
            let mut pos = read;
            while pos < end {
                let doc = self.docs.get(pos);
                if last != Some(doc) {
                    let meta = self.docs.get(pos + 1);
                    self.docs.set(write, doc);
                    self.docs.set(write + 1, meta);
                    write += RECORD_SIZE;
                    kept += 1;
                    last = Some(doc);
                } else {
                    removed += 1;
                }
                pos += RECORD_SIZE;
            }
            segments.counts.set(i, kept);
            read = end;
        }

        if write < self.docs.len() {
            debug!(
                "Removed {removed} duplicate postings from {}",
                self.docs.path().display()
            );
            self.docs.truncate(write)?;
        }
        Ok(())
    }

    /// Number of longs in the store.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.docs.flush()
    }

    pub fn delete(self) -> Result<()> {
        self.docs.delete()
    }
}
