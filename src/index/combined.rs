//! One generation of index files opened together.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::forward::{DOC_DATA_FILE, DOC_ID_FILE, DocumentSpans, ForwardIndexReader, SPANS_FILE};
use crate::index::query_builder::IndexQueryBuilder;
use crate::index::{
    POSITIONS_FILE, REV_FULL_DOCS, REV_FULL_WORDS, REV_PRIO_DOCS, REV_PRIO_WORDS,
};
use crate::positions::TermPositions;
use crate::query::{IndexQuery, ParamMatchingFilter, QueryFilterStep, QueryParams};
use crate::reverse::ReverseIndexReader;

pub const FULL_TIER: &str = "full";
pub const PRIORITY_TIER: &str = "prio";

/// Facade over the forward index and both reverse index tiers.
pub struct CombinedIndexReader {
    forward: Arc<ForwardIndexReader>,
    full: ReverseIndexReader,
    prio: ReverseIndexReader,
}

impl CombinedIndexReader {
    pub fn new(forward: ForwardIndexReader, full: ReverseIndexReader, prio: ReverseIndexReader) -> Self {
        CombinedIndexReader {
            forward: Arc::new(forward),
            full,
            prio,
        }
    }

    /// Open the standard set of index files in `dir`. Missing files leave
    /// the corresponding reader unloaded.
    pub fn open(dir: &Path) -> Result<Self> {
        let forward = ForwardIndexReader::open(
            &dir.join(DOC_ID_FILE),
            &dir.join(DOC_DATA_FILE),
            &dir.join(SPANS_FILE),
        )?;
        let full = ReverseIndexReader::open(
            FULL_TIER,
            &dir.join(REV_FULL_DOCS),
            &dir.join(REV_FULL_WORDS),
            Some(&dir.join(POSITIONS_FILE)),
        )?;
        let prio = ReverseIndexReader::open(
            PRIORITY_TIER,
            &dir.join(REV_PRIO_DOCS),
            &dir.join(REV_PRIO_WORDS),
            None,
        )?;
        Ok(Self::new(forward, full, prio))
    }

    pub fn forward(&self) -> &Arc<ForwardIndexReader> {
        &self.forward
    }

    pub fn full(&self) -> &ReverseIndexReader {
        &self.full
    }

    pub fn prio(&self) -> &ReverseIndexReader {
        &self.prio
    }

    /// A query head over the priority tier postings of `term_id`.
    pub fn find_priority_word(&self, term_id: u64) -> IndexQueryBuilder<'_> {
        let query = IndexQuery::new(vec![self.prio.documents(term_id)]);
        IndexQueryBuilder::new(query, term_id, &self.full, &self.prio)
    }

    /// A query head over the full tier postings of `term_id`.
    pub fn find_full_word(&self, term_id: u64) -> IndexQueryBuilder<'_> {
        let query = IndexQuery::new(vec![self.full.documents(term_id)]);
        IndexQueryBuilder::new(query, term_id, &self.full, &self.prio)
    }

    pub fn num_hits(&self, term_id: u64) -> usize {
        self.full.num_documents(term_id)
    }

    pub fn num_hits_prio(&self, term_id: u64) -> usize {
        self.prio.num_documents(term_id)
    }

    /// Filter step enforcing `params` against forward index metadata.
    pub fn param_filter(&self, params: &QueryParams) -> Box<dyn QueryFilterStep> {
        Box::new(ParamMatchingFilter::new(params.clone(), Arc::clone(&self.forward)))
    }

    /// Full tier posting metadata for the ascending `doc_ids`.
    pub fn get_term_meta(&self, term_id: u64, doc_ids: &[u64]) -> Vec<u64> {
        self.full.get_term_meta(term_id, doc_ids)
    }

    pub fn get_term_positions(
        &self,
        term_id: u64,
        doc_ids: &[u64],
    ) -> Result<Vec<Option<TermPositions>>> {
        self.full.get_term_data(term_id, doc_ids)
    }

    pub fn doc_meta(&self, doc_id: u64) -> u64 {
        self.forward.doc_meta(doc_id)
    }

    pub fn html_features(&self, doc_id: u64) -> u32 {
        self.forward.html_features(doc_id)
    }

    pub fn document_size(&self, doc_id: u64) -> u32 {
        self.forward.document_size(doc_id)
    }

    pub fn document_spans(&self, doc_id: u64) -> Result<Option<DocumentSpans>> {
        self.forward.document_spans(doc_id)
    }

    pub fn total_doc_count(&self) -> usize {
        self.forward.total_doc_count()
    }

    /// Whether every backing file was present and readable.
    pub fn is_loaded(&self) -> bool {
        self.forward.is_loaded() && self.full.is_loaded() && self.prio.is_loaded()
    }
}
