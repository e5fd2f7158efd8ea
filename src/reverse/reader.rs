//! Reader over a published docs/words file pair.

use std::path::Path;

use log::{info, warn};

use crate::error::Result;
use crate::positions::{PositionsReader, TermPositions};
use crate::postings::skiplist::validate_footer;
use crate::postings::{BTreeReader, SkipListReader};
use crate::query::{
    AnyOf, EmptyEntrySource, EntrySource, LetThrough, NoPass, QueryFilterStep,
};
use crate::reverse::sources::{RejectTermFilter, RetainTermFilter, SkipListEntrySource};
use crate::storage::MappedFile;

struct LoadedIndex {
    docs: MappedFile,
    words: BTreeReader<MappedFile>,
    data_len: usize,
}

/// Answers term lookups against one reverse index tier.
///
/// A reader whose files are missing or unreadable is still usable: it
/// reports itself as not loaded and behaves as an index without terms.
pub struct ReverseIndexReader {
    name: String,
    index: Option<LoadedIndex>,
    positions: Option<PositionsReader>,
}

impl ReverseIndexReader {
    /// Open the tier `name` from its docs and words files. `positions` is
    /// only given for tiers whose posting metadata are positions references.
    pub fn open(
        name: &str,
        docs_path: &Path,
        words_path: &Path,
        positions_path: Option<&Path>,
    ) -> Result<Self> {
        let index = match Self::load(docs_path, words_path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Failed to load {name} reverse index: {e}");
                None
            }
        };
        if let Some(index) = &index {
            info!(
                "Loaded {name} reverse index: {} terms, {}b of postings",
                index.words.len(),
                index.data_len
            );
        }

        let positions = match positions_path {
            Some(path) if path.exists() => match PositionsReader::open(path) {
                Ok(positions) => Some(positions),
                Err(e) => {
                    warn!("Failed to load positions for {name} reverse index: {e}");
                    None
                }
            },
            Some(path) => {
                warn!("Positions file {} missing", path.display());
                None
            }
            None => None,
        };

        Ok(ReverseIndexReader {
            name: name.to_string(),
            index,
            positions,
        })
    }

    fn load(docs_path: &Path, words_path: &Path) -> Result<Option<LoadedIndex>> {
        if !docs_path.exists() || !words_path.exists() {
            warn!(
                "Reverse index files {} / {} missing",
                docs_path.display(),
                words_path.display()
            );
            return Ok(None);
        }
        let docs = MappedFile::open(docs_path)?;
        let data_len = validate_footer(docs.as_bytes())?;
        let words = BTreeReader::new(MappedFile::open(words_path)?)?;
        Ok(Some(LoadedIndex {
            docs,
            words,
            data_len,
        }))
    }

    /// A reader with no backing files.
    pub fn empty(name: &str) -> Self {
        ReverseIndexReader {
            name: name.to_string(),
            index: None,
            positions: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_loaded(&self) -> bool {
        self.index.is_some()
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.index.as_ref().map_or(0, |i| i.words.len())
    }

    fn run(&self, term_id: u64) -> Option<SkipListReader<MappedFile>> {
        let index = self.index.as_ref()?;
        let offset = index.words.find(term_id)? as usize;
        if offset >= index.data_len {
            warn!("{} index: term {term_id} points past the data section", self.name);
            return None;
        }
        match SkipListReader::new(index.docs.clone(), offset) {
            Ok(reader) => Some(reader),
            Err(e) => {
                warn!("{} index: bad run for term {term_id}: {e}", self.name);
                None
            }
        }
    }

    /// Ascending document ids of `term_id`.
    pub fn documents(&self, term_id: u64) -> Box<dyn EntrySource> {
        match self.run(term_id) {
            Some(reader) => Box::new(SkipListEntrySource::new(reader, &self.name, term_id)),
            None => Box::new(EmptyEntrySource::new(self.name.clone(), term_id)),
        }
    }

    pub fn num_documents(&self, term_id: u64) -> usize {
        self.run(term_id).map_or(0, |r| r.len())
    }

    /// Filter step keeping candidates that have `term_id`.
    pub fn also(&self, term_id: u64) -> Box<dyn QueryFilterStep> {
        match self.run(term_id) {
            Some(reader) => Box::new(RetainTermFilter::new(reader, &self.name, term_id)),
            None => Box::new(NoPass),
        }
    }

    /// Filter step keeping candidates that have any of `term_ids`.
    pub fn any(&self, term_ids: &[u64]) -> Box<dyn QueryFilterStep> {
        let steps: Vec<Box<dyn QueryFilterStep>> = term_ids
            .iter()
            .filter_map(|&t| {
                self.run(t).map(|reader| {
                    Box::new(RetainTermFilter::new(reader, &self.name, t)) as Box<dyn QueryFilterStep>
                })
            })
            .collect();
        if steps.is_empty() {
            Box::new(NoPass)
        } else {
            Box::new(AnyOf::new(steps))
        }
    }

    /// Filter step dropping candidates that have `term_id`.
    pub fn not(&self, term_id: u64) -> Box<dyn QueryFilterStep> {
        match self.run(term_id) {
            Some(reader) => Box::new(RejectTermFilter::new(reader, &self.name, term_id)),
            None => Box::new(LetThrough),
        }
    }

    /// Posting metadata of `term_id` for each of the ascending `doc_ids`,
    /// zero where the document lacks the term.
    pub fn get_term_meta(&self, term_id: u64, doc_ids: &[u64]) -> Vec<u64> {
        match self.run(term_id) {
            Some(reader) => reader
                .get_values(doc_ids)
                .into_iter()
                .map(|v| v.unwrap_or(0))
                .collect(),
            None => vec![0; doc_ids.len()],
        }
    }

    /// Positions of `term_id` in each of the ascending `doc_ids`. Requires a
    /// tier opened with a positions file; otherwise every entry is `None`.
    pub fn get_term_data(&self, term_id: u64, doc_ids: &[u64]) -> Result<Vec<Option<TermPositions>>> {
        let (Some(reader), Some(positions)) = (self.run(term_id), &self.positions) else {
            return Ok(vec![None; doc_ids.len()]);
        };
        reader
            .get_values(doc_ids)
            .into_iter()
            .map(|value| value.map(|r| positions.get(r)).transpose())
            .collect()
    }
}
