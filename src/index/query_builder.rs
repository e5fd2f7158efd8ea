//! Builder that grows a query head with term filters.

use ahash::AHashSet;

use crate::query::{IndexQuery, QueryFilterStep};
use crate::reverse::ReverseIndexReader;

/// Adds inclusion and exclusion steps to a query head.
///
/// Terms already folded into the query, including the head term, are
/// remembered in one set shared by [`also_full`](Self::also_full) and
/// [`also_prio`](Self::also_prio): a term present in either tier is never
/// required a second time.
pub struct IndexQueryBuilder<'a> {
    query: IndexQuery,
    full: &'a ReverseIndexReader,
    prio: &'a ReverseIndexReader,
    already_considered: AHashSet<u64>,
}

impl<'a> IndexQueryBuilder<'a> {
    pub fn new(
        query: IndexQuery,
        head_term: u64,
        full: &'a ReverseIndexReader,
        prio: &'a ReverseIndexReader,
    ) -> Self {
        let mut already_considered = AHashSet::new();
        already_considered.insert(head_term);
        IndexQueryBuilder {
            query,
            full,
            prio,
            already_considered,
        }
    }

    /// Require `term_id` in the full tier.
    pub fn also_full(mut self, term_id: u64) -> Self {
        if self.already_considered.insert(term_id) {
            self.query.add_inclusion_filter(self.full.also(term_id));
        }
        self
    }

    /// Require `term_id` in the priority tier.
    pub fn also_prio(mut self, term_id: u64) -> Self {
        if self.already_considered.insert(term_id) {
            self.query.add_inclusion_filter(self.prio.also(term_id));
        }
        self
    }

    /// Require at least one of `term_ids` in the full tier.
    pub fn any_full(mut self, term_ids: &[u64]) -> Self {
        self.query.add_inclusion_filter(self.full.any(term_ids));
        self
    }

    /// Reject documents with `term_id` in the full tier.
    pub fn not_full(mut self, term_id: u64) -> Self {
        self.query.add_inclusion_filter(self.full.not(term_id));
        self
    }

    pub fn add_inclusion_filter(mut self, filter: Box<dyn QueryFilterStep>) -> Self {
        self.query.add_inclusion_filter(filter);
        self
    }

    pub fn build(self) -> IndexQuery {
        self.query
    }
}
