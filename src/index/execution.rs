//! Query planning and execution against a [`CombinedIndexReader`].
//!
//! A search query becomes an ordered list of query heads. Heads seeded from
//! the priority tier come first, most selective first, followed by one full
//! tier head for the rarest include term. Every head requires all include
//! terms, rejects all exclude terms and enforces the query parameters.
//!
//! Execution drains the heads in order into fixed-size batches delivered to
//! a sink, skipping ids an earlier head already produced, and stops pulling
//! postings once the search budget runs out.

use ahash::AHashSet;
use log::debug;
use serde::Serialize;

use crate::index::CombinedIndexReader;
use crate::query::{IndexQuery, QueryBuffer, SearchBudget, SearchQuery};

/// Counters from one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub heads: usize,
    pub heads_evaluated: usize,
    pub results: usize,
    pub batches: usize,
    pub timed_out: bool,
}

/// Build the query heads for `query`, in evaluation order.
pub fn create_queries(index: &CombinedIndexReader, query: &SearchQuery) -> Vec<IndexQuery> {
    if query.includes.is_empty() {
        return Vec::new();
    }

    let mut terms_full = query.includes.clone();
    terms_full.sort_by_key(|&t| index.num_hits(t));
    let mut terms_prio = query.includes.clone();
    terms_prio.sort_by_key(|&t| index.num_hits_prio(t));

    let mut heads = Vec::new();
    if terms_prio.len() >= 2 {
        for i in 0..terms_prio.len() {
            for j in i + 1..terms_prio.len() {
                heads.push(
                    index
                        .find_priority_word(terms_prio[i])
                        .also_prio(terms_prio[j]),
                );
            }
        }
    }
    for &term in &terms_prio {
        heads.push(index.find_priority_word(term));
    }
    heads.push(index.find_full_word(terms_full[0]));

    heads
        .into_iter()
        .map(|mut head| {
            for &term in &terms_full {
                head = head.also_full(term);
            }
            for &term in &query.excludes {
                head = head.not_full(term);
            }
            head.add_inclusion_filter(index.param_filter(&query.params))
                .build()
        })
        .collect()
}

/// Runs query heads into batches of document ids.
pub struct IndexQueryExecution {
    buffer: QueryBuffer,
    batch: Vec<u64>,
    results_batch_size: usize,
    seen: AHashSet<u64>,
}

impl IndexQueryExecution {
    pub fn new(lookup_batch_size: usize, results_batch_size: usize) -> Self {
        let results_batch_size = results_batch_size.max(1);
        IndexQueryExecution {
            buffer: QueryBuffer::new(lookup_batch_size.max(1)),
            batch: Vec::with_capacity(results_batch_size),
            results_batch_size,
            seen: AHashSet::new(),
        }
    }

    /// Evaluate every head of `query` in order under one budget.
    pub fn run<F>(
        &mut self,
        index: &CombinedIndexReader,
        query: &SearchQuery,
        budget: &SearchBudget,
        mut sink: F,
    ) -> ExecutionStats
    where
        F: FnMut(&[u64]),
    {
        let mut stats = ExecutionStats::default();
        let heads = create_queries(index, query);
        stats.heads = heads.len();
        self.seen.clear();

        for mut head in heads {
            if !budget.has_time_left() {
                stats.timed_out = true;
                break;
            }
            debug!("Evaluating {}", head.describe());
            self.evaluate_subquery(&mut head, budget, &mut sink, &mut stats);
            stats.heads_evaluated += 1;
        }
        if !budget.has_time_left() && stats.heads_evaluated < stats.heads {
            stats.timed_out = true;
        }
        stats
    }

    /// Drain `query` into batches of `results_batch_size` ids while it has
    /// more and the budget lasts. The remainder is delivered as a final,
    /// shorter batch.
    pub fn evaluate_subquery<F>(
        &mut self,
        query: &mut IndexQuery,
        budget: &SearchBudget,
        sink: &mut F,
        stats: &mut ExecutionStats,
    ) where
        F: FnMut(&[u64]),
    {
        while query.has_more() && budget.has_time_left() {
            query.get_more_results(&mut self.buffer);
            for &id in self.buffer.values() {
                if self.seen.insert(id) {
                    self.batch.push(id);
                }
            }

            while self.batch.len() >= self.results_batch_size {
                sink(&self.batch[..self.results_batch_size]);
                stats.results += self.results_batch_size;
                stats.batches += 1;
                self.batch.drain(..self.results_batch_size);
            }
        }

        if query.has_more() {
            stats.timed_out = true;
        }
        if !self.batch.is_empty() {
            sink(self.batch.as_slice());
            stats.results += self.batch.len();
            stats.batches += 1;
            self.batch.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardIndexReader;
    use crate::reverse::ReverseIndexReader;

    #[test]
    fn test_no_includes_no_heads() {
        let index = CombinedIndexReader::new(
            ForwardIndexReader::empty(),
            ReverseIndexReader::empty("full"),
            ReverseIndexReader::empty("prio"),
        );
        assert!(create_queries(&index, &SearchQuery::new(vec![], vec![3])).is_empty());

        let mut execution = IndexQueryExecution::new(16, 16);
        let mut delivered = 0;
        let stats = execution.run(
            &index,
            &SearchQuery::new(vec![], vec![]),
            &SearchBudget::unlimited(),
            |batch| delivered += batch.len(),
        );
        assert_eq!(delivered, 0);
        assert_eq!(stats.heads, 0);
    }

    #[test]
    fn test_head_count_for_three_terms() {
        let index = CombinedIndexReader::new(
            ForwardIndexReader::empty(),
            ReverseIndexReader::empty("full"),
            ReverseIndexReader::empty("prio"),
        );
        // 3 pairs, 3 priority singles, 1 full fallback.
        let mut heads = create_queries(&index, &SearchQuery::new(vec![1, 2, 3], vec![]));
        assert_eq!(heads.len(), 7);

        let mut buffer = QueryBuffer::new(8);
        for head in &mut heads {
            head.get_more_results(&mut buffer);
            assert!(buffer.is_empty());
            assert!(!head.has_more());
        }
    }
}
