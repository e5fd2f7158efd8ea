//! A query head: entry sources chained with inclusion filters.

use crate::query::{EntrySource, QueryBuffer, QueryFilterStep};

/// Reads candidates from its sources in order, one source per fill, and runs
/// every inclusion filter over each filled buffer.
pub struct IndexQuery {
    sources: Vec<Box<dyn EntrySource>>,
    filters: Vec<Box<dyn QueryFilterStep>>,
    current: usize,
    data_cost: u64,
}

impl IndexQuery {
    pub fn new(sources: Vec<Box<dyn EntrySource>>) -> Self {
        IndexQuery {
            sources,
            filters: Vec::new(),
            current: 0,
            data_cost: 0,
        }
    }

    pub fn add_inclusion_filter(&mut self, filter: Box<dyn QueryFilterStep>) {
        self.filters.push(filter);
    }

    pub fn has_more(&self) -> bool {
        self.current < self.sources.len()
    }

    /// Refill `dest` with the next candidates that pass every filter.
    ///
    /// `dest` is reset first. It may come back empty while
    /// [`has_more`](Self::has_more) still holds, when a whole fill was
    /// filtered out.
    pub fn get_more_results(&mut self, dest: &mut QueryBuffer) {
        if !self.fill_buffer(dest) {
            return;
        }
        for filter in &self.filters {
            filter.apply(dest);
            self.data_cost += dest.len() as u64;
            if dest.is_empty() {
                return;
            }
        }
    }

    fn fill_buffer(&mut self, dest: &mut QueryBuffer) -> bool {
        loop {
            dest.reset();
            let Some(source) = self.sources.get_mut(self.current) else {
                return false;
            };
            source.read(dest);
            if !dest.is_empty() {
                return true;
            }
            if !source.has_more() {
                self.current += 1;
                if self.current >= self.sources.len() {
                    return false;
                }
            }
        }
    }

    /// Number of candidate evaluations performed by the filters so far.
    pub fn data_cost(&self) -> u64 {
        self.data_cost
    }

    pub fn describe(&self) -> String {
        let sources: Vec<String> = self.sources.iter().map(|s| s.describe()).collect();
        let filters: Vec<String> = self.filters.iter().map(|f| f.describe()).collect();
        format!(
            "IndexQuery[sources={}; filters={}]",
            sources.join(","),
            filters.join(",")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{EmptyEntrySource, Predicate};

    struct VecSource {
        values: Vec<u64>,
        pos: usize,
    }

    impl EntrySource for VecSource {
        fn read(&mut self, buffer: &mut QueryBuffer) {
            let spare = buffer.spare_mut();
            let take = spare.len().min(self.values.len() - self.pos);
            spare[..take].copy_from_slice(&self.values[self.pos..self.pos + take]);
            buffer.advance_end(take);
            self.pos += take;
        }

        fn has_more(&self) -> bool {
            self.pos < self.values.len()
        }

        fn index_name(&self) -> &str {
            "test"
        }

        fn describe(&self) -> String {
            "Vec".to_string()
        }
    }

    fn source(values: Vec<u64>) -> Box<dyn EntrySource> {
        Box::new(VecSource { values, pos: 0 })
    }

    fn drain(query: &mut IndexQuery, capacity: usize) -> Vec<u64> {
        let mut buffer = QueryBuffer::new(capacity);
        let mut out = Vec::new();
        while query.has_more() {
            query.get_more_results(&mut buffer);
            out.extend_from_slice(buffer.values());
        }
        out
    }

    #[test]
    fn test_reads_sources_in_order() {
        let mut query = IndexQuery::new(vec![
            source(vec![1, 2, 3]),
            Box::new(EmptyEntrySource::new("test", 7)),
            source(vec![10, 11]),
        ]);
        assert_eq!(drain(&mut query, 2), vec![1, 2, 3, 10, 11]);
        assert!(!query.has_more());
    }

    #[test]
    fn test_filters_apply_per_fill() {
        let mut query = IndexQuery::new(vec![source((1..=20).collect())]);
        query.add_inclusion_filter(Box::new(Predicate::new("odd", 1.0, |v| v % 2 == 1)));
        query.add_inclusion_filter(Box::new(Predicate::new("gt10", 1.0, |v| v > 10)));
        assert_eq!(drain(&mut query, 4), vec![11, 13, 15, 17, 19]);
        assert!(query.data_cost() > 0);
    }

    #[test]
    fn test_no_sources() {
        let mut query = IndexQuery::new(vec![]);
        assert!(!query.has_more());
        let mut buffer = QueryBuffer::new(4);
        query.get_more_results(&mut buffer);
        assert!(buffer.is_empty());
    }
}
