//! Entry sources and filter steps backed by one term's skip list.

use crate::postings::SkipListReader;
use crate::query::{EntrySource, QueryBuffer, QueryFilterStep};
use crate::storage::MappedFile;

/// Streams one term's document ids.
pub struct SkipListEntrySource {
    reader: SkipListReader<MappedFile>,
    index_name: String,
    term_id: u64,
}

impl SkipListEntrySource {
    pub fn new(reader: SkipListReader<MappedFile>, index_name: &str, term_id: u64) -> Self {
        SkipListEntrySource {
            reader,
            index_name: index_name.to_string(),
            term_id,
        }
    }
}

impl EntrySource for SkipListEntrySource {
    fn read(&mut self, buffer: &mut QueryBuffer) {
        self.reader.read_into(buffer);
    }

    fn has_more(&self) -> bool {
        self.reader.has_more()
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn describe(&self) -> String {
        format!("SkipList:{}/{}", self.index_name, self.term_id)
    }
}

/// Keeps candidates that have the term.
pub struct RetainTermFilter {
    reader: SkipListReader<MappedFile>,
    index_name: String,
    term_id: u64,
}

impl RetainTermFilter {
    pub fn new(reader: SkipListReader<MappedFile>, index_name: &str, term_id: u64) -> Self {
        RetainTermFilter {
            reader,
            index_name: index_name.to_string(),
            term_id,
        }
    }
}

impl QueryFilterStep for RetainTermFilter {
    fn apply(&self, buffer: &mut QueryBuffer) {
        self.reader.retain_data(buffer);
    }

    fn cost(&self) -> f64 {
        self.reader.len() as f64
    }

    fn describe(&self) -> String {
        format!("Retain:{}/{}", self.index_name, self.term_id)
    }
}

/// Drops candidates that have the term.
pub struct RejectTermFilter {
    reader: SkipListReader<MappedFile>,
    index_name: String,
    term_id: u64,
}

impl RejectTermFilter {
    pub fn new(reader: SkipListReader<MappedFile>, index_name: &str, term_id: u64) -> Self {
        RejectTermFilter {
            reader,
            index_name: index_name.to_string(),
            term_id,
        }
    }
}

impl QueryFilterStep for RejectTermFilter {
    fn apply(&self, buffer: &mut QueryBuffer) {
        self.reader.reject_data(buffer);
    }

    fn cost(&self) -> f64 {
        self.reader.len() as f64
    }

    fn describe(&self) -> String {
        format!("Reject:{}/{}", self.index_name, self.term_id)
    }
}
