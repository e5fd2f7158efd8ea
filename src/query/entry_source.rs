//! Entry sources: producers of ascending document ids for a query head.

/// Produces the candidate document ids of one query head, in ascending order.
pub trait EntrySource: Send {
    /// Append the next ids to the spare capacity of `buffer`.
    fn read(&mut self, buffer: &mut crate::query::QueryBuffer);

    fn has_more(&self) -> bool;

    /// Name of the index tier this source reads from.
    fn index_name(&self) -> &str;

    fn describe(&self) -> String;
}

/// A source with nothing in it, used for absent terms and unloaded indexes.
#[derive(Debug, Clone)]
pub struct EmptyEntrySource {
    index_name: String,
    term_id: u64,
}

impl EmptyEntrySource {
    pub fn new<S: Into<String>>(index_name: S, term_id: u64) -> Self {
        EmptyEntrySource {
            index_name: index_name.into(),
            term_id,
        }
    }
}

impl EntrySource for EmptyEntrySource {
    fn read(&mut self, _buffer: &mut crate::query::QueryBuffer) {}

    fn has_more(&self) -> bool {
        false
    }

    fn index_name(&self) -> &str {
        &self.index_name
    }

    fn describe(&self) -> String {
        format!("Empty:{}/{}", self.index_name, self.term_id)
    }
}
