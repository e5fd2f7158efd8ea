//! Forward index: per-document metadata and structural spans, keyed by
//! document id.
//!
//! Three files make up a forward index:
//!
//! - `fwd-doc-id.dat`: the sorted, distinct document ids (rank removed)
//! - `fwd-doc-data.dat`: three longs per document: metadata,
//!   `features | size << 32` and the encoded offset of its spans record
//! - `fwd-spans.dat`: the spans file

pub mod converter;
pub mod reader;
pub mod spans;
pub mod spans_codec;
pub mod spans_reader;
pub mod spans_writer;

pub use converter::ForwardIndexConverter;
pub use reader::ForwardIndexReader;
pub use spans::{DocumentSpan, DocumentSpans, Zone};
pub use spans_reader::SpansReader;
pub use spans_writer::SpansWriter;

pub const DOC_ID_FILE: &str = "fwd-doc-id.dat";
pub const DOC_DATA_FILE: &str = "fwd-doc-data.dat";
pub const SPANS_FILE: &str = "fwd-spans.dat";

/// Longs per document in the data file.
pub const ENTRY_SIZE: usize = 3;
pub const METADATA_OFFSET: usize = 0;
pub const FEATURES_OFFSET: usize = 1;
pub const SPANS_OFFSET: usize = 2;
