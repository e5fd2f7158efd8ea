//! The served index: a combined reader over one generation of files, the
//! stateful slot that hot-swaps generations, and query execution.

pub mod combined;
pub mod constructor;
pub mod execution;
pub mod factory;
pub mod query_builder;
pub mod stateful;

pub use combined::CombinedIndexReader;
pub use constructor::{ConstructionReport, IndexConstructor};
pub use execution::{ExecutionStats, IndexQueryExecution};
pub use factory::{DirectoryIndexFactory, IndexFactory};
pub use query_builder::IndexQueryBuilder;
pub use stateful::{ReaderRetirer, StatefulIndex};

pub const REV_FULL_DOCS: &str = "rev-full.docs";
pub const REV_FULL_WORDS: &str = "rev-full.words";
pub const REV_PRIO_DOCS: &str = "rev-prio.docs";
pub const REV_PRIO_WORDS: &str = "rev-prio.words";
pub const POSITIONS_FILE: &str = "positions.dat";

/// Every file of one index generation.
pub const INDEX_FILES: [&str; 8] = [
    REV_FULL_DOCS,
    REV_FULL_WORDS,
    REV_PRIO_DOCS,
    REV_PRIO_WORDS,
    POSITIONS_FILE,
    crate::forward::DOC_ID_FILE,
    crate::forward::DOC_DATA_FILE,
    crate::forward::SPANS_FILE,
];
