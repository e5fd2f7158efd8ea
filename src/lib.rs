//! # Pilum
//!
//! A reverse/forward index engine for web-scale search.
//!
//! ## Features
//!
//! - Parallel, disk-backed reverse index construction from document journals
//! - Skip-list posting lists with a B-tree term dictionary, all memory mapped
//! - A priority tier of flagged terms alongside the full tier
//! - Forward index with per-document metadata and structural spans
//! - Filter-pipeline query execution under a time budget
//! - Atomic hot swap of index generations with deferred reader release

pub mod cli;
pub mod config;
pub mod error;
pub mod forward;
pub mod index;
pub mod journal;
pub mod model;
pub mod positions;
pub mod postings;
pub mod preindex;
pub mod query;
pub mod reverse;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::config::IndexConfig;
    pub use crate::error::{PilumError, Result};
    pub use crate::index::{
        CombinedIndexReader, DirectoryIndexFactory, IndexConstructor, IndexQueryExecution,
        StatefulIndex,
    };
    pub use crate::journal::{IndexJournal, JournalRecord, JournalWriter};
    pub use crate::query::{QueryParams, SearchBudget, SearchQuery};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
