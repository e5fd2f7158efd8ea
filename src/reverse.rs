//! Reverse index: term id to postings, in a priority and a full tier.
//!
//! [`construction`] turns journals into a docs/words file pair through the
//! preindex pipeline; [`reader`] serves lookups and query steps over a
//! published pair.

pub mod construction;
pub mod reader;
pub mod sources;

pub use construction::ReverseIndexConstructor;
pub use reader::ReverseIndexReader;
pub use sources::{RejectTermFilter, RetainTermFilter, SkipListEntrySource};
