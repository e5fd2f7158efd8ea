//! Query primitives: candidate buffers, entry sources, filter steps and the
//! [`IndexQuery`] chain that ties them together.
//!
//! A query pulls ascending document ids from its entry sources one buffer at
//! a time and narrows each buffer in place with its filter steps. Execution
//! over whole indexes lives in [`crate::index::execution`].

pub mod budget;
pub mod buffer;
pub mod entry_source;
pub mod filter;
pub mod index_query;
pub mod params;
pub mod search_query;

pub use budget::SearchBudget;
pub use buffer::QueryBuffer;
pub use entry_source::{EmptyEntrySource, EntrySource};
pub use filter::{AllOf, AnyOf, LetThrough, NoPass, Predicate, QueryFilterStep};
pub use index_query::IndexQuery;
pub use params::{ParamMatchingFilter, QueryParams, SpecificationLimit};
pub use search_query::SearchQuery;
