//! On-disk postings formats: the words B-tree and the per-term skip lists.

pub mod btree;
pub mod skiplist;

pub use btree::{BTreeReader, write_btree};
pub use skiplist::{SkipListReader, SkipListWriter, run_size};
