//! Storage primitives for Pilum.
//!
//! Construction works on mutable file-backed long arrays; published index
//! files are opened read-only through shared memory maps.

pub mod long_array;
pub mod mmap;
pub mod structured;

pub use long_array::LongArray;
pub use mmap::MappedFile;
pub use structured::{StructReader, StructWriter};
