//! Utility modules for Pilum.

pub mod gamma;
pub mod varint;

pub use gamma::{BitReader, BitWriter};
