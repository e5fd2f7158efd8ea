//! Posting encoders: decide which terms a tier indexes and what metadata long
//! each posting carries.

use crate::error::Result;
use crate::journal::JournalTerm;
use crate::positions::PositionsWriter;

pub trait PostingEncoder: Send + Sync {
    /// Whether `term` gets a posting in this tier.
    fn accepts(&self, term: &JournalTerm) -> bool;

    /// The metadata long stored with the posting.
    fn encode(&self, term: &JournalTerm) -> Result<u64>;
}

/// Full tier: every term is indexed and the posting metadata is a reference
/// into the positions store.
pub struct FullTierEncoder<'a> {
    positions: &'a PositionsWriter,
}

impl<'a> FullTierEncoder<'a> {
    pub fn new(positions: &'a PositionsWriter) -> Self {
        FullTierEncoder { positions }
    }
}

impl PostingEncoder for FullTierEncoder<'_> {
    fn accepts(&self, _term: &JournalTerm) -> bool {
        true
    }

    fn encode(&self, term: &JournalTerm) -> Result<u64> {
        self.positions.write(term.meta, &term.positions)
    }
}

/// Priority tier: only terms whose flag byte intersects `mask`. The posting
/// metadata is the flag byte itself.
#[derive(Debug, Clone, Copy)]
pub struct PriorityTierEncoder {
    mask: u8,
}

impl PriorityTierEncoder {
    pub fn new(mask: u8) -> Self {
        PriorityTierEncoder { mask }
    }
}

impl PostingEncoder for PriorityTierEncoder {
    fn accepts(&self, term: &JournalTerm) -> bool {
        term.meta & self.mask != 0
    }

    fn encode(&self, term: &JournalTerm) -> Result<u64> {
        Ok(term.meta as u64)
    }
}

/// Stores the flag byte for every term. Handy when positions are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermMetaEncoder;

impl PostingEncoder for TermMetaEncoder {
    fn accepts(&self, _term: &JournalTerm) -> bool {
        true
    }

    fn encode(&self, term: &JournalTerm) -> Result<u64> {
        Ok(term.meta as u64)
    }
}
