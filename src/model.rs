//! Identifiers and bit-packed metadata shared by every index component.

use serde::{Deserialize, Serialize};

/// Codec for combined document ids.
///
/// Layout, most significant bit first: `rank:7 | domain:31 | ordinal:26`.
/// The rank occupies the top bits so that sorting by combined id orders
/// documents by rank first.
pub struct DocIdCodec;

impl DocIdCodec {
    const ORDINAL_BITS: u32 = 26;
    const DOMAIN_BITS: u32 = 31;
    const RANK_SHIFT: u32 = Self::ORDINAL_BITS + Self::DOMAIN_BITS;

    pub const ORDINAL_MASK: u64 = (1 << Self::ORDINAL_BITS) - 1;
    pub const DOMAIN_MASK: u64 = (1 << Self::DOMAIN_BITS) - 1;
    pub const RANK_MASK: u64 = 0x7F;

    pub fn encode(rank: u8, domain_id: u32, ordinal: u32) -> u64 {
        ((rank as u64 & Self::RANK_MASK) << Self::RANK_SHIFT)
            | ((domain_id as u64 & Self::DOMAIN_MASK) << Self::ORDINAL_BITS)
            | (ordinal as u64 & Self::ORDINAL_MASK)
    }

    pub fn rank(combined_id: u64) -> u8 {
        ((combined_id >> Self::RANK_SHIFT) & Self::RANK_MASK) as u8
    }

    pub fn domain_id(combined_id: u64) -> u32 {
        ((combined_id >> Self::ORDINAL_BITS) & Self::DOMAIN_MASK) as u32
    }

    pub fn ordinal(combined_id: u64) -> u32 {
        (combined_id & Self::ORDINAL_MASK) as u32
    }

    /// Strip the rank bits, leaving `domain | ordinal`.
    pub fn remove_rank(combined_id: u64) -> u64 {
        combined_id & !(Self::RANK_MASK << Self::RANK_SHIFT)
    }

    /// Lowest combined id of any document in `domain_id` with the given rank.
    /// All documents of that domain and rank fall in `[base, base | ORDINAL_MASK]`.
    pub fn domain_base(rank: u8, domain_id: u32) -> u64 {
        Self::encode(rank, domain_id, 0)
    }
}

/// Per-document metadata packed into one long.
///
/// Layout, most significant bit first: `rank:8 | year:8 | size:16 | quality:8 | flags:24`.
/// `year` is stored as an offset from [`DocumentMetadata::YEAR_BASE`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub rank: u8,
    pub year: u16,
    pub size: u16,
    pub quality: u8,
    pub flags: u32,
}

impl DocumentMetadata {
    pub const YEAR_BASE: u16 = 1970;

    pub fn encode(&self) -> u64 {
        let year = self.year.saturating_sub(Self::YEAR_BASE).min(255) as u64;
        ((self.rank as u64) << 56)
            | (year << 48)
            | ((self.size as u64) << 32)
            | ((self.quality as u64) << 24)
            | (self.flags as u64 & 0xFF_FFFF)
    }

    pub fn decode(meta: u64) -> Self {
        let year_offset = ((meta >> 48) & 0xFF) as u16;
        DocumentMetadata {
            rank: (meta >> 56) as u8,
            year: if year_offset == 0 {
                0
            } else {
                Self::YEAR_BASE + year_offset
            },
            size: ((meta >> 32) & 0xFFFF) as u16,
            quality: ((meta >> 24) & 0xFF) as u8,
            flags: (meta & 0xFF_FFFF) as u32,
        }
    }
}

/// Flag bits carried in the per-term metadata byte.
pub mod term_flags {
    pub const TITLE: u8 = 1;
    pub const SUBJECTS: u8 = 1 << 1;
    pub const NAMES: u8 = 1 << 2;
    pub const URL_DOMAIN: u8 = 1 << 3;
    pub const URL_PATH: u8 = 1 << 4;
    pub const SITE: u8 = 1 << 5;
    pub const SITE_ADJACENT: u8 = 1 << 6;
    pub const EXTERNAL_LINK: u8 = 1 << 7;
}

/// Maps raw upstream document ids to the dense ordering used in the index.
///
/// Must be injective within one index generation, and the forward and
/// reverse builds must use the same rewriter.
pub trait DocIdRewriter: Send + Sync {
    fn rewrite(&self, raw_id: u64) -> u64;
}

/// Rewriter that keeps ids unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRewriter;

impl DocIdRewriter for IdentityRewriter {
    fn rewrite(&self, raw_id: u64) -> u64 {
        raw_id
    }
}

impl<F> DocIdRewriter for F
where
    F: Fn(u64) -> u64 + Send + Sync,
{
    fn rewrite(&self, raw_id: u64) -> u64 {
        self(raw_id)
    }
}
