//! Static, bulk-loaded B-tree mapping `u64` keys to `u64` values.
//!
//! Used for the words file (term id to docs-file offset). The layout is a
//! sequence of little-endian longs:
//!
//! ```text
//! [MAGIC, n, depth] [index layers, root first] [key, value]*n
//! ```
//!
//! Data is split into blocks of [`FANOUT`] pairs. The bottom index layer
//! holds the largest key of each data block, and each layer above holds the
//! largest key of each block of [`FANOUT`] entries of the layer below. The
//! root layer has at most [`FANOUT`] entries.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PilumError, Result};
use crate::storage::StructWriter;

pub const FANOUT: usize = 256;
pub const BTREE_MAGIC: u64 = 0x5049_4C55_4D42_5431; // "PILUMBT1"
const HEADER_LONGS: usize = 3;

/// Sizes of the index layers for `n` entries, root first.
fn layer_sizes(n: usize) -> Vec<usize> {
    let mut sizes = Vec::new();
    let mut below = n;
    while below > FANOUT {
        below = below.div_ceil(FANOUT);
        sizes.push(below);
    }
    sizes.reverse();
    sizes
}

/// Size in longs of a tree with `n` entries.
pub fn calculate_size(n: usize) -> usize {
    HEADER_LONGS + layer_sizes(n).iter().sum::<usize>() + 2 * n
}

/// Write a tree over `entries`, whose keys must be strictly ascending.
/// Returns the number of bytes written.
pub fn write_btree<W: Write>(out: W, entries: &[(u64, u64)]) -> Result<u64> {
    if entries.windows(2).any(|w| w[0].0 >= w[1].0) {
        return Err(PilumError::invariant("btree keys not strictly ascending"));
    }

    let n = entries.len();
    let mut writer = StructWriter::new(out);
    let sizes = layer_sizes(n);

    writer.write_u64(BTREE_MAGIC)?;
    writer.write_u64(n as u64)?;
    writer.write_u64(sizes.len() as u64)?;

    // Each layer entry covers FANOUT^(levels below + 1) data entries.
    let depth = sizes.len();
    for (level, &size) in sizes.iter().enumerate() {
        let span = FANOUT.pow((depth - level) as u32);
        for i in 0..size {
            let last = ((i + 1) * span).min(n) - 1;
            writer.write_u64(entries[last].0)?;
        }
    }

    for &(key, value) in entries {
        writer.write_u64(key)?;
        writer.write_u64(value)?;
    }

    let written = writer.position();
    if written as usize != calculate_size(n) * 8 {
        return Err(PilumError::invariant(format!(
            "btree of {n} entries took {written}b, expected {}b",
            calculate_size(n) * 8
        )));
    }
    writer.into_inner()?;
    Ok(written)
}

/// Reader over a tree written by [`write_btree`].
#[derive(Debug, Clone)]
pub struct BTreeReader<D: AsRef<[u8]>> {
    data: D,
    n: usize,
    /// Start (in longs) and length of each index layer, root first.
    layers: Vec<(usize, usize)>,
    data_start: usize,
}

impl<D: AsRef<[u8]>> BTreeReader<D> {
    pub fn new(data: D) -> Result<Self> {
        let bytes = data.as_ref();
        if bytes.len() < HEADER_LONGS * 8 {
            return Err(PilumError::corruption("btree file too short"));
        }
        if LittleEndian::read_u64(&bytes[0..8]) != BTREE_MAGIC {
            return Err(PilumError::corruption("btree magic mismatch"));
        }
        let n = LittleEndian::read_u64(&bytes[8..16]) as usize;
        if n > bytes.len() || calculate_size(n) * 8 != bytes.len() {
            return Err(PilumError::corruption(format!(
                "btree of {n} entries does not match file size {}",
                bytes.len()
            )));
        }
        let depth = LittleEndian::read_u64(&bytes[16..24]) as usize;
        let sizes = layer_sizes(n);
        if depth != sizes.len() {
            return Err(PilumError::corruption(format!(
                "btree depth {depth}, expected {}",
                sizes.len()
            )));
        }

        let mut layers = Vec::with_capacity(depth);
        let mut start = HEADER_LONGS;
        for size in sizes {
            layers.push((start, size));
            start += size;
        }

        Ok(BTreeReader {
            data,
            n,
            layers,
            data_start: start,
        })
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    #[inline]
    fn long(&self, index: usize) -> u64 {
        let pos = index * 8;
        LittleEndian::read_u64(&self.data.as_ref()[pos..pos + 8])
    }

    /// Index of the first entry in `[start + lo, start + hi)` that is `>= key`.
    fn lower_bound(&self, start: usize, lo: usize, hi: usize, key: u64) -> Option<usize> {
        let (mut lo, mut hi_) = (lo, hi);
        while lo < hi_ {
            let mid = (lo + hi_) / 2;
            if self.long(start + mid) < key {
                lo = mid + 1;
            } else {
                hi_ = mid;
            }
        }
        (lo < hi).then_some(lo)
    }

    /// Look up the value for `key`.
    pub fn find(&self, key: u64) -> Option<u64> {
        if self.n == 0 {
            return None;
        }

        let mut block = 0usize;
        for &(start, size) in &self.layers {
            let lo = block * FANOUT;
            let hi = (lo + FANOUT).min(size);
            block = self.lower_bound(start, lo, hi, key)?;
        }

        let lo = block * FANOUT;
        let hi = (lo + FANOUT).min(self.n);
        let (mut lo, mut hi) = (lo, hi);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let k = self.long(self.data_start + 2 * mid);
            if k < key {
                lo = mid + 1;
            } else if k > key {
                hi = mid;
            } else {
                return Some(self.long(self.data_start + 2 * mid + 1));
            }
        }
        None
    }

    /// All entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.n).map(move |i| {
            (
                self.long(self.data_start + 2 * i),
                self.long(self.data_start + 2 * i + 1),
            )
        })
    }
}
