//! Skip-list postings runs.
//!
//! A run stores the ascending `(key, value)` pairs of one term as a chain of
//! fixed-stride blocks. Each block starts with a 16 byte header:
//!
//! ```text
//! n:u32  fc:u8  flags:u8  reserved:u16  remaining:u64
//! ```
//!
//! followed by `fc` forward pointers, `n` keys and `n` values, all
//! little-endian `u64`. Forward pointer `i` of block `b` holds the largest key
//! of block `b + 2^i`, so a lookup can skip every block whose largest key is
//! below the sought key without touching it. `remaining` counts the entries
//! in this block and all that follow it; in the first block it is the size of
//! the run.
//!
//! Every block but the last is padded to [`BLOCK_SIZE`] bytes. The last block
//! has no forward pointers and is not padded, so [`run_size`] is a pure
//! function of the entry count.
//!
//! Runs are concatenated into a docs file that ends with a fixed footer
//! identifying the format.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PilumError, Result};
use crate::query::QueryBuffer;
use crate::storage::StructWriter;

pub const BLOCK_SIZE: usize = 4096;
pub const HEADER_SIZE: usize = 16;
pub const MAX_FORWARD_POINTERS: usize = 8;
/// Entries in every block except the last.
pub const BLOCK_CAPACITY: usize = (BLOCK_SIZE - HEADER_SIZE - MAX_FORWARD_POINTERS * 8) / 16;

pub const FLAG_END_BLOCK: u8 = 1;

pub const FOOTER_SIZE: usize = 64;
pub const DOCS_FILE_MAGIC: &str = "skplist-docs-file";
pub const FORMAT_VERSION: u32 = 1;
const MAGIC_FIELD: usize = 32;

#[inline]
fn skip_offset(i: usize) -> usize {
    1 << i
}

/// Number of blocks in a run of `n` entries. An empty run still has one
/// (empty) block.
pub fn num_blocks(n: usize) -> usize {
    if n == 0 { 1 } else { n.div_ceil(BLOCK_CAPACITY) }
}

/// Exact size in bytes of a run of `n` entries.
pub fn run_size(n: usize) -> usize {
    let blocks = num_blocks(n);
    let last_n = n - (blocks - 1) * BLOCK_CAPACITY;
    (blocks - 1) * BLOCK_SIZE + HEADER_SIZE + 16 * last_n
}

fn forward_count(block: usize, blocks: usize) -> usize {
    (0..MAX_FORWARD_POINTERS)
        .take_while(|&i| block + skip_offset(i) < blocks)
        .count()
}

/// Writes runs followed by a footer.
pub struct SkipListWriter<W: Write> {
    out: StructWriter<W>,
    runs: u64,
}

impl<W: Write> SkipListWriter<W> {
    pub fn new(out: W) -> Self {
        SkipListWriter {
            out: StructWriter::new(out),
            runs: 0,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// Write a run of `n` entries, where `entry(j)` yields the `j`th
    /// `(key, value)` pair. Keys must be strictly ascending.
    ///
    /// Returns the byte offset of the run.
    pub fn write_run<F>(&mut self, n: usize, entry: F) -> Result<u64>
    where
        F: Fn(usize) -> (u64, u64),
    {
        let mut prev: Option<u64> = None;
        for j in 0..n {
            let key = entry(j).0;
            if prev.is_some_and(|p| key <= p) {
                return Err(PilumError::invariant(format!(
                    "skip list keys not strictly ascending at index {j}"
                )));
            }
            prev = Some(key);
        }

        let start = self.out.position();
        let blocks = num_blocks(n);

        for b in 0..blocks {
            let lo = b * BLOCK_CAPACITY;
            let hi = (lo + BLOCK_CAPACITY).min(n);
            let count = hi - lo;
            let fc = forward_count(b, blocks);
            let last = b + 1 == blocks;

            self.out.write_u32(count as u32)?;
            self.out.write_u8(fc as u8)?;
            self.out.write_u8(if last { FLAG_END_BLOCK } else { 0 })?;
            self.out.write_u16(0)?;
            self.out.write_u64((n - lo) as u64)?;

            for i in 0..fc {
                let target = b + skip_offset(i);
                let target_hi = ((target + 1) * BLOCK_CAPACITY).min(n);
                self.out.write_u64(entry(target_hi - 1).0)?;
            }
            for j in lo..hi {
                self.out.write_u64(entry(j).0)?;
            }
            for j in lo..hi {
                self.out.write_u64(entry(j).1)?;
            }
            if !last {
                self.out.pad(BLOCK_SIZE - HEADER_SIZE - fc * 8 - count * 16)?;
            }
        }

        let written = (self.out.position() - start) as usize;
        if written != run_size(n) {
            return Err(PilumError::invariant(format!(
                "run of {n} entries took {written}b, expected {}b",
                run_size(n)
            )));
        }

        self.runs += 1;
        Ok(start)
    }

    /// Write the footer and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        let data_len = self.out.position();
        let mut magic = [0u8; MAGIC_FIELD];
        magic[..DOCS_FILE_MAGIC.len()].copy_from_slice(DOCS_FILE_MAGIC.as_bytes());
        self.out.write_raw(&magic)?;
        self.out.write_u32(BLOCK_SIZE as u32)?;
        self.out.write_u32(FORMAT_VERSION)?;
        self.out.write_u64(data_len)?;
        self.out.write_u64(self.runs)?;
        self.out.pad(FOOTER_SIZE - MAGIC_FIELD - 24)?;
        self.out.into_inner()
    }
}

/// Validate the footer of a docs file and return the length of the data
/// section.
pub fn validate_footer(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < FOOTER_SIZE {
        return Err(PilumError::corruption("docs file too short for footer"));
    }
    let footer = &bytes[bytes.len() - FOOTER_SIZE..];
    let magic = &footer[..DOCS_FILE_MAGIC.len()];
    if magic != DOCS_FILE_MAGIC.as_bytes() {
        return Err(PilumError::corruption("docs file footer magic mismatch"));
    }
    let block_size = LittleEndian::read_u32(&footer[MAGIC_FIELD..]);
    let version = LittleEndian::read_u32(&footer[MAGIC_FIELD + 4..]);
    if block_size as usize != BLOCK_SIZE {
        return Err(PilumError::corruption(format!(
            "docs file block size {block_size}, expected {BLOCK_SIZE}"
        )));
    }
    if version != FORMAT_VERSION {
        return Err(PilumError::unsupported_version(format!(
            "docs file version {version}"
        )));
    }
    let data_len = LittleEndian::read_u64(&footer[MAGIC_FIELD + 8..]) as usize;
    if data_len != bytes.len() - FOOTER_SIZE {
        return Err(PilumError::corruption(format!(
            "docs file footer claims {data_len}b of data, file holds {}b",
            bytes.len() - FOOTER_SIZE
        )));
    }
    Ok(data_len)
}

#[derive(Debug, Clone, Copy)]
struct BlockHeader {
    n: usize,
    fc: usize,
}

/// Reader over one run.
///
/// Lookups (`get_values`, `retain_data`, ...) always start from the first
/// block; `read_data` advances an internal cursor.
#[derive(Debug, Clone)]
pub struct SkipListReader<D: AsRef<[u8]>> {
    data: D,
    offset: usize,
    total: usize,
    blocks: usize,
    cursor_block: usize,
    cursor_pos: usize,
    consumed: usize,
}

impl<D: AsRef<[u8]>> SkipListReader<D> {
    pub fn new(data: D, offset: usize) -> Result<Self> {
        let bytes = data.as_ref();
        if offset + HEADER_SIZE > bytes.len() {
            return Err(PilumError::corruption(format!(
                "skip list offset {offset} beyond data of {}b",
                bytes.len()
            )));
        }
        let total = LittleEndian::read_u64(&bytes[offset + 8..offset + 16]) as usize;
        if total > bytes.len() || offset + run_size(total) > bytes.len() {
            return Err(PilumError::corruption(format!(
                "skip list run at {offset} with {total} entries overruns data"
            )));
        }

        Ok(SkipListReader {
            data,
            offset,
            total,
            blocks: num_blocks(total),
            cursor_block: 0,
            cursor_pos: 0,
            consumed: 0,
        })
    }

    /// Number of entries in the run.
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[inline]
    fn u64_at(&self, pos: usize) -> u64 {
        LittleEndian::read_u64(&self.data.as_ref()[pos..pos + 8])
    }

    #[inline]
    fn base(&self, block: usize) -> usize {
        self.offset + block * BLOCK_SIZE
    }

    fn header(&self, block: usize) -> BlockHeader {
        let base = self.base(block);
        let bytes = self.data.as_ref();
        let n = LittleEndian::read_u32(&bytes[base..base + 4]) as usize;
        let fc = bytes[base + 4] as usize;
        BlockHeader {
            n: n.min(BLOCK_CAPACITY),
            fc: fc.min(MAX_FORWARD_POINTERS),
        }
    }

    #[inline]
    fn pointer(&self, block: usize, i: usize) -> u64 {
        self.u64_at(self.base(block) + HEADER_SIZE + i * 8)
    }

    #[inline]
    fn key(&self, block: usize, h: BlockHeader, j: usize) -> u64 {
        self.u64_at(self.base(block) + HEADER_SIZE + h.fc * 8 + j * 8)
    }

    #[inline]
    fn value(&self, block: usize, h: BlockHeader, j: usize) -> u64 {
        self.u64_at(self.base(block) + HEADER_SIZE + h.fc * 8 + h.n * 8 + j * 8)
    }

    /// First block at or after `from` that could contain `key`.
    fn find_block(&self, from: usize, key: u64) -> Option<usize> {
        let mut block = from;
        while block < self.blocks {
            let h = self.header(block);
            if h.n == 0 {
                return None;
            }
            if key <= self.key(block, h, h.n - 1) {
                return Some(block);
            }
            let mut next = block + 1;
            for i in 0..h.fc {
                if self.pointer(block, i) < key {
                    next = block + skip_offset(i) + 1;
                } else {
                    break;
                }
            }
            block = next;
        }
        None
    }

    fn search_block(&self, block: usize, key: u64) -> Option<usize> {
        let h = self.header(block);
        let (mut lo, mut hi) = (0usize, h.n);
        while lo < hi {
            let mid = (lo + hi) / 2;
            let k = self.key(block, h, mid);
            if k < key {
                lo = mid + 1;
            } else if k > key {
                hi = mid;
            } else {
                return Some(mid);
            }
        }
        None
    }

    pub fn get_value(&self, key: u64) -> Option<u64> {
        let block = self.find_block(0, key)?;
        let j = self.search_block(block, key)?;
        Some(self.value(block, self.header(block), j))
    }

    /// Point lookups for ascending `keys`. Absent keys map to `None`.
    pub fn get_values(&self, keys: &[u64]) -> Vec<Option<u64>> {
        let mut out = Vec::with_capacity(keys.len());
        let mut block = 0;
        for &key in keys {
            match self.find_block(block, key) {
                Some(b) => {
                    block = b;
                    let found = self
                        .search_block(b, key)
                        .map(|j| self.value(b, self.header(b), j));
                    out.push(found);
                }
                None => {
                    out.resize(keys.len(), None);
                    break;
                }
            }
        }
        out
    }

    /// Keep only buffered candidates present in the run.
    pub fn retain_data(&self, buffer: &mut QueryBuffer) {
        self.filter_buffer(buffer, true);
    }

    /// Drop buffered candidates present in the run.
    pub fn reject_data(&self, buffer: &mut QueryBuffer) {
        self.filter_buffer(buffer, false);
    }

    fn filter_buffer(&self, buffer: &mut QueryBuffer, keep_present: bool) {
        let mut block = 0;
        while buffer.has_more() {
            let key = buffer.current_value();
            match self.find_block(block, key) {
                Some(b) => {
                    block = b;
                    if self.search_block(b, key).is_some() == keep_present {
                        buffer.retain_and_advance();
                    } else {
                        buffer.reject_and_advance();
                    }
                }
                None => {
                    if keep_present {
                        buffer.reject_all_remaining();
                    } else {
                        buffer.retain_all_remaining();
                    }
                }
            }
        }
        buffer.finalize();
    }

    /// Copy the next keys into `dest`, returning how many were copied.
    pub fn read_data(&mut self, dest: &mut [u64]) -> usize {
        let mut copied = 0;
        while copied < dest.len() && self.consumed < self.total {
            let h = self.header(self.cursor_block);
            if self.cursor_pos >= h.n {
                self.cursor_block += 1;
                self.cursor_pos = 0;
                continue;
            }
            let take = (h.n - self.cursor_pos).min(dest.len() - copied);
            for k in 0..take {
                dest[copied + k] = self.key(self.cursor_block, h, self.cursor_pos + k);
            }
            copied += take;
            self.cursor_pos += take;
            self.consumed += take;
        }
        copied
    }

    /// Read the next keys into the spare space of `buffer`.
    pub fn read_into(&mut self, buffer: &mut QueryBuffer) -> usize {
        let copied = self.read_data(buffer.spare_mut());
        buffer.advance_end(copied);
        copied
    }

    pub fn has_more(&self) -> bool {
        self.consumed < self.total
    }

    /// Rewind the sequential cursor.
    pub fn reset(&mut self) {
        self.cursor_block = 0;
        self.cursor_pos = 0;
        self.consumed = 0;
    }

    /// Iterate over all `(key, value)` pairs in order.
    pub fn iter(&self) -> SkipListIter<'_, D> {
        SkipListIter {
            reader: self,
            block: 0,
            pos: 0,
            seen: 0,
        }
    }
}

pub struct SkipListIter<'a, D: AsRef<[u8]>> {
    reader: &'a SkipListReader<D>,
    block: usize,
    pos: usize,
    seen: usize,
}

impl<D: AsRef<[u8]>> Iterator for SkipListIter<'_, D> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.seen < self.reader.total {
            let h = self.reader.header(self.block);
            if self.pos < h.n {
                let item = (
                    self.reader.key(self.block, h, self.pos),
                    self.reader.value(self.block, h, self.pos),
                );
                self.pos += 1;
                self.seen += 1;
                return Some(item);
            }
            self.block += 1;
            self.pos = 0;
        }
        None
    }
}
