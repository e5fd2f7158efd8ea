//! Spans file encodings.
//!
//! A spans file is a sequence of per-document records followed by a footer
//! that pads the file to a page boundary and ends with the magic `PSPN` and a
//! `u32` version ordinal:
//!
//! ```text
//! record := count:u8 { zone:u8 len:u16 payload }*
//! ```
//!
//! In the plain encoding `len` counts the `u32` values of the payload. In
//! the compressed encoding `len` is the payload's byte length, and the
//! payload is a gamma-coded value count followed by gamma-coded start
//! deltas and span lengths. The compressed encoding is only read.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{PilumError, Result};
use crate::forward::spans::DocumentSpans;
use crate::util::{BitReader, BitWriter};

pub const SPANS_PAGE_SIZE: usize = 4096;
pub const SPANS_MAGIC: &[u8; 4] = b"PSPN";
const TRAILER_SIZE: usize = 8;

const SIZE_BITS: u32 = 28;
const SIZE_MASK: u64 = (1 << SIZE_BITS) - 1;
/// Largest record a spans offset can address.
pub const MAX_RECORD_SIZE: usize = SIZE_MASK as usize;
/// Largest record start a spans offset can address.
pub const MAX_START: u64 = u64::MAX >> SIZE_BITS;

/// Pack a record's byte offset and size into one long.
pub fn encode_offset(start: u64, size: usize) -> u64 {
    (start << SIZE_BITS) | (size as u64 & SIZE_MASK)
}

pub fn decode_start(encoded: u64) -> u64 {
    encoded >> SIZE_BITS
}

pub fn decode_size(encoded: u64) -> usize {
    (encoded & SIZE_MASK) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpansVersion {
    Compressed,
    Plain,
}

impl SpansVersion {
    pub fn ordinal(self) -> u32 {
        match self {
            SpansVersion::Compressed => 0,
            SpansVersion::Plain => 1,
        }
    }

    pub fn from_ordinal(ordinal: u32) -> Result<Self> {
        match ordinal {
            0 => Ok(SpansVersion::Compressed),
            1 => Ok(SpansVersion::Plain),
            v => Err(PilumError::unsupported_version(format!("spans file version {v}"))),
        }
    }
}

/// Footer bytes for a file whose records occupy `data_len` bytes.
pub fn footer(data_len: u64, version: SpansVersion) -> Vec<u8> {
    let page = SPANS_PAGE_SIZE as u64;
    let end = (data_len + TRAILER_SIZE as u64).div_ceil(page) * page;
    let mut footer = vec![0u8; (end - data_len) as usize];
    let trailer = footer.len() - TRAILER_SIZE;
    footer[trailer..trailer + 4].copy_from_slice(SPANS_MAGIC);
    LittleEndian::write_u32(&mut footer[trailer + 4..], version.ordinal());
    footer
}

/// Read the version from the footer at the end of `bytes`.
pub fn read_footer(bytes: &[u8]) -> Result<SpansVersion> {
    if bytes.len() < SPANS_PAGE_SIZE || bytes.len() % SPANS_PAGE_SIZE != 0 {
        return Err(PilumError::corruption(format!(
            "spans file of {}b is not page aligned",
            bytes.len()
        )));
    }
    let trailer = &bytes[bytes.len() - TRAILER_SIZE..];
    if &trailer[..4] != SPANS_MAGIC {
        return Err(PilumError::corruption("spans file magic mismatch"));
    }
    SpansVersion::from_ordinal(LittleEndian::read_u32(&trailer[4..]))
}

/// Whether `starts_ends` is a well formed interlaced span sequence.
pub fn is_valid_sequence(starts_ends: &[u32]) -> bool {
    if starts_ends.len() % 2 != 0 {
        return false;
    }
    let mut last_start = 0;
    for pair in starts_ends.chunks_exact(2) {
        if pair[0] < last_start || pair[1] < pair[0] {
            return false;
        }
        last_start = pair[0];
    }
    true
}

fn check_group_count(groups: usize) -> Result<()> {
    if groups > u8::MAX as usize {
        return Err(PilumError::invalid_argument(format!(
            "{groups} span groups exceed the per-document limit"
        )));
    }
    Ok(())
}

/// Append a plain record for `groups` of `(zone code, starts_ends)`.
pub fn encode_plain(groups: &[(u8, &[u32])], out: &mut Vec<u8>) -> Result<()> {
    check_group_count(groups.len())?;
    out.push(groups.len() as u8);
    for &(zone, values) in groups {
        if values.len() > u16::MAX as usize || !is_valid_sequence(values) {
            return Err(PilumError::invalid_argument(format!(
                "malformed span group for zone {zone}"
            )));
        }
        out.push(zone);
        let mut len = [0u8; 2];
        LittleEndian::write_u16(&mut len, values.len() as u16);
        out.extend_from_slice(&len);
        for &v in values {
            let mut word = [0u8; 4];
            LittleEndian::write_u32(&mut word, v);
            out.extend_from_slice(&word);
        }
    }
    Ok(())
}

pub fn decode_plain(bytes: &[u8]) -> Result<DocumentSpans> {
    let mut spans = DocumentSpans::default();
    let (&count, mut rest) = bytes
        .split_first()
        .ok_or_else(|| PilumError::corruption("empty spans record"))?;

    for _ in 0..count {
        if rest.len() < 3 {
            return Err(PilumError::corruption("truncated span group header"));
        }
        let zone = rest[0];
        let len = LittleEndian::read_u16(&rest[1..3]) as usize;
        rest = &rest[3..];
        if rest.len() < len * 4 {
            return Err(PilumError::corruption("truncated span group"));
        }
        let values = (0..len)
            .map(|i| LittleEndian::read_u32(&rest[i * 4..]))
            .collect();
        spans.accept(zone, values);
        rest = &rest[len * 4..];
    }
    Ok(spans)
}

/// Append a compressed record. Kept for producing legacy fixtures.
pub fn encode_compressed(groups: &[(u8, &[u32])], out: &mut Vec<u8>) -> Result<()> {
    check_group_count(groups.len())?;
    out.push(groups.len() as u8);
    for &(zone, values) in groups {
        if !is_valid_sequence(values) {
            return Err(PilumError::invalid_argument(format!(
                "malformed span group for zone {zone}"
            )));
        }
        let mut bits = BitWriter::new();
        bits.put_gamma(values.len() as u64 + 1)?;
        let mut prev_start = 0u32;
        for pair in values.chunks_exact(2) {
            bits.put_gamma((pair[0] - prev_start) as u64 + 1)?;
            bits.put_gamma((pair[1] - pair[0]) as u64 + 1)?;
            prev_start = pair[0];
        }
        let payload = bits.into_bytes();
        if payload.len() > u16::MAX as usize {
            return Err(PilumError::invalid_argument(format!(
                "span group for zone {zone} too large"
            )));
        }

        out.push(zone);
        let mut len = [0u8; 2];
        LittleEndian::write_u16(&mut len, payload.len() as u16);
        out.extend_from_slice(&len);
        out.extend_from_slice(&payload);
    }
    Ok(())
}

pub fn decode_compressed(bytes: &[u8]) -> Result<DocumentSpans> {
    let mut spans = DocumentSpans::default();
    let (&count, mut rest) = bytes
        .split_first()
        .ok_or_else(|| PilumError::corruption("empty spans record"))?;

    for _ in 0..count {
        if rest.len() < 3 {
            return Err(PilumError::corruption("truncated span group header"));
        }
        let zone = rest[0];
        let len = LittleEndian::read_u16(&rest[1..3]) as usize;
        rest = &rest[3..];
        let payload = rest
            .get(..len)
            .ok_or_else(|| PilumError::corruption("truncated span group"))?;

        let mut bits = BitReader::new(payload);
        let n = (bits.get_gamma()? - 1) as usize;
        let mut values = Vec::with_capacity(n.min(payload.len() * 8));
        let mut start = 0u32;
        for _ in 0..n / 2 {
            let delta = (bits.get_gamma()? - 1) as u32;
            let span_len = (bits.get_gamma()? - 1) as u32;
            start = start
                .checked_add(delta)
                .ok_or_else(|| PilumError::corruption("span start overflows"))?;
            let end = start
                .checked_add(span_len)
                .ok_or_else(|| PilumError::corruption("span end overflows"))?;
            values.push(start);
            values.push(end);
        }
        spans.accept(zone, values);
        rest = &rest[len..];
    }
    Ok(spans)
}
