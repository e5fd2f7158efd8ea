//! Append-only store of per-term position lists.
//!
//! Each record is `term_meta:u8` followed by a delta-coded ascending list of
//! positions. A record is referenced by a single long packing its byte
//! offset and size, which becomes the posting metadata in the full tier.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::debug;
use parking_lot::Mutex;

use crate::error::{PilumError, Result};
use crate::storage::{MappedFile, StructWriter};
use crate::util::varint;

const OFFSET_BITS: u32 = 48;
const OFFSET_MASK: u64 = (1 << OFFSET_BITS) - 1;
const MAX_RECORD_SIZE: usize = u16::MAX as usize;

/// Pack a record offset and size into a reference long. A reference of 0
/// means "no positions".
pub fn encode_reference(offset: u64, size: usize) -> u64 {
    ((size as u64) << OFFSET_BITS) | (offset & OFFSET_MASK)
}

pub fn reference_offset(reference: u64) -> u64 {
    reference & OFFSET_MASK
}

pub fn reference_size(reference: u64) -> usize {
    (reference >> OFFSET_BITS) as usize
}

/// The decoded contents of a positions record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermPositions {
    pub term_meta: u8,
    pub positions: Vec<u32>,
}

/// Writer shared by all construction threads.
pub struct PositionsWriter {
    inner: Mutex<StructWriter<BufWriter<File>>>,
}

impl PositionsWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            PilumError::storage(format!("Failed to create {}: {e}", path.display()))
        })?;
        Ok(PositionsWriter {
            inner: Mutex::new(StructWriter::new(BufWriter::new(file))),
        })
    }

    /// Append a record and return its reference.
    ///
    /// Lists too long for one record are truncated to the longest prefix that
    /// fits.
    pub fn write(&self, term_meta: u8, positions: &[u32]) -> Result<u64> {
        let mut record = Vec::with_capacity(2 + positions.len() * 2);
        let mut kept = positions.len();
        loop {
            record.clear();
            record.push(term_meta);
            varint::encode_ascending(&positions[..kept], &mut record)?;
            if record.len() <= MAX_RECORD_SIZE {
                break;
            }
            // Shrink proportionally, at least one element per round.
            kept = (kept * MAX_RECORD_SIZE / record.len()).min(kept - 1);
        }
        if kept < positions.len() {
            debug!(
                "Truncated positions list from {} to {} entries",
                positions.len(),
                kept
            );
        }

        let mut writer = self.inner.lock();
        let offset = writer.position();
        writer.write_raw(&record)?;
        Ok(encode_reference(offset, record.len()))
    }

    /// Flush all buffered records and close the file.
    pub fn finish(self) -> Result<u64> {
        let writer = self.inner.into_inner();
        let size = writer.position();
        let file = writer.into_inner()?;
        file.get_ref().sync_all()?;
        Ok(size)
    }
}

/// Random-access reader over a positions file.
#[derive(Debug, Clone)]
pub struct PositionsReader {
    data: MappedFile,
}

impl PositionsReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(PositionsReader {
            data: MappedFile::open(path)?,
        })
    }

    pub fn get(&self, reference: u64) -> Result<TermPositions> {
        if reference == 0 {
            return Ok(TermPositions::default());
        }
        let offset = reference_offset(reference) as usize;
        let size = reference_size(reference);
        let bytes = self
            .data
            .as_bytes()
            .get(offset..offset + size)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                PilumError::corruption(format!("positions reference {reference:#x} out of bounds"))
            })?;

        let (positions, _) = varint::decode_ascending(&bytes[1..])?;
        Ok(TermPositions {
            term_meta: bytes[0],
            positions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_reference_packing() {
        let reference = encode_reference(123_456_789, 77);
        assert_eq!(reference_offset(reference), 123_456_789);
        assert_eq!(reference_size(reference), 77);
    }

    #[test]
    fn test_write_and_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.dat");

        let writer = PositionsWriter::create(&path).unwrap();
        let a = writer.write(3, &[1, 4, 9]).unwrap();
        let b = writer.write(0, &[]).unwrap();
        let c = writer.write(128, &[100_000]).unwrap();
        writer.finish().unwrap();

        let reader = PositionsReader::open(&path).unwrap();
        assert_eq!(
            reader.get(a).unwrap(),
            TermPositions {
                term_meta: 3,
                positions: vec![1, 4, 9]
            }
        );
        assert!(reader.get(b).unwrap().positions.is_empty());
        assert_eq!(reader.get(c).unwrap().term_meta, 128);
        assert_eq!(reader.get(0).unwrap(), TermPositions::default());
    }

    #[test]
    fn test_oversized_list_is_truncated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.dat");
        let writer = PositionsWriter::create(&path).unwrap();

        // Deltas of 1000 take two bytes each, so this needs ~80k bytes.
        let positions: Vec<u32> = (0..40_000).map(|i| i * 1000).collect();
        let reference = writer.write(1, &positions).unwrap();
        writer.finish().unwrap();

        assert!(reference_size(reference) <= u16::MAX as usize);
        let decoded = PositionsReader::open(&path).unwrap().get(reference).unwrap();
        assert!(!decoded.positions.is_empty());
        assert_eq!(decoded.positions[..], positions[..decoded.positions.len()]);
    }

    #[test]
    fn test_concurrent_writers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.dat");
        let writer = Arc::new(PositionsWriter::create(&path).unwrap());

        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    (0..50u32)
                        .map(|i| (t * 1000 + i, writer.write(1, &[t * 1000 + i]).unwrap()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let written: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        Arc::try_unwrap(writer).ok().unwrap().finish().unwrap();

        let reader = PositionsReader::open(&path).unwrap();
        for (value, reference) in written {
            assert_eq!(reader.get(reference).unwrap().positions, vec![value]);
        }
    }
}
