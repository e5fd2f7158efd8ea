//! Reads the spans file of a forward index, in whichever encoding its
//! footer names.

use std::path::Path;

use crate::error::{PilumError, Result};
use crate::forward::spans::DocumentSpans;
use crate::forward::spans_codec::{self, SpansVersion, decode_size, decode_start};
use crate::storage::MappedFile;

#[derive(Debug, Clone)]
pub enum SpansReader {
    Plain(MappedFile),
    Compressed(MappedFile),
}

impl SpansReader {
    /// Map the file and pick the decoder from its footer. Unknown versions
    /// fail here rather than at read time.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = MappedFile::open(path)?;
        match spans_codec::read_footer(data.as_bytes())? {
            SpansVersion::Plain => Ok(SpansReader::Plain(data)),
            SpansVersion::Compressed => Ok(SpansReader::Compressed(data)),
        }
    }

    pub fn version(&self) -> SpansVersion {
        match self {
            SpansReader::Plain(_) => SpansVersion::Plain,
            SpansReader::Compressed(_) => SpansVersion::Compressed,
        }
    }

    /// Decode the record at the encoded offset `encoded`.
    pub fn read(&self, encoded: u64) -> Result<DocumentSpans> {
        let (data, decode): (&MappedFile, fn(&[u8]) -> Result<DocumentSpans>) = match self {
            SpansReader::Plain(data) => (data, spans_codec::decode_plain),
            SpansReader::Compressed(data) => (data, spans_codec::decode_compressed),
        };

        let size = decode_size(encoded);
        if size == 0 {
            return Ok(DocumentSpans::default());
        }
        let start = decode_start(encoded) as usize;
        let bytes = data.as_bytes().get(start..start + size).ok_or_else(|| {
            PilumError::corruption(format!("spans record at {start}+{size} out of bounds"))
        })?;
        decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::spans::Zone;
    use crate::forward::spans_codec::{encode_compressed, encode_offset, footer};
    use crate::forward::spans_writer::SpansWriter;
    use crate::journal::JournalSpan;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read_plain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fwd-spans.dat");
        let mut writer = SpansWriter::create(&path).unwrap();
        let a = writer
            .write_document(
                1,
                &[
                    JournalSpan { zone: b't', starts_ends: vec![0, 4] },
                    JournalSpan { zone: b'h', starts_ends: vec![9, 3] },
                ],
            )
            .unwrap();
        let b = writer
            .write_document(2, &[JournalSpan { zone: b'c', starts_ends: vec![5, 50, 60, 70] }])
            .unwrap();
        let size = writer.finish().unwrap();
        assert_eq!(size % 4096, 0);

        let reader = SpansReader::open(&path).unwrap();
        assert_eq!(reader.version(), SpansVersion::Plain);

        let spans = reader.read(a).unwrap();
        assert!(spans.get(Zone::Title).contains_position(3));
        assert!(spans.get(Zone::Heading).is_empty());

        let spans = reader.read(b).unwrap();
        assert_eq!(spans.get(Zone::Code).size(), 2);
        assert!(reader.read(0).unwrap().is_empty());
    }

    #[test]
    fn test_read_legacy_compressed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.dat");

        let mut data = Vec::new();
        encode_compressed(&[(b'n', &[2, 8][..])], &mut data).unwrap();
        let offset = encode_offset(0, data.len());
        let len = data.len() as u64;
        data.extend_from_slice(&footer(len, SpansVersion::Compressed));
        std::fs::write(&path, &data).unwrap();

        let reader = SpansReader::open(&path).unwrap();
        assert_eq!(reader.version(), SpansVersion::Compressed);
        assert_eq!(reader.read(offset).unwrap().get(Zone::Nav).starts_ends(), &[2, 8]);
    }

    #[test]
    fn test_unknown_version_fails_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("future.dat");
        let mut data = footer(0, SpansVersion::Plain);
        let n = data.len();
        data[n - 4] = 9;
        std::fs::write(&path, &data).unwrap();

        assert!(matches!(
            SpansReader::open(&path),
            Err(PilumError::UnsupportedVersion(_))
        ));
    }
}
