//! Index journal: the sequential input from which indexes are built.
//!
//! A journal file holds one record per document naming its id, document
//! level metadata, the terms it contains (with per-term flags and positions)
//! and its structural spans.
//!
//! File layout: magic `PJRN`, a `u32` version, then records back to back:
//!
//! ```text
//! doc_id:varint doc_meta:u64 features:u32 size:u32
//! term_count:varint { term_id:u64 meta:u8 positions:delta-list }*
//! span_count:varint { zone:u8 len:varint value:varint* }*
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PilumError, Result};
use crate::storage::{StructReader, StructWriter};
use crate::util::varint;

pub const JOURNAL_MAGIC: &[u8; 4] = b"PJRN";
pub const JOURNAL_VERSION: u32 = 1;
pub const JOURNAL_EXTENSION: &str = "journal";

/// One term occurrence within a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalTerm {
    pub term_id: u64,
    /// Term flag byte, see [`crate::model::term_flags`].
    #[serde(default)]
    pub meta: u8,
    /// Ascending word positions of the term within the document.
    #[serde(default)]
    pub positions: Vec<u32>,
}

/// The spans of one structural zone, as interlaced start/end offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSpan {
    pub zone: u8,
    pub starts_ends: Vec<u32>,
}

/// Everything the index learns about one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub doc_id: u64,
    #[serde(default)]
    pub doc_meta: u64,
    #[serde(default)]
    pub features: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(default)]
    pub terms: Vec<JournalTerm>,
    #[serde(default)]
    pub spans: Vec<JournalSpan>,
}

/// Appends records to a journal file.
pub struct JournalWriter {
    writer: StructWriter<BufWriter<File>>,
    path: PathBuf,
    records: u64,
}

impl JournalWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| {
            PilumError::journal(format!("Failed to create {}: {e}", path.display()))
        })?;
        let mut writer = StructWriter::new(BufWriter::new(file));
        writer.write_raw(JOURNAL_MAGIC)?;
        writer.write_u32(JOURNAL_VERSION)?;

        Ok(JournalWriter {
            writer,
            path,
            records: 0,
        })
    }

    pub fn append(&mut self, record: &JournalRecord) -> Result<()> {
        let w = &mut self.writer;
        w.write_varint(record.doc_id)?;
        w.write_u64(record.doc_meta)?;
        w.write_u32(record.features)?;
        w.write_u32(record.size)?;

        w.write_varint(record.terms.len() as u64)?;
        let mut positions = Vec::new();
        for term in &record.terms {
            w.write_u64(term.term_id)?;
            w.write_u8(term.meta)?;
            positions.clear();
            varint::encode_ascending(&term.positions, &mut positions)?;
            w.write_raw(&positions)?;
        }

        w.write_varint(record.spans.len() as u64)?;
        for span in &record.spans {
            if span.starts_ends.len() % 2 != 0 {
                return Err(PilumError::invalid_argument(format!(
                    "document {}: zone {} has an odd number of span offsets",
                    record.doc_id, span.zone
                )));
            }
            w.write_u8(span.zone)?;
            w.write_varint(span.starts_ends.len() as u64)?;
            for &value in &span.starts_ends {
                w.write_varint(value as u64)?;
            }
        }

        self.records += 1;
        Ok(())
    }

    /// Flush the journal and return the number of records written.
    pub fn finish(self) -> Result<u64> {
        let mut inner = self.writer.into_inner()?;
        std::io::Write::flush(&mut inner)?;
        inner
            .get_ref()
            .sync_all()
            .map_err(|e| PilumError::journal(format!("{}: {e}", self.path.display())))?;
        Ok(self.records)
    }
}

/// A journal file on disk. Each call to [`IndexJournal::records`] starts a
/// fresh sequential pass.
#[derive(Debug, Clone)]
pub struct IndexJournal {
    path: PathBuf,
}

impl IndexJournal {
    /// Open a journal, validating its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let journal = IndexJournal {
            path: path.as_ref().to_path_buf(),
        };
        journal.reader()?;
        Ok(journal)
    }

    /// All `*.journal` files in `dir`, in file name order.
    pub fn find_all<P: AsRef<Path>>(dir: P) -> Result<Vec<IndexJournal>> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| {
            PilumError::journal(format!("Cannot list journal dir {}: {e}", dir.display()))
        })? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == JOURNAL_EXTENSION) {
                paths.push(path);
            }
        }
        paths.sort();
        paths.into_iter().map(IndexJournal::open).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<StructReader<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|e| {
            PilumError::journal(format!("Failed to open {}: {e}", self.path.display()))
        })?;
        let mut reader = StructReader::new(BufReader::new(file));

        let magic = reader
            .read_raw(4)
            .map_err(|_| PilumError::journal(format!("{} is truncated", self.path.display())))?;
        if magic != JOURNAL_MAGIC {
            return Err(PilumError::journal(format!(
                "{} is not a journal file",
                self.path.display()
            )));
        }
        let version = reader.read_u32()?;
        if version != JOURNAL_VERSION {
            return Err(PilumError::journal(format!(
                "{} has unsupported journal version {version}",
                self.path.display()
            )));
        }
        Ok(reader)
    }

    /// Sequential iterator over all records.
    pub fn records(&self) -> Result<JournalRecords<BufReader<File>>> {
        Ok(JournalRecords {
            reader: self.reader()?,
            path: self.path.clone(),
            failed: false,
        })
    }
}

/// Iterator over the records of one journal. Stops after the first error.
pub struct JournalRecords<R: BufRead> {
    reader: StructReader<R>,
    path: PathBuf,
    failed: bool,
}

impl<R: BufRead> JournalRecords<R> {
    fn read_record(&mut self) -> Result<JournalRecord> {
        let r = &mut self.reader;
        let doc_id = r.read_varint()?;
        let doc_meta = r.read_u64()?;
        let features = r.read_u32()?;
        let size = r.read_u32()?;

        let term_count = r.read_varint()? as usize;
        let mut terms = Vec::with_capacity(term_count.min(1 << 16));
        for _ in 0..term_count {
            let term_id = r.read_u64()?;
            let meta = r.read_u8()?;
            let count = r.read_varint()? as usize;
            let mut positions = Vec::with_capacity(count.min(1 << 16));
            let mut prev = 0u32;
            for _ in 0..count {
                prev = prev
                    .checked_add(r.read_varint_u32()?)
                    .ok_or_else(|| PilumError::corruption("position overflows u32"))?;
                positions.push(prev);
            }
            terms.push(JournalTerm {
                term_id,
                meta,
                positions,
            });
        }

        let span_count = r.read_varint()? as usize;
        let mut spans = Vec::with_capacity(span_count.min(256));
        for _ in 0..span_count {
            let zone = r.read_u8()?;
            let len = r.read_varint()? as usize;
            let mut starts_ends = Vec::with_capacity(len.min(1 << 16));
            for _ in 0..len {
                starts_ends.push(r.read_varint_u32()?);
            }
            spans.push(JournalSpan { zone, starts_ends });
        }

        Ok(JournalRecord {
            doc_id,
            doc_meta,
            features,
            size,
            terms,
            spans,
        })
    }
}

impl<R: BufRead> Iterator for JournalRecords<R> {
    type Item = Result<JournalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.reader.is_eof() {
            Ok(true) => return None,
            Ok(false) => {}
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        }

        let offset = self.reader.position();
        match self.read_record() {
            Ok(record) => Some(Ok(record)),
            Err(e) => {
                self.failed = true;
                Some(Err(PilumError::journal(format!(
                    "{}: malformed record at byte {offset}: {e}",
                    self.path.display()
                ))))
            }
        }
    }
}

/// Convert JSON lines (one [`JournalRecord`] per line) into a journal file.
/// Blank lines are skipped. Returns the number of records written.
pub fn import_json_lines<R: BufRead, P: AsRef<Path>>(input: R, output: P) -> Result<u64> {
    let mut writer = JournalWriter::create(output)?;
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecord = serde_json::from_str(&line).map_err(|e| {
            PilumError::journal(format!("line {}: invalid record: {e}", line_no + 1))
        })?;
        writer.append(&record)?;
    }
    writer.finish()
}
