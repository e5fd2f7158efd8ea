//! Word segments: the per-preindex table of terms and their posting counts.
//!
//! `word_ids` is sorted and unique; `counts` is parallel to it. The counts
//! array goes through two phases. While building and merging it holds raw
//! posting counts; [`WordSegments::counts_to_offsets`] turns it into
//! cumulative end offsets for finalization, after which it is never read as
//! counts again.

use std::path::Path;

use ahash::AHashMap;

use crate::error::{PilumError, Result};
use crate::journal::IndexJournal;
use crate::preindex::encoder::PostingEncoder;
use crate::preindex::temp_file;
use crate::storage::LongArray;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPhase {
    Counts,
    Offsets,
}

#[derive(Debug)]
pub struct WordSegments {
    pub(crate) word_ids: LongArray,
    pub(crate) counts: LongArray,
    phase: SegmentPhase,
}

impl WordSegments {
    pub fn new(word_ids: LongArray, counts: LongArray) -> Result<Self> {
        if word_ids.len() != counts.len() {
            return Err(PilumError::invariant(format!(
                "word ids ({}) and counts ({}) differ in length",
                word_ids.len(),
                counts.len()
            )));
        }
        Ok(WordSegments {
            word_ids,
            counts,
            phase: SegmentPhase::Counts,
        })
    }

    /// Count the postings each accepted term owns in `journal`.
    pub fn construct(
        journal: &IndexJournal,
        encoder: &dyn PostingEncoder,
        work_dir: &Path,
    ) -> Result<Self> {
        let mut counts: AHashMap<u64, u64> = AHashMap::new();
        for record in journal.records()? {
            let record = record?;
            for term in record.terms.iter().filter(|t| encoder.accepts(t)) {
                *counts.entry(term.term_id).or_insert(0) += 1;
            }
        }

        let mut sorted: Vec<(u64, u64)> = counts.into_iter().collect();
        sorted.sort_unstable_by_key(|&(word, _)| word);

        let mut word_ids = LongArray::create(temp_file(work_dir, "segment_words"), sorted.len())?;
        let mut counts = LongArray::create(temp_file(work_dir, "segment_counts"), sorted.len())?;
        for (i, (word, count)) in sorted.into_iter().enumerate() {
            word_ids.set(i, word);
            counts.set(i, count);
        }

        Self::new(word_ids, counts)
    }

    /// A table holding the sorted union of the terms of `left` and `right`,
    /// with all counts zero.
    pub fn create_merged(dir: &Path, left: &WordSegments, right: &WordSegments) -> Result<Self> {
        let (l, r) = (&left.word_ids, &right.word_ids);
        let distinct = count_distinct(l, r);

        let mut word_ids = LongArray::create(temp_file(dir, "segment_words"), distinct)?;
        let counts = LongArray::create(temp_file(dir, "segment_counts"), distinct)?;

        let (mut i, mut j, mut k) = (0, 0, 0);
        while i < l.len() || j < r.len() {
            let next = if j >= r.len() || (i < l.len() && l.get(i) < r.get(j)) {
                i += 1;
                l.get(i - 1)
            } else if i >= l.len() || r.get(j) < l.get(i) {
                j += 1;
                r.get(j - 1)
            } else {
                i += 1;
                j += 1;
                l.get(i - 1)
            };
            word_ids.set(k, next);
            k += 1;
        }

        Self::new(word_ids, counts)
    }

    pub fn len(&self) -> usize {
        self.word_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.word_ids.is_empty()
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    pub fn word_id(&self, index: usize) -> u64 {
        self.word_ids.get(index)
    }

    /// Total number of postings.
    pub fn total_size(&self) -> Result<u64> {
        self.require_phase(SegmentPhase::Counts)?;
        Ok(self.counts.iter().sum())
    }

    fn require_phase(&self, phase: SegmentPhase) -> Result<()> {
        if self.phase != phase {
            return Err(PilumError::invariant(format!(
                "word segments are in {:?} phase, {phase:?} required",
                self.phase
            )));
        }
        Ok(())
    }

    /// Cursor over the segments of a finished table.
    pub fn iterator(&self, record_size: usize) -> Result<SegmentIterator<'_>> {
        self.require_phase(SegmentPhase::Counts)?;
        Ok(SegmentIterator::new(self, record_size))
    }

    /// Cursor that fills in the counts of a table created by
    /// [`create_merged`](Self::create_merged).
    pub fn construction_iterator(
        &mut self,
        record_size: usize,
    ) -> Result<SegmentConstructionIterator<'_>> {
        self.require_phase(SegmentPhase::Counts)?;
        Ok(SegmentConstructionIterator {
            word_ids: &self.word_ids,
            counts: &mut self.counts,
            record_size,
            pos: 0,
            start_offset: 0,
        })
    }

    /// Replace each count with the cumulative end offset (in longs) of its
    /// segment, given records of `record_size` longs.
    pub fn counts_to_offsets(&mut self, record_size: usize) -> Result<()> {
        self.require_phase(SegmentPhase::Counts)?;
        let mut offset = 0u64;
        for i in 0..self.counts.len() {
            offset += self.counts.get(i) * record_size as u64;
            self.counts.set(i, offset);
        }
        self.phase = SegmentPhase::Offsets;
        Ok(())
    }

    /// Start and end offsets of segment `index`; only valid after
    /// [`counts_to_offsets`](Self::counts_to_offsets).
    pub fn segment_range(&self, index: usize) -> Result<(usize, usize)> {
        self.require_phase(SegmentPhase::Offsets)?;
        let start = if index == 0 {
            0
        } else {
            self.counts.get(index - 1)
        };
        Ok((start as usize, self.counts.get(index) as usize))
    }

    pub fn flush(&self) -> Result<()> {
        self.word_ids.flush()?;
        self.counts.flush()
    }

    pub fn delete(self) -> Result<()> {
        self.word_ids.delete()?;
        self.counts.delete()
    }
}

fn count_distinct(l: &LongArray, r: &LongArray) -> usize {
    let (mut i, mut j, mut distinct) = (0, 0, 0);
    while i < l.len() && j < r.len() {
        let (a, b) = (l.get(i), r.get(j));
        if a <= b {
            i += 1;
        }
        if b <= a {
            j += 1;
        }
        distinct += 1;
    }
    distinct + (l.len() - i) + (r.len() - j)
}

/// Walks the segments of a table, exposing each term's offset range in the
/// documents store.
pub struct SegmentIterator<'a> {
    segments: &'a WordSegments,
    record_size: usize,
    pos: usize,
    word_id: u64,
    start_offset: usize,
    end_offset: usize,
}

impl<'a> SegmentIterator<'a> {
    fn new(segments: &'a WordSegments, record_size: usize) -> Self {
        let mut iter = SegmentIterator {
            segments,
            record_size,
            pos: 0,
            word_id: 0,
            start_offset: 0,
            end_offset: 0,
        };
        iter.load();
        iter
    }

    fn load(&mut self) {
        if self.pos < self.segments.len() {
            self.word_id = self.segments.word_ids.get(self.pos);
            let count = self.segments.counts.get(self.pos) as usize;
            self.end_offset = self.start_offset + count * self.record_size;
        }
    }

    /// Move to the next segment; false once past the last one.
    pub fn next(&mut self) -> bool {
        self.pos += 1;
        self.start_offset = self.end_offset;
        self.load();
        self.is_position_before_end()
    }

    pub fn is_position_before_end(&self) -> bool {
        self.pos < self.segments.len()
    }

    pub fn word_id(&self) -> u64 {
        self.word_id
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn end_offset(&self) -> usize {
        self.end_offset
    }
}

/// Destination cursor of a merge: advances one term per `put_next`.
pub struct SegmentConstructionIterator<'a> {
    word_ids: &'a LongArray,
    counts: &'a mut LongArray,
    record_size: usize,
    pos: usize,
    start_offset: usize,
}

impl SegmentConstructionIterator<'_> {
    pub fn word_id(&self) -> u64 {
        self.word_ids.get(self.pos)
    }

    pub fn start_offset(&self) -> usize {
        self.start_offset
    }

    pub fn can_put_more(&self) -> bool {
        self.pos < self.word_ids.len()
    }

    /// Record `count` postings for the current term and move to the next.
    /// Returns whether there is another term to fill.
    pub fn put_next(&mut self, count: u64) -> Result<bool> {
        if !self.can_put_more() {
            return Err(PilumError::invariant("merging iterator advanced past its end"));
        }
        self.counts.set(self.pos, count);
        self.start_offset += count as usize * self.record_size;
        self.pos += 1;
        Ok(self.can_put_more())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn segments(dir: &Path, words: &[u64], counts: &[u64]) -> WordSegments {
        let mut w = LongArray::create(temp_file(dir, "w"), words.len()).unwrap();
        let mut c = LongArray::create(temp_file(dir, "c"), counts.len()).unwrap();
        for (i, (&word, &count)) in words.iter().zip(counts).enumerate() {
            w.set(i, word);
            c.set(i, count);
        }
        WordSegments::new(w, c).unwrap()
    }

    #[test]
    fn test_merged_word_union() {
        let dir = tempdir().unwrap();
        let left = segments(dir.path(), &[1, 3, 5, 9], &[1, 1, 1, 1]);
        let right = segments(dir.path(), &[2, 3, 9, 10, 11], &[1, 1, 1, 1, 1]);

        let merged = WordSegments::create_merged(dir.path(), &left, &right).unwrap();
        let words: Vec<u64> = merged.word_ids.iter().collect();
        assert_eq!(words, vec![1, 2, 3, 5, 9, 10, 11]);
        assert_eq!(merged.total_size().unwrap(), 0);
    }

    #[test]
    fn test_iterator_offsets() {
        let dir = tempdir().unwrap();
        let seg = segments(dir.path(), &[4, 8, 15], &[2, 0, 3]);
        let mut iter = seg.iterator(2).unwrap();

        assert!(iter.is_position_before_end());
        assert_eq!((iter.word_id(), iter.start_offset(), iter.end_offset()), (4, 0, 4));
        assert!(iter.next());
        assert_eq!((iter.word_id(), iter.start_offset(), iter.end_offset()), (8, 4, 4));
        assert!(iter.next());
        assert_eq!((iter.word_id(), iter.start_offset(), iter.end_offset()), (15, 4, 10));
        assert!(!iter.next());
        assert!(!iter.is_position_before_end());
    }

    #[test]
    fn test_construction_iterator() {
        let dir = tempdir().unwrap();
        let mut seg = segments(dir.path(), &[1, 2], &[0, 0]);
        {
            let mut iter = seg.construction_iterator(2).unwrap();
            assert_eq!(iter.word_id(), 1);
            assert!(iter.put_next(3).unwrap());
            assert_eq!(iter.start_offset(), 6);
            assert!(!iter.put_next(1).unwrap());
            assert!(iter.put_next(1).is_err());
        }
        assert_eq!(seg.total_size().unwrap(), 4);
    }

    #[test]
    fn test_offset_phase_is_exclusive() {
        let dir = tempdir().unwrap();
        let mut seg = segments(dir.path(), &[1, 2, 3], &[2, 1, 4]);
        assert!(seg.segment_range(0).is_err());

        seg.counts_to_offsets(2).unwrap();
        assert_eq!(seg.phase(), SegmentPhase::Offsets);
        assert_eq!(seg.segment_range(0).unwrap(), (0, 4));
        assert_eq!(seg.segment_range(2).unwrap(), (6, 14));

        assert!(seg.iterator(2).is_err());
        assert!(seg.total_size().is_err());
        assert!(seg.counts_to_offsets(2).is_err());
    }
}
