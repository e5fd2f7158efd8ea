//! Preindexes: the mutable, file-backed form of a reverse index shard.
//!
//! A preindex pairs [`WordSegments`] (which terms exist and how many postings
//! each owns) with a [`PreindexDocuments`] store (the postings themselves,
//! grouped by term in term order). Preindexes are built per journal, merged
//! pairwise without holding postings in memory, and finally baked into the
//! queryable docs/words file pair.

pub mod documents;
pub mod encoder;
pub mod segments;

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{PilumError, Result};
use crate::journal::IndexJournal;
use crate::model::DocIdRewriter;
use crate::postings::skiplist::{FOOTER_SIZE, SkipListWriter, run_size};
use crate::postings::write_btree;
use crate::storage::LongArray;

pub use documents::{PreindexDocuments, RECORD_SIZE};
pub use encoder::{FullTierEncoder, PostingEncoder, PriorityTierEncoder, TermMetaEncoder};
pub use segments::{SegmentConstructionIterator, SegmentIterator, SegmentPhase, WordSegments};

/// A uniquely named temporary file in `dir`.
pub(crate) fn temp_file(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{prefix}-{}.dat", Uuid::new_v4()))
}

/// Sizes of a finalized postings index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeStats {
    pub terms: usize,
    pub postings: u64,
    pub docs_bytes: u64,
    pub words_bytes: u64,
}

#[derive(Debug)]
pub struct Preindex {
    segments: WordSegments,
    documents: PreindexDocuments,
}

impl Preindex {
    pub fn from_parts(segments: WordSegments, documents: PreindexDocuments) -> Self {
        Preindex {
            segments,
            documents,
        }
    }

    /// Build a preindex from one journal in two streaming passes: the first
    /// counts postings per term, the second writes them.
    pub fn construct(
        journal: &IndexJournal,
        rewriter: &dyn DocIdRewriter,
        encoder: &dyn PostingEncoder,
        work_dir: &Path,
    ) -> Result<Self> {
        let mut segments = WordSegments::construct(journal, encoder, work_dir)?;
        let documents =
            match PreindexDocuments::construct(work_dir, journal, rewriter, encoder, &mut segments)
            {
                Ok(documents) => documents,
                Err(e) => {
                    let _ = segments.delete();
                    return Err(e);
                }
            };
        segments.flush()?;

        let preindex = Preindex::from_parts(segments, documents);
        debug!(
            "Constructed preindex from {}: {} terms, {} postings",
            journal.path().display(),
            preindex.term_count(),
            preindex.posting_count()?
        );
        Ok(preindex)
    }

    pub fn term_count(&self) -> usize {
        self.segments.len()
    }

    pub fn posting_count(&self) -> Result<u64> {
        self.segments.total_size()
    }

    /// Combine `left` and `right` into a new preindex in `dest_dir` holding
    /// the union of their postings. The inputs are left untouched, and on
    /// failure no merged file is left behind in `dest_dir`.
    pub fn merge(dest_dir: &Path, left: &Preindex, right: &Preindex) -> Result<Preindex> {
        let mut merged_segments =
            WordSegments::create_merged(dest_dir, &left.segments, &right.segments)?;

        let upper_bound = left.documents.len() + right.documents.len();
        let mut merged_docs = match LongArray::create(temp_file(dest_dir, "docs"), upper_bound) {
            Ok(docs) => docs,
            Err(e) => {
                if let Err(cleanup) = merged_segments.delete() {
                    warn!("Failed to remove merged segments: {cleanup}");
                }
                return Err(e);
            }
        };

        if let Err(e) = fill_merged(left, right, &mut merged_segments, &mut merged_docs) {
            if let Err(cleanup) = merged_segments.delete() {
                warn!("Failed to remove merged segments: {cleanup}");
            }
            let path = merged_docs.path().to_path_buf();
            if let Err(cleanup) = merged_docs.delete() {
                warn!("Failed to remove {}: {cleanup}", path.display());
            }
            return Err(e);
        }

        Ok(Preindex::from_parts(
            merged_segments,
            PreindexDocuments::new(merged_docs),
        ))
    }

    /// Write the docs (skip lists) and words (B-tree) files, then delete the
    /// preindex's own files. On failure the partial outputs are removed and
    /// the write error is returned.
    pub fn finalize(mut self, docs_path: &Path, words_path: &Path) -> Result<FinalizeStats> {
        match self.write_final(docs_path, words_path) {
            Ok(stats) => {
                self.delete()?;
                Ok(stats)
            }
            Err(e) => {
                let _ = std::fs::remove_file(docs_path);
                let _ = std::fs::remove_file(words_path);
                if let Err(cleanup) = self.delete() {
                    warn!("Failed to delete preindex after failed finalize: {cleanup}");
                }
                Err(e)
            }
        }
    }

    fn write_final(&mut self, docs_path: &Path, words_path: &Path) -> Result<FinalizeStats> {
        self.segments.counts_to_offsets(RECORD_SIZE)?;
        let terms = self.segments.len();

        let mut estimate = FOOTER_SIZE as u64;
        for i in 0..terms {
            let (start, end) = self.segments.segment_range(i)?;
            estimate += run_size((end - start) / RECORD_SIZE) as u64;
        }

        let file = File::create(docs_path).map_err(|e| {
            PilumError::storage(format!("Failed to create {}: {e}", docs_path.display()))
        })?;
        let mut writer = SkipListWriter::new(BufWriter::new(file));
        let docs = &self.documents.docs;

        let mut words = Vec::with_capacity(terms);
        let mut postings = 0u64;
        for i in 0..terms {
            let (start, end) = self.segments.segment_range(i)?;
            let count = (end - start) / RECORD_SIZE;
            if count == 0 {
                continue;
            }
            let offset = writer.write_run(count, |j| {
                let pos = start + j * RECORD_SIZE;
                (docs.get(pos), docs.get(pos + 1))
            })?;
            words.push((self.segments.word_id(i), offset));
            postings += count as u64;
        }

        let file = writer.finish()?.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        let docs_bytes = file.metadata()?.len();
        if docs_bytes > estimate {
            return Err(PilumError::invariant(format!(
                "docs file of {docs_bytes}b exceeds estimate of {estimate}b"
            )));
        }

        let words_file = File::create(words_path).map_err(|e| {
            PilumError::storage(format!("Failed to create {}: {e}", words_path.display()))
        })?;
        let words_bytes = write_btree(BufWriter::new(words_file), &words)?;

        info!(
            "Finalized {}: {} terms, {} postings, {}b docs, {}b words",
            docs_path.display(),
            words.len(),
            postings,
            docs_bytes,
            words_bytes
        );

        Ok(FinalizeStats {
            terms: words.len(),
            postings,
            docs_bytes,
            words_bytes,
        })
    }

    /// Every term with its `(doc id, metadata)` postings, in order.
    pub fn postings(&self) -> Result<Vec<(u64, Vec<(u64, u64)>)>> {
        let mut out = Vec::with_capacity(self.segments.len());
        let mut iter = self.segments.iterator(RECORD_SIZE)?;
        let docs = &self.documents.docs;
        while iter.is_position_before_end() {
            let records = (iter.start_offset()..iter.end_offset())
                .step_by(RECORD_SIZE)
                .map(|pos| (docs.get(pos), docs.get(pos + 1)))
                .collect();
            out.push((iter.word_id(), records));
            iter.next();
        }
        Ok(out)
    }

    /// Delete all files associated with this preindex. Every file is
    /// attempted; the first failure is returned.
    pub fn delete(self) -> Result<()> {
        let segments = self.segments.delete();
        let documents = self.documents.delete();
        segments.and(documents)
    }
}

/// Run the merge walk into freshly created outputs, then flush them and
/// shrink the documents store to what was written.
fn fill_merged(
    left: &Preindex,
    right: &Preindex,
    merged_segments: &mut WordSegments,
    merged_docs: &mut LongArray,
) -> Result<()> {
    walk_merge(left, right, merged_segments, merged_docs)?;
    merged_segments.flush()?;

    // Duplicates across the inputs make the upper bound an overestimate.
    let actual = merged_segments.total_size()? as usize * RECORD_SIZE;
    let before = merged_docs.byte_size();
    if actual != merged_docs.len() {
        merged_docs.truncate(actual)?;
        info!(
            "Shrunk {} from {}b to {}b",
            merged_docs.path().display(),
            before,
            merged_docs.byte_size()
        );
    }
    merged_docs.flush()
}

/// The three-cursor merge walk. Fills `dest` and the counts of
/// `merged_segments`, whose word ids must be the union of both inputs.
fn walk_merge(
    left: &Preindex,
    right: &Preindex,
    merged_segments: &mut WordSegments,
    dest: &mut LongArray,
) -> Result<()> {
    let mut merging = merged_segments.construction_iterator(RECORD_SIZE)?;
    let mut left_iter = left.segments.iterator(RECORD_SIZE)?;
    let mut right_iter = right.segments.iterator(RECORD_SIZE)?;
    let left_docs = &left.documents.docs;
    let right_docs = &right.documents.docs;

    while merging.can_put_more()
        && left_iter.is_position_before_end()
        && right_iter.is_position_before_end()
    {
        let current = merging.word_id();

        if left_iter.word_id() == current && right_iter.word_id() == current {
            let distinct = merge_segments(
                &left_iter,
                &right_iter,
                left_docs,
                right_docs,
                dest,
                merging.start_offset(),
            )?;
            merging.put_next(distinct)?;
            left_iter.next();
            right_iter.next();
        } else if left_iter.word_id() == current {
            if !copy_segment(&mut left_iter, left_docs, &mut merging, dest)? {
                break;
            }
        } else if right_iter.word_id() == current {
            if !copy_segment(&mut right_iter, right_docs, &mut merging, dest)? {
                break;
            }
        } else {
            return Err(PilumError::invariant(format!(
                "merged term {current} found in neither source"
            )));
        }
    }

    if left_iter.is_position_before_end() {
        while copy_segment(&mut left_iter, left_docs, &mut merging, dest)? {}
    }
    if right_iter.is_position_before_end() {
        while copy_segment(&mut right_iter, right_docs, &mut merging, dest)? {}
    }

    if left_iter.is_position_before_end() {
        return Err(PilumError::invariant("Left has more to go"));
    }
    if right_iter.is_position_before_end() {
        return Err(PilumError::invariant("Right has more to go"));
    }
    if merging.can_put_more() {
        return Err(PilumError::invariant(
            "Source iters ran dry before merging iter",
        ));
    }
    Ok(())
}

fn put_record(dest: &mut LongArray, at: usize, doc: u64, meta: u64) -> Result<()> {
    if at + RECORD_SIZE > dest.len() {
        return Err(PilumError::invariant(format!(
            "merge overran its working buffer of {} longs",
            dest.len()
        )));
    }
    dest.set(at, doc);
    dest.set(at + 1, meta);
    Ok(())
}

/// Merge-sort the two runs of the current term into `dest` at `dest_start`,
/// keeping one record per document id. Returns the number of records written.
fn merge_segments(
    left_iter: &SegmentIterator<'_>,
    right_iter: &SegmentIterator<'_>,
    left_docs: &LongArray,
    right_docs: &LongArray,
    dest: &mut LongArray,
    dest_start: usize,
) -> Result<u64> {
    let (mut i, left_end) = (left_iter.start_offset(), left_iter.end_offset());
    let (mut j, right_end) = (right_iter.start_offset(), right_iter.end_offset());
    let mut w = dest_start;

    while i < left_end && j < right_end {
        let (a, b) = (left_docs.get(i), right_docs.get(j));
        if a < b {
            put_record(dest, w, a, left_docs.get(i + 1))?;
            i += RECORD_SIZE;
        } else if b < a {
            put_record(dest, w, b, right_docs.get(j + 1))?;
            j += RECORD_SIZE;
        } else {
            put_record(dest, w, a, left_docs.get(i + 1))?;
            i += RECORD_SIZE;
            j += RECORD_SIZE;
        }
        w += RECORD_SIZE;
    }

    if i < left_end {
        dest.transfer_from(left_docs, i, left_end, w)?;
        w += left_end - i;
    }
    if j < right_end {
        dest.transfer_from(right_docs, j, right_end, w)?;
        w += right_end - j;
    }

    Ok(((w - dest_start) / RECORD_SIZE) as u64)
}

/// Bulk-copy the current segment of `source` and advance both cursors.
/// Returns whether `source` has another segment.
fn copy_segment(
    source: &mut SegmentIterator<'_>,
    source_docs: &LongArray,
    merging: &mut SegmentConstructionIterator<'_>,
    dest: &mut LongArray,
) -> Result<bool> {
    if !merging.can_put_more() {
        return Err(PilumError::invariant(
            "Source iterator has data but merging iter is done",
        ));
    }
    if merging.word_id() != source.word_id() {
        return Err(PilumError::invariant(format!(
            "merging iter at term {} but source at term {}",
            merging.word_id(),
            source.word_id()
        )));
    }

    let size = source.end_offset() - source.start_offset();
    dest.transfer_from(
        source_docs,
        source.start_offset(),
        source.end_offset(),
        merging.start_offset(),
    )?;

    let put_next = merging.put_next((size / RECORD_SIZE) as u64)?;
    let iter_next = source.next();

    if !put_next && iter_next {
        return Err(PilumError::invariant(
            "Source iterator ran out before dest iterator",
        ));
    }
    Ok(iter_next)
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    use super::*;
    use crate::journal::{JournalRecord, JournalTerm, JournalWriter};
    use crate::model::IdentityRewriter;
    use crate::postings::{BTreeReader, SkipListReader};
    use crate::postings::skiplist::validate_footer;

    fn journal(dir: &Path, name: &str, docs: &[(u64, Vec<(u64, u8)>)]) -> IndexJournal {
        let path = dir.join(format!("{name}.journal"));
        let mut writer = JournalWriter::create(&path).unwrap();
        for (doc_id, terms) in docs {
            writer
                .append(&JournalRecord {
                    doc_id: *doc_id,
                    doc_meta: 0,
                    features: 0,
                    size: 0,
                    terms: terms
                        .iter()
                        .map(|&(term_id, meta)| JournalTerm {
                            term_id,
                            meta,
                            positions: vec![],
                        })
                        .collect(),
                    spans: vec![],
                })
                .unwrap();
        }
        writer.finish().unwrap();
        IndexJournal::open(&path).unwrap()
    }

    fn build(dir: &Path, name: &str, docs: &[(u64, Vec<(u64, u8)>)]) -> Preindex {
        let j = journal(dir, name, docs);
        Preindex::construct(&j, &IdentityRewriter, &TermMetaEncoder, dir).unwrap()
    }

    fn as_sets(preindex: &Preindex) -> BTreeMap<u64, BTreeSet<u64>> {
        preindex
            .postings()
            .unwrap()
            .into_iter()
            .map(|(term, records)| (term, records.into_iter().map(|(doc, _)| doc).collect()))
            .collect()
    }

    const FOO: u64 = 1000;

    #[test]
    fn test_construct_sorts_and_dedups() {
        let dir = tempdir().unwrap();
        let p = build(
            dir.path(),
            "a",
            &[
                (5, vec![(1, 1), (2, 0)]),
                (2, vec![(1, 2)]),
                (5, vec![(1, 1)]),
            ],
        );
        let postings = p.postings().unwrap();
        assert_eq!(postings[0], (1, vec![(2, 2), (5, 1)]));
        assert_eq!(postings[1], (2, vec![(5, 0)]));
        assert_eq!(p.posting_count().unwrap(), 3);
    }

    #[test]
    fn test_merge_union_and_copy() {
        let dir = tempdir().unwrap();
        let left = build(
            dir.path(),
            "l",
            &[
                (1, vec![(FOO, 1), (7, 3)]),
                (2, vec![(FOO, 1)]),
                (3, vec![(FOO, 1), (7, 4)]),
            ],
        );
        let right = build(
            dir.path(),
            "r",
            &[
                (3, vec![(FOO, 2), (9, 5)]),
                (4, vec![(FOO, 2)]),
                (5, vec![(FOO, 2)]),
            ],
        );

        let merged = Preindex::merge(dir.path(), &left, &right).unwrap();
        let postings = merged.postings().unwrap();

        assert_eq!(postings.len(), 3);
        assert_eq!(postings[0], (7, vec![(1, 3), (3, 4)]));
        assert_eq!(postings[1], (9, vec![(3, 5)]));
        let (term, foo) = &postings[2];
        assert_eq!(*term, FOO);
        assert_eq!(
            foo.iter().map(|r| r.0).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        // Document 3 was in both inputs; the left record wins.
        assert_eq!(foo[2], (3, 1));

        // One duplicate posting was dropped, so the store was shrunk to fit.
        assert_eq!(merged.documents.len(), (5 + 2 + 1) * RECORD_SIZE);
        assert_eq!(
            merged.documents.len(),
            left.documents.len() + right.documents.len() - RECORD_SIZE
        );

        // Single-source terms are byte-identical copies.
        let left_postings = left.postings().unwrap();
        assert_eq!(left_postings[0], postings[0]);
    }

    #[test]
    fn test_merge_with_empty_side() {
        let dir = tempdir().unwrap();
        let empty = build(dir.path(), "e", &[]);
        let full = build(dir.path(), "f", &[(1, vec![(3, 0), (4, 0)])]);

        let merged = Preindex::merge(dir.path(), &empty, &full).unwrap();
        assert_eq!(as_sets(&merged), as_sets(&full));

        let merged = Preindex::merge(dir.path(), &full, &empty).unwrap();
        assert_eq!(as_sets(&merged), as_sets(&full));

        let merged = Preindex::merge(dir.path(), &empty, &empty).unwrap();
        assert_eq!(merged.term_count(), 0);
    }

    fn random_docs(rng: &mut StdRng) -> Vec<(u64, Vec<(u64, u8)>)> {
        (0..rng.random_range(1..40))
            .map(|_| {
                let doc = rng.random_range(0..60u64);
                let terms = (0..rng.random_range(1..6))
                    .map(|_| (rng.random_range(0..25u64), 0u8))
                    .collect();
                (doc, terms)
            })
            .collect()
    }

    #[test]
    fn test_merge_is_union_and_associative() {
        let dir = tempdir().unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        for round in 0..10 {
            let a = build(dir.path(), &format!("a{round}"), &random_docs(&mut rng));
            let b = build(dir.path(), &format!("b{round}"), &random_docs(&mut rng));
            let c = build(dir.path(), &format!("c{round}"), &random_docs(&mut rng));

            let ab = Preindex::merge(dir.path(), &a, &b).unwrap();
            let ab_c = Preindex::merge(dir.path(), &ab, &c).unwrap();
            let bc = Preindex::merge(dir.path(), &b, &c).unwrap();
            let a_bc = Preindex::merge(dir.path(), &a, &bc).unwrap();

            let mut expected: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
            for p in [&a, &b, &c] {
                for (term, docs) in as_sets(p) {
                    expected.entry(term).or_default().extend(docs);
                }
            }

            assert_eq!(as_sets(&ab_c), expected);
            assert_eq!(as_sets(&a_bc), expected);

            // No duplicate document ids within a term.
            for (_, records) in ab_c.postings().unwrap() {
                assert!(records.windows(2).all(|w| w[0].0 < w[1].0));
            }
        }
    }

    #[test]
    fn test_finalize_round_trip() {
        let dir = tempdir().unwrap();
        let left = build(dir.path(), "l", &[(1, vec![(FOO, 1)]), (2, vec![(FOO, 1), (5, 2)])]);
        let right = build(dir.path(), "r", &[(3, vec![(FOO, 1)]), (2, vec![(FOO, 7)])]);
        let merged = Preindex::merge(dir.path(), &left, &right).unwrap();

        let docs_path = dir.path().join("out.docs");
        let words_path = dir.path().join("out.words");
        let stats = merged.finalize(&docs_path, &words_path).unwrap();

        assert_eq!(stats.terms, 2);
        assert_eq!(stats.postings, 4);
        assert_eq!(
            stats.docs_bytes as usize,
            run_size(1) + run_size(3) + FOOTER_SIZE
        );

        let docs = std::fs::read(&docs_path).unwrap();
        validate_footer(&docs).unwrap();
        let words = std::fs::read(&words_path).unwrap();
        let tree = BTreeReader::new(&words[..]).unwrap();

        let foo = SkipListReader::new(&docs[..], tree.find(FOO).unwrap() as usize).unwrap();
        assert_eq!(foo.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(foo.get_value(2), Some(1));
        assert!(tree.find(999).is_none());
    }

    #[test]
    fn test_overrun_is_an_invariant_violation() {
        let dir = tempdir().unwrap();
        let good = build(dir.path(), "g", &[(1, vec![(1, 0)])]);

        // Segments claim two postings but the store holds only one.
        let mut words = LongArray::create(temp_file(dir.path(), "w"), 1).unwrap();
        let mut counts = LongArray::create(temp_file(dir.path(), "c"), 1).unwrap();
        words.set(0, 2);
        counts.set(0, 2);
        let docs = LongArray::create(temp_file(dir.path(), "d"), RECORD_SIZE).unwrap();
        let broken = Preindex::from_parts(
            WordSegments::new(words, counts).unwrap(),
            PreindexDocuments::new(docs),
        );

        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();
        let err = Preindex::merge(&dest, &good, &broken).unwrap_err();
        assert!(matches!(err, PilumError::Invariant(_)));
        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_finalize_reports_write_error() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        let j = journal(dir.path(), "a", &[(1, vec![(FOO, 0)])]);
        let p = Preindex::construct(&j, &IdentityRewriter, &TermMetaEncoder, &work).unwrap();

        // Pull the preindex files out from under it so cleanup fails too.
        for entry in std::fs::read_dir(&work).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }

        let missing = dir.path().join("missing");
        let err = p
            .finalize(&missing.join("out.docs"), &missing.join("out.words"))
            .unwrap_err();
        assert!(matches!(err, PilumError::Storage(_)), "{err:?}");
    }
}
