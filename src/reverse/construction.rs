//! Reverse index construction: one preindex per journal, built in parallel,
//! folded into a running merge in journal order as results arrive, then
//! finalized.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::unbounded;
use log::{info, warn};
use rayon::prelude::*;

use crate::error::{PilumError, Result};
use crate::journal::IndexJournal;
use crate::model::DocIdRewriter;
use crate::preindex::{FinalizeStats, PostingEncoder, Preindex};

pub struct ReverseIndexConstructor {
    name: String,
    docs_path: PathBuf,
    words_path: PathBuf,
    work_dir: PathBuf,
    threads: usize,
}

impl ReverseIndexConstructor {
    pub fn new<P: Into<PathBuf>>(name: &str, docs_path: P, words_path: P, work_dir: P) -> Self {
        ReverseIndexConstructor {
            name: name.to_string(),
            docs_path: docs_path.into(),
            words_path: words_path.into(),
            work_dir: work_dir.into(),
            threads: num_cpus::get(),
        }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn docs_path(&self) -> &Path {
        &self.docs_path
    }

    pub fn words_path(&self) -> &Path {
        &self.words_path
    }

    /// Build the index from `journals`.
    ///
    /// Returns `Ok(None)` without writing anything when there are no
    /// journals. On failure every temporary file is removed and no output
    /// file is left behind.
    pub fn create_reverse_index(
        &self,
        journals: &[IndexJournal],
        rewriter: &dyn DocIdRewriter,
        encoder: &dyn PostingEncoder,
    ) -> Result<Option<FinalizeStats>> {
        if journals.is_empty() {
            warn!("No journals for {} index, skipping construction", self.name);
            return Ok(None);
        }
        fs::create_dir_all(&self.work_dir)?;
        if let Some(parent) = self.docs_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let Some(merged) = self.construct_merged(journals, rewriter, encoder)? else {
            return Ok(None);
        };

        let stats = merged.finalize(&self.docs_path, &self.words_path)?;
        info!(
            "Built {} index from {} journals: {} terms, {} postings",
            self.name,
            journals.len(),
            stats.terms,
            stats.postings
        );
        Ok(Some(stats))
    }

    /// Construct a preindex per journal on the pool while this thread folds
    /// them, in journal order, into one running merge. Each merge deletes
    /// its inputs right away, so finished shards do not pile up on disk.
    fn construct_merged(
        &self,
        journals: &[IndexJournal],
        rewriter: &dyn DocIdRewriter,
        encoder: &dyn PostingEncoder,
    ) -> Result<Option<Preindex>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| PilumError::index(format!("Failed to build thread pool: {e}")))?;

        let total = journals.len();
        let constructed = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        let (sender, receiver) = unbounded::<(usize, Result<Preindex>)>();

        thread::scope(|scope| {
            scope.spawn(|| {
                pool.install(|| {
                    journals.par_iter().enumerate().for_each_with(
                        sender,
                        |sender, (i, journal)| {
                            if cancelled.load(Ordering::Acquire) {
                                return;
                            }
                            let preindex =
                                Preindex::construct(journal, rewriter, encoder, &self.work_dir);
                            let n = constructed.fetch_add(1, Ordering::Relaxed) + 1;
                            info!("{} index: constructed preindex {n}/{total}", self.name);
                            if let Err(e) = sender.send((i, preindex)) {
                                let (_, unsent) = e.into_inner();
                                if let Ok(preindex) = unsent {
                                    discard([preindex]);
                                }
                            }
                        },
                    )
                })
            });

            let mut fold = OrderedFold::default();
            for (i, result) in receiver.iter() {
                let failed = match result {
                    Ok(preindex) => !self.fold_in(&mut fold, i, preindex, total),
                    Err(e) => {
                        fold.fail(e, &self.name);
                        true
                    }
                };
                if failed {
                    cancelled.store(true, Ordering::Release);
                }
            }
            fold.finish()
        })
    }

    /// Park `preindex` until every earlier journal has been folded, then
    /// merge as far as the contiguous prefix reaches. Returns false once the
    /// fold has failed.
    fn fold_in(&self, fold: &mut OrderedFold, index: usize, preindex: Preindex, total: usize) -> bool {
        if fold.failure.is_some() {
            discard([preindex]);
            return false;
        }
        fold.parked.insert(index, preindex);
        while let Some(next) = fold.parked.remove(&fold.next) {
            fold.next += 1;
            let merged = match fold.merged.take() {
                None => next,
                Some(left) => match self.merge_pair(left, next) {
                    Ok(merged) => {
                        info!("{} index: merged {}/{total}", self.name, fold.next);
                        merged
                    }
                    Err(e) => {
                        fold.fail(e, &self.name);
                        return false;
                    }
                },
            };
            fold.merged = Some(merged);
        }
        true
    }

    fn merge_pair(&self, left: Preindex, right: Preindex) -> Result<Preindex> {
        let result = Preindex::merge(&self.work_dir, &left, &right);
        let left_deleted = left.delete();
        let right_deleted = right.delete();
        match (result, left_deleted.and(right_deleted)) {
            (Ok(merged), Ok(())) => Ok(merged),
            (Ok(merged), Err(e)) => {
                discard([merged]);
                Err(e)
            }
            (Err(e), _) => Err(e),
        }
    }
}

/// State of the in-order fold over constructed preindexes.
#[derive(Default)]
struct OrderedFold {
    /// Index of the next journal to fold in.
    next: usize,
    merged: Option<Preindex>,
    /// Preindexes that arrived ahead of an earlier journal.
    parked: BTreeMap<usize, Preindex>,
    failure: Option<PilumError>,
}

impl OrderedFold {
    /// Record a failure and drop everything built so far. Only the first
    /// failure is reported.
    fn fail(&mut self, e: PilumError, name: &str) {
        if self.failure.is_some() {
            warn!("{name} index: further construction failure: {e}");
        } else {
            self.failure = Some(e);
        }
        discard(self.merged.take());
        discard(std::mem::take(&mut self.parked).into_values());
    }

    fn finish(mut self) -> Result<Option<Preindex>> {
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        if !self.parked.is_empty() {
            let missing = self.next;
            discard(std::mem::take(&mut self.parked).into_values());
            discard(self.merged.take());
            return Err(PilumError::invariant(format!(
                "preindex of journal {missing} never arrived"
            )));
        }
        Ok(self.merged)
    }
}

fn discard<I: IntoIterator<Item = Preindex>>(preindexes: I) {
    for preindex in preindexes {
        if let Err(e) = preindex.delete() {
            warn!("Failed to delete preindex: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{JournalRecord, JournalTerm, JournalWriter};
    use crate::model::{IdentityRewriter, term_flags};
    use crate::preindex::{PriorityTierEncoder, TermMetaEncoder};
    use crate::query::QueryBuffer;
    use crate::reverse::ReverseIndexReader;
    use tempfile::tempdir;

    fn record(doc_id: u64, terms: &[(u64, u8)]) -> JournalRecord {
        JournalRecord {
            doc_id,
            doc_meta: 0,
            features: 0,
            size: 10,
            terms: terms
                .iter()
                .map(|&(term_id, meta)| JournalTerm {
                    term_id,
                    meta,
                    positions: vec![1],
                })
                .collect(),
            spans: vec![],
        }
    }

    fn journal(dir: &Path, name: &str, records: &[JournalRecord]) -> IndexJournal {
        let path = dir.join(name);
        let mut writer = JournalWriter::create(&path).unwrap();
        for r in records {
            writer.append(r).unwrap();
        }
        writer.finish().unwrap();
        IndexJournal::open(&path).unwrap()
    }

    fn drain(reader: &ReverseIndexReader, term: u64) -> Vec<u64> {
        let mut source = reader.documents(term);
        let mut buffer = QueryBuffer::new(2);
        let mut out = Vec::new();
        while source.has_more() {
            buffer.reset();
            source.read(&mut buffer);
            out.extend_from_slice(buffer.values());
        }
        out
    }

    #[test]
    fn test_build_from_several_journals() {
        let dir = tempdir().unwrap();
        let journals = vec![
            journal(dir.path(), "a.journal", &[record(1, &[(7, 0)]), record(2, &[(7, 0), (8, 0)])]),
            journal(dir.path(), "b.journal", &[record(3, &[(7, 0)])]),
            journal(dir.path(), "c.journal", &[record(2, &[(7, 0)]), record(9, &[(8, 0)])]),
        ];
        let work = dir.path().join("work");
        let constructor = ReverseIndexConstructor::new(
            "full",
            dir.path().join("out/rev.docs"),
            dir.path().join("out/rev.words"),
            work.clone(),
        )
        .with_threads(2);

        let stats = constructor
            .create_reverse_index(&journals, &IdentityRewriter, &TermMetaEncoder)
            .unwrap()
            .unwrap();
        assert_eq!(stats.terms, 2);
        assert_eq!(stats.postings, 5);
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);

        let reader =
            ReverseIndexReader::open("full", constructor.docs_path(), constructor.words_path(), None)
                .unwrap();
        assert!(reader.is_loaded());
        assert_eq!(drain(&reader, 7), vec![1, 2, 3]);
        assert_eq!(drain(&reader, 8), vec![2, 9]);
        assert_eq!(reader.num_documents(8), 2);
        assert_eq!(reader.num_documents(99), 0);
    }

    #[test]
    fn test_priority_tier_keeps_flagged_terms() {
        let dir = tempdir().unwrap();
        let journals = vec![journal(
            dir.path(),
            "a.journal",
            &[
                record(1, &[(7, term_flags::TITLE), (8, 0)]),
                record(2, &[(7, 0), (8, term_flags::SITE)]),
            ],
        )];
        let constructor = ReverseIndexConstructor::new(
            "prio",
            dir.path().join("rev-prio.docs"),
            dir.path().join("rev-prio.words"),
            dir.path().join("work"),
        );
        constructor
            .create_reverse_index(&journals, &IdentityRewriter, &PriorityTierEncoder::new(0xFF))
            .unwrap();

        let reader =
            ReverseIndexReader::open("prio", constructor.docs_path(), constructor.words_path(), None)
                .unwrap();
        assert_eq!(drain(&reader, 7), vec![1]);
        assert_eq!(drain(&reader, 8), vec![2]);
        assert_eq!(
            reader.get_term_meta(8, &[1, 2]),
            vec![0, term_flags::SITE as u64]
        );
    }

    #[test]
    fn test_failed_journal_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let mut journals = Vec::new();
        for i in 0..6u64 {
            let name = format!("{i}.journal");
            journals.push(journal(dir.path(), &name, &[record(i, &[(7, 0), (i + 10, 0)])]));
        }
        // A journal that vanishes between discovery and construction.
        fs::remove_file(dir.path().join("3.journal")).unwrap();

        let work = dir.path().join("work");
        let constructor = ReverseIndexConstructor::new(
            "full",
            dir.path().join("rev.docs"),
            dir.path().join("rev.words"),
            work.clone(),
        )
        .with_threads(3);
        assert!(
            constructor
                .create_reverse_index(&journals, &IdentityRewriter, &TermMetaEncoder)
                .is_err()
        );
        assert_eq!(fs::read_dir(&work).unwrap().count(), 0);
        assert!(!constructor.docs_path().exists());
    }

    #[test]
    fn test_merge_order_keeps_first_journal_record() {
        let dir = tempdir().unwrap();
        let journals: Vec<_> = (0..5u8)
            .map(|i| journal(dir.path(), &format!("{i}.journal"), &[record(1, &[(7, i + 1)])]))
            .collect();
        let constructor = ReverseIndexConstructor::new(
            "full",
            dir.path().join("rev.docs"),
            dir.path().join("rev.words"),
            dir.path().join("work"),
        )
        .with_threads(4);
        let stats = constructor
            .create_reverse_index(&journals, &IdentityRewriter, &TermMetaEncoder)
            .unwrap()
            .unwrap();
        assert_eq!(stats.postings, 1);

        let reader =
            ReverseIndexReader::open("full", constructor.docs_path(), constructor.words_path(), None)
                .unwrap();
        assert_eq!(reader.get_term_meta(7, &[1]), vec![1]);
    }

    #[test]
    fn test_fold_waits_for_earlier_journals() {
        let dir = tempdir().unwrap();
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        let constructor = ReverseIndexConstructor::new(
            "full",
            dir.path().join("rev.docs"),
            dir.path().join("rev.words"),
            work.clone(),
        );
        let build = |i: u8| {
            let j = journal(dir.path(), &format!("{i}.journal"), &[record(1, &[(7, i + 1)])]);
            Preindex::construct(&j, &IdentityRewriter, &TermMetaEncoder, &work).unwrap()
        };
        let files = || fs::read_dir(&work).unwrap().count();

        let mut fold = OrderedFold::default();
        assert!(constructor.fold_in(&mut fold, 2, build(2), 3));
        assert!(constructor.fold_in(&mut fold, 1, build(1), 3));
        assert!(fold.merged.is_none());
        assert_eq!(fold.parked.len(), 2);

        assert!(constructor.fold_in(&mut fold, 0, build(0), 3));
        assert!(fold.parked.is_empty());
        // Only the running merge is left on disk: segment words, counts, docs.
        assert_eq!(files(), 3);

        let merged = fold.finish().unwrap().unwrap();
        assert_eq!(merged.postings().unwrap(), vec![(7, vec![(1, 1)])]);
        merged.delete().unwrap();
        assert_eq!(files(), 0);
    }

    #[test]
    fn test_no_journals() {
        let dir = tempdir().unwrap();
        let constructor = ReverseIndexConstructor::new(
            "full",
            dir.path().join("rev.docs"),
            dir.path().join("rev.words"),
            dir.path().join("work"),
        );
        let built = constructor
            .create_reverse_index(&[], &IdentityRewriter, &TermMetaEncoder)
            .unwrap();
        assert!(built.is_none());
        assert!(!constructor.docs_path().exists());
    }
}
