use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pilum::config::IndexConfig;
use pilum::index::{
    CombinedIndexReader, DirectoryIndexFactory, IndexConstructor, IndexQueryExecution,
    StatefulIndex,
};
use pilum::journal::{JournalRecord, JournalSpan, JournalTerm, JournalWriter};
use pilum::model::{DocIdCodec, DocumentMetadata, term_flags};
use pilum::query::{QueryParams, SearchBudget, SearchQuery, SpecificationLimit};
use tempfile::tempdir;

const FOO: u64 = 100;
const BAR: u64 = 200;

fn doc(doc_id: u64, terms: &[(u64, u8)]) -> JournalRecord {
    JournalRecord {
        doc_id,
        doc_meta: 0,
        features: 0,
        size: 50,
        terms: terms
            .iter()
            .map(|&(term_id, meta)| JournalTerm {
                term_id,
                meta,
                positions: vec![0, 3],
            })
            .collect(),
        spans: vec![],
    }
}

fn write_journal(dir: &Path, name: &str, records: &[JournalRecord]) {
    std::fs::create_dir_all(dir).unwrap();
    let mut writer = JournalWriter::create(dir.join(name)).unwrap();
    for record in records {
        writer.append(record).unwrap();
    }
    writer.finish().unwrap();
}

fn stateful(config: &IndexConfig) -> StatefulIndex {
    let factory = Arc::new(DirectoryIndexFactory::new(config));
    StatefulIndex::new(factory, config.close_delay()).unwrap()
}

fn run(reader: &CombinedIndexReader, query: &SearchQuery) -> Vec<u64> {
    let mut ids = Vec::new();
    let mut execution = IndexQueryExecution::new(16, 4);
    execution.run(reader, query, &SearchBudget::unlimited(), |batch| {
        ids.extend_from_slice(batch)
    });
    ids
}

#[test]
fn test_construct_switch_and_query() {
    let dir = tempdir().unwrap();
    let journals = dir.path().join("journals");
    write_journal(
        &journals,
        "0.journal",
        &[doc(1, &[(FOO, 0)]), doc(2, &[(FOO, 0)]), doc(3, &[(FOO, 0)])],
    );
    write_journal(
        &journals,
        "1.journal",
        &[doc(3, &[(FOO, 0)]), doc(4, &[(FOO, 0)]), doc(5, &[(FOO, 0)])],
    );

    let config = IndexConfig::new(dir.path().join("index")).with_construction_threads(2);
    let report = IndexConstructor::new(config.clone())
        .construct(&journals)
        .unwrap()
        .unwrap();
    assert_eq!(report.documents, 5);

    let index = stateful(&config);
    assert!(!index.is_loaded());
    assert!(index.switch_index());
    assert!(index.is_loaded());
    let reader = index.snapshot().unwrap();
    assert!(reader.is_loaded());
    assert_eq!(reader.total_doc_count(), 5);

    let mut ids = run(&reader, &SearchQuery::new(vec![FOO], vec![]));
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    // Postings of an unknown term are empty, so nothing matches both.
    assert!(run(&reader, &SearchQuery::new(vec![FOO, 999], vec![])).is_empty());
}

#[test]
fn test_exclusions_params_and_priority_heads() {
    let dir = tempdir().unwrap();
    let journals = dir.path().join("journals");

    let old = DocumentMetadata {
        year: 1999,
        ..Default::default()
    }
    .encode();
    let new = DocumentMetadata {
        year: 2021,
        ..Default::default()
    }
    .encode();

    let mut records = Vec::new();
    for ordinal in 1..=6u32 {
        let id = DocIdCodec::encode(0, ordinal % 2 + 1, ordinal);
        let mut terms = vec![(FOO, if ordinal == 5 { term_flags::TITLE } else { 0 })];
        if ordinal == 2 || ordinal == 4 {
            terms.push((BAR, 0));
        }
        let mut record = doc(id, &terms);
        record.doc_meta = if ordinal <= 3 { old } else { new };
        record.spans = vec![JournalSpan {
            zone: b't',
            starts_ends: vec![0, 2],
        }];
        records.push(record);
    }
    write_journal(&journals, "0.journal", &records);

    let config = IndexConfig::new(dir.path().join("index")).with_construction_threads(1);
    IndexConstructor::new(config.clone())
        .construct(&journals)
        .unwrap()
        .unwrap();
    let index = stateful(&config);
    assert!(index.switch_index());
    let reader = index.snapshot().unwrap();
    let id = |ordinal: u32| DocIdCodec::encode(0, ordinal % 2 + 1, ordinal);

    // The priority head delivers the flagged document first.
    let ids = run(&reader, &SearchQuery::new(vec![FOO], vec![BAR]));
    assert_eq!(ids[0], id(5));
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    let mut expected = vec![id(1), id(3), id(5), id(6)];
    expected.sort_unstable();
    assert_eq!(sorted, expected);

    let params = QueryParams {
        year: SpecificationLimit::GreaterThan(2000),
        ..Default::default()
    };
    let mut ids = run(&reader, &SearchQuery::new(vec![FOO], vec![]).with_params(params));
    ids.sort_unstable();
    let mut expected = vec![id(4), id(5), id(6)];
    expected.sort_unstable();
    assert_eq!(ids, expected);

    let params = QueryParams {
        domains: vec![1],
        ..Default::default()
    };
    let ids = run(&reader, &SearchQuery::new(vec![FOO], vec![]).with_params(params));
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|&i| DocIdCodec::domain_id(i) == 1));

    let spans = reader.document_spans(id(3)).unwrap().unwrap();
    assert!(spans.title.contains_position(1));
    assert!(!spans.title.contains_position(2));
}

#[test]
fn test_hot_swap_is_atomic_for_readers() {
    let dir = tempdir().unwrap();
    let config = IndexConfig::new(dir.path().join("index"))
        .with_construction_threads(1)
        .with_close_delay(Duration::from_secs(0));

    let first = dir.path().join("first");
    write_journal(&first, "0.journal", &[doc(1, &[(FOO, 0)]), doc(2, &[(FOO, 0)])]);
    let second = dir.path().join("second");
    write_journal(&second, "0.journal", &[doc(7, &[(FOO, 0)]), doc(8, &[(FOO, 0)])]);

    let index = Arc::new(stateful(&config));
    IndexConstructor::new(config.clone()).construct(&first).unwrap();
    assert!(index.switch_index());
    let before = index.snapshot().unwrap();

    IndexConstructor::new(config.clone()).construct(&second).unwrap();

    let query = SearchQuery::new(vec![FOO], vec![]);
    thread::scope(|scope| {
        for _ in 0..4 {
            let index = Arc::clone(&index);
            let query = query.clone();
            scope.spawn(move || {
                for _ in 0..50 {
                    let reader = index.snapshot().unwrap();
                    let mut ids = run(&reader, &query);
                    ids.sort_unstable();
                    assert!(ids == vec![1, 2] || ids == vec![7, 8], "mixed result {ids:?}");
                }
            });
        }
        assert!(index.switch_index());
    });

    let mut ids = run(&index.snapshot().unwrap(), &query);
    ids.sort_unstable();
    assert_eq!(ids, vec![7, 8]);

    // A snapshot taken before the swap keeps serving its own generation.
    let mut ids = run(&before, &query);
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    // Switching with nothing staged fails and leaves the live reader alone.
    let live = index.snapshot().unwrap();
    assert!(!index.switch_index());
    assert!(Arc::ptr_eq(&live, &index.snapshot().unwrap()));
}

#[test]
fn test_execution_honors_budget() {
    let dir = tempdir().unwrap();
    let journals = dir.path().join("journals");
    let records: Vec<_> = (1..=5000).map(|id| doc(id, &[(FOO, 0)])).collect();
    write_journal(&journals, "0.journal", &records);

    let config = IndexConfig::new(dir.path().join("index")).with_construction_threads(1);
    IndexConstructor::new(config.clone())
        .construct(&journals)
        .unwrap()
        .unwrap();
    let index = stateful(&config);
    assert!(index.switch_index());
    let reader = index.snapshot().unwrap();

    let budget = SearchBudget::new(Duration::from_millis(50));
    let mut execution = IndexQueryExecution::new(64, 64);
    let mut delivered = 0;
    let start = Instant::now();
    let stats = execution.run(
        &reader,
        &SearchQuery::new(vec![FOO], vec![]),
        &budget,
        |batch| {
            delivered += batch.len();
            thread::sleep(Duration::from_millis(20));
        },
    );

    assert!(delivered > 0);
    assert!(delivered < 5000);
    assert_eq!(stats.results, delivered);
    assert!(stats.timed_out);
    assert!(start.elapsed() < Duration::from_secs(2));
}
